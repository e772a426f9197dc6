use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, anyhow, bail};
use cadenza_core::{PlayerCommand, RipperCommand, TrackId, WorkerTask};
use strum::EnumString;

/// What a line typed at the controller asks for
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Player(PlayerCommand),
    Ripper(RipperCommand),
    Worker(WorkerTask),
    /// Look up a ripped disc and queue all of its tracks
    QueueDisc { uuid: String, disc_num: u32 },
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "kebab-case")]
enum Target {
    Player,
    Ripper,
    Worker,
    QueueDisc,
    Help,
    Quit,
}

pub const HELP: &str = "\
player append-queue <uuid> <disc> <track> <duration-ns>
player ready-play | play | pause | stop | next-track | clear-queue | get-state
player random <on|off> | volume <0..1> | set-ratio <0..1>
ripper rip <uuid> <disc> | ripper stop
worker probe <path> | ls <path> | disc <uuid> <disc> | toc [device]
queue-disc <uuid> <disc>
help | quit";

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> anyhow::Result<Option<Action>> {
    let mut words = line.split_whitespace();
    let Some(first) = words.next() else {
        return Ok(None);
    };
    let target = Target::from_str(first).map_err(|_| anyhow!("unknown target `{}`", first))?;
    let args: Vec<&str> = words.collect();

    let action = match target {
        Target::Player => Action::Player(player_command(&args)?),
        Target::Ripper => Action::Ripper(ripper_command(&args)?),
        Target::Worker => Action::Worker(worker_task(&args)?),
        Target::QueueDisc => {
            let [uuid, disc] = exactly::<2>(&args)?;
            Action::QueueDisc {
                uuid: uuid.to_string(),
                disc_num: number(disc, "disc")?,
            }
        }
        Target::Help => Action::Help,
        Target::Quit => Action::Quit,
    };
    Ok(Some(action))
}

fn player_command(args: &[&str]) -> anyhow::Result<PlayerCommand> {
    let (name, rest) = args.split_first().context("missing player command")?;
    let command = match *name {
        "append-queue" => {
            let [uuid, disc, track, duration] = exactly::<4>(rest)?;
            PlayerCommand::AppendQueue {
                uuid: uuid.to_string(),
                track_id: TrackId::new(number(disc, "disc")?, number(track, "track")?),
                duration_ns: number(duration, "duration")?,
            }
        }
        "ready-play" => PlayerCommand::ReadyPlay,
        "play" => PlayerCommand::Play,
        "pause" => PlayerCommand::Pause,
        "stop" => PlayerCommand::Stop,
        "next-track" => PlayerCommand::NextTrack,
        "clear-queue" => PlayerCommand::ClearQueue,
        "get-state" => PlayerCommand::GetState,
        "random" => {
            let [flag] = exactly::<1>(rest)?;
            PlayerCommand::Random(switch(flag)?)
        }
        "volume" => {
            let [value] = exactly::<1>(rest)?;
            PlayerCommand::Volume(number(value, "volume")?)
        }
        "set-ratio" => {
            let [value] = exactly::<1>(rest)?;
            PlayerCommand::SetRatio(number(value, "ratio")?)
        }
        other => bail!("unknown player command `{}`", other),
    };
    Ok(command)
}

fn ripper_command(args: &[&str]) -> anyhow::Result<RipperCommand> {
    match args {
        ["rip", uuid, disc] => Ok(RipperCommand::Rip {
            uuid: uuid.to_string(),
            disc_num: number(disc, "disc")?,
        }),
        ["stop"] => Ok(RipperCommand::Stop),
        _ => bail!("usage: ripper rip <uuid> <disc> | ripper stop"),
    }
}

fn worker_task(args: &[&str]) -> anyhow::Result<WorkerTask> {
    match args {
        ["probe", path] => Ok(WorkerTask::ProbeFile {
            path: PathBuf::from(path),
        }),
        ["ls", path] => Ok(WorkerTask::ListDirectory {
            path: PathBuf::from(path),
        }),
        ["disc", uuid, disc] => Ok(WorkerTask::DiscFiles {
            uuid: uuid.to_string(),
            disc_num: number(disc, "disc")?,
        }),
        ["toc"] => Ok(WorkerTask::ReadToc { device: None }),
        ["toc", device] => Ok(WorkerTask::ReadToc {
            device: Some(device.to_string()),
        }),
        _ => bail!("usage: worker probe <path> | ls <path> | disc <uuid> <disc> | toc [device]"),
    }
}

fn exactly<'a, const N: usize>(args: &[&'a str]) -> anyhow::Result<[&'a str; N]> {
    <[&str; N]>::try_from(args)
        .map_err(|_| anyhow!("expected {} argument(s), got {}", N, args.len()))
}

fn number<T>(text: &str, what: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    text.parse()
        .with_context(|| format!("bad {} `{}`", what, text))
}

fn switch(text: &str) -> anyhow::Result<bool> {
    match text {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => bail!("expected on or off, got `{}`", other),
    }
}
