use serde_json::Value;

use crate::error::ProtocolError;
use crate::protocol::{Args, Message, PipelineState, TrackId};

/// Commands sent from the controller to the playback engine
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    /// Append a track to the pending queue; duration in nanoseconds
    AppendQueue {
        uuid: String,
        track_id: TrackId,
        duration_ns: u64,
    },
    /// Announce the set and make its first track current
    ReadyPlay,
    /// Toggle random order for the rest of the set
    Random(bool),
    /// Start or resume playback
    Play,
    /// Abandon the current track and move to the next one
    NextTrack,
    /// Pause playback
    Pause,
    /// Stop playback and release the output
    Stop,
    /// Drop every pending track
    ClearQueue,
    /// Set volume (0.0 to 1.0)
    Volume(f64),
    /// Ask for a `state` reply
    GetState,
    /// Seek to a fraction (0.0 to 1.0) of the current track
    SetRatio(f64),
}

impl Message for PlayerCommand {
    fn name(&self) -> &'static str {
        match self {
            PlayerCommand::AppendQueue { .. } => "append-queue",
            PlayerCommand::ReadyPlay => "ready-play",
            PlayerCommand::Random(_) => "random",
            PlayerCommand::Play => "play",
            PlayerCommand::NextTrack => "next-track",
            PlayerCommand::Pause => "pause",
            PlayerCommand::Stop => "stop",
            PlayerCommand::ClearQueue => "clear-queue",
            PlayerCommand::Volume(_) => "volume",
            PlayerCommand::GetState => "get-state",
            PlayerCommand::SetRatio(_) => "set-ratio",
        }
    }

    fn args(&self) -> Vec<Value> {
        match self {
            PlayerCommand::AppendQueue {
                uuid,
                track_id,
                duration_ns,
            } => vec![
                Value::from(uuid.as_str()),
                Value::from(*track_id),
                Value::from(*duration_ns),
            ],
            PlayerCommand::Random(enabled) => vec![Value::from(*enabled)],
            PlayerCommand::Volume(value) => vec![Value::from(*value)],
            PlayerCommand::SetRatio(ratio) => vec![Value::from(*ratio)],
            _ => Vec::new(),
        }
    }

    fn from_parts(name: &str, mut args: Args) -> Result<Self, ProtocolError> {
        let command = match name {
            "append-queue" => PlayerCommand::AppendQueue {
                uuid: args.next("uuid")?,
                track_id: args.next("track_id")?,
                duration_ns: args.next("duration")?,
            },
            "ready-play" => PlayerCommand::ReadyPlay,
            "random" => PlayerCommand::Random(args.next("enabled")?),
            "play" => PlayerCommand::Play,
            "next-track" => PlayerCommand::NextTrack,
            "pause" => PlayerCommand::Pause,
            "stop" => PlayerCommand::Stop,
            "clear-queue" => PlayerCommand::ClearQueue,
            "volume" => PlayerCommand::Volume(args.next("value")?),
            "get-state" => PlayerCommand::GetState,
            "set-ratio" => PlayerCommand::SetRatio(args.next("ratio")?),
            other => return Err(ProtocolError::UnknownName(other.to_string())),
        };
        args.finish()?;
        Ok(command)
    }
}

/// Commands sent from the controller to the ripping engine
#[derive(Debug, Clone, PartialEq)]
pub enum RipperCommand {
    /// Rip every track of the disc in the drive as disc `disc_num` of `uuid`
    Rip { uuid: String, disc_num: u32 },
    /// Abort the rip in progress
    Stop,
}

impl Message for RipperCommand {
    fn name(&self) -> &'static str {
        match self {
            RipperCommand::Rip { .. } => "rip",
            RipperCommand::Stop => "stop",
        }
    }

    fn args(&self) -> Vec<Value> {
        match self {
            RipperCommand::Rip { uuid, disc_num } => {
                vec![Value::from(uuid.as_str()), Value::from(*disc_num)]
            }
            RipperCommand::Stop => Vec::new(),
        }
    }

    fn from_parts(name: &str, mut args: Args) -> Result<Self, ProtocolError> {
        let command = match name {
            "rip" => RipperCommand::Rip {
                uuid: args.next("uuid")?,
                disc_num: args.next("disc_num")?,
            },
            "stop" => RipperCommand::Stop,
            other => return Err(ProtocolError::UnknownName(other.to_string())),
        };
        args.finish()?;
        Ok(command)
    }
}

/// Replies sent from an engine back to the controller.
///
/// Times are in seconds.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Playback position of the track and of the whole set
    Position {
        position: f64,
        duration: f64,
        set_position: f64,
        set_duration: f64,
    },
    /// The pipeline reached a new state
    State(PipelineState),
    /// A track became current
    TrackStarted {
        duration: f64,
        more_tracks: bool,
        track_id: TrackId,
    },
    /// A track was finished or abandoned; `remaining` counts pending tracks
    TrackFinished { remaining: usize, track_id: TrackId },
    /// A set was announced with its total duration
    SetReady { duration: f64 },
    /// The last track of the set finished
    SetFinished,
    RipStarted {
        uuid: String,
        disc_num: u32,
    },
    RipTrackStarted {
        uuid: String,
        track_count: u32,
        track_num: u32,
    },
    /// Fraction (0.0 to 1.0) of the current track written so far
    RipTrackPosition {
        uuid: String,
        disc_num: u32,
        track_num: u32,
        fraction: f64,
    },
    RipTrackFinished {
        uuid: String,
        disc_num: u32,
        track_num: u32,
    },
    RipFinished,
    RipAborted,
    /// An error occurred
    Error(String),
}

impl Message for Reply {
    fn name(&self) -> &'static str {
        match self {
            Reply::Position { .. } => "position",
            Reply::State(_) => "state",
            Reply::TrackStarted { .. } => "track-started",
            Reply::TrackFinished { .. } => "track-finished",
            Reply::SetReady { .. } => "set-ready",
            Reply::SetFinished => "set-finished",
            Reply::RipStarted { .. } => "rip-started",
            Reply::RipTrackStarted { .. } => "rip-track-started",
            Reply::RipTrackPosition { .. } => "rip-track-position",
            Reply::RipTrackFinished { .. } => "rip-track-finished",
            Reply::RipFinished => "rip-finished",
            Reply::RipAborted => "rip-aborted",
            Reply::Error(_) => "error",
        }
    }

    fn args(&self) -> Vec<Value> {
        match self {
            Reply::Position {
                position,
                duration,
                set_position,
                set_duration,
            } => vec![
                Value::from(*position),
                Value::from(*duration),
                Value::from(*set_position),
                Value::from(*set_duration),
            ],
            Reply::State(state) => vec![Value::from(*state)],
            Reply::TrackStarted {
                duration,
                more_tracks,
                track_id,
            } => vec![
                Value::from(*duration),
                Value::from(*more_tracks),
                Value::from(track_id.disc_num),
                Value::from(track_id.track_num),
            ],
            Reply::TrackFinished {
                remaining,
                track_id,
            } => vec![
                Value::from(*remaining),
                Value::from(track_id.disc_num),
                Value::from(track_id.track_num),
            ],
            Reply::SetReady { duration } => vec![Value::from(*duration)],
            Reply::RipStarted { uuid, disc_num } => {
                vec![Value::from(uuid.as_str()), Value::from(*disc_num)]
            }
            Reply::RipTrackStarted {
                uuid,
                track_count,
                track_num,
            } => vec![
                Value::from(uuid.as_str()),
                Value::from(*track_count),
                Value::from(*track_num),
            ],
            Reply::RipTrackPosition {
                uuid,
                disc_num,
                track_num,
                fraction,
            } => vec![
                Value::from(uuid.as_str()),
                Value::from(*disc_num),
                Value::from(*track_num),
                Value::from(*fraction),
            ],
            Reply::RipTrackFinished {
                uuid,
                disc_num,
                track_num,
            } => vec![
                Value::from(uuid.as_str()),
                Value::from(*disc_num),
                Value::from(*track_num),
            ],
            Reply::Error(message) => vec![Value::from(message.as_str())],
            Reply::SetFinished | Reply::RipFinished | Reply::RipAborted => Vec::new(),
        }
    }

    fn from_parts(name: &str, mut args: Args) -> Result<Self, ProtocolError> {
        let reply = match name {
            "position" => Reply::Position {
                position: args.next("pos")?,
                duration: args.next("dur")?,
                set_position: args.next("set_pos")?,
                set_duration: args.next("set_dur")?,
            },
            "state" => Reply::State(args.next("state")?),
            "track-started" => Reply::TrackStarted {
                duration: args.next("duration")?,
                more_tracks: args.next("more_tracks")?,
                track_id: TrackId::new(args.next("disc_num")?, args.next("track_num")?),
            },
            "track-finished" => Reply::TrackFinished {
                remaining: args.next("remaining_count")?,
                track_id: TrackId::new(args.next("disc_num")?, args.next("track_num")?),
            },
            "set-ready" => Reply::SetReady {
                duration: args.next("duration")?,
            },
            "set-finished" => Reply::SetFinished,
            "rip-started" => Reply::RipStarted {
                uuid: args.next("uuid")?,
                disc_num: args.next("disc_num")?,
            },
            "rip-track-started" => Reply::RipTrackStarted {
                uuid: args.next("uuid")?,
                track_count: args.next("n_tracks")?,
                track_num: args.next("track_num")?,
            },
            "rip-track-position" => Reply::RipTrackPosition {
                uuid: args.next("uuid")?,
                disc_num: args.next("disc_num")?,
                track_num: args.next("track_num")?,
                fraction: args.next("fraction")?,
            },
            "rip-track-finished" => Reply::RipTrackFinished {
                uuid: args.next("uuid")?,
                disc_num: args.next("disc_num")?,
                track_num: args.next("track_num")?,
            },
            "rip-finished" => Reply::RipFinished,
            "rip-aborted" => Reply::RipAborted,
            "error" => Reply::Error(args.next("message")?),
            other => return Err(ProtocolError::UnknownName(other.to_string())),
        };
        args.finish()?;
        Ok(reply)
    }
}
