use std::ffi::OsString;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossbeam_channel::{Receiver, Sender};

use cadenza_core::{
    Config, EngineLauncher, Message, PlayerCommand, Reply, RipperCommand, TrackId, Worker,
    WorkerOutput, WorkerTask,
};

mod input;
mod state;

use input::{Action, HELP, parse_line};
use state::{ControllerState, EngineKind};

#[derive(Parser, Debug)]
#[command(name = "cadenza-ctl")]
#[command(about = "Line-driven controller for the cadenza engines")]
#[command(version)]
struct Args {
    /// Configuration file (TOML), handed on to the engines
    #[arg(short, long, env = "CADENZA_CONFIG")]
    config: Option<PathBuf>,
}

/// Everything the main loop reacts to
enum ControlEvent {
    Line(String),
    InputClosed,
    Reply(EngineKind, Reply),
    WorkerDone {
        task: WorkerTask,
        /// Append the tracks of a `disc-files` result to the player queue
        enqueue: bool,
        result: Result<WorkerOutput, String>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    let program = config.engine_program();
    log::info!("Starting cadenza controller, engine {}", program.display());

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let _guard = runtime.enter();

    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    spawn_input_thread(event_tx.clone())?;

    let grace = Duration::from_millis(config.shutdown_grace_ms);
    let mut forwarded: Vec<OsString> = Vec::new();
    if let Some(path) = &args.config {
        forwarded.push("--config".into());
        forwarded.push(path.clone().into_os_string());
    }
    let with_mode = |mode: &str| {
        let mut all = vec![OsString::from(mode)];
        all.extend(forwarded.iter().cloned());
        all
    };

    let player = EngineLauncher::<PlayerCommand>::spawn(&program, with_mode("play"), {
        let tx = event_tx.clone();
        move |reply| {
            let _ = tx.send(ControlEvent::Reply(EngineKind::Player, reply));
        }
    })?
    .with_grace(grace);
    let ripper = EngineLauncher::<RipperCommand>::spawn(&program, with_mode("rip"), {
        let tx = event_tx.clone();
        move |reply| {
            let _ = tx.send(ControlEvent::Reply(EngineKind::Ripper, reply));
        }
    })?
    .with_grace(grace);
    let worker = Worker::new(&program, with_mode("worker"));

    let mut controller = Controller {
        runtime: &runtime,
        player: EngineSlot::new(EngineKind::Player, player),
        ripper: EngineSlot::new(EngineKind::Ripper, ripper),
        worker,
        events: event_tx,
        state: ControllerState::new(),
    };
    controller.run(&event_rx);

    controller.worker.cancel();
    controller.player.shutdown(&runtime);
    controller.ripper.shutdown(&runtime);
    Ok(())
}

fn spawn_input_thread(tx: Sender<ControlEvent>) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(ControlEvent::Line(line)).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        log::error!("Cannot read input: {}", err);
                        break;
                    }
                }
            }
            let _ = tx.send(ControlEvent::InputClosed);
        })
        .context("Failed to spawn input thread")?;
    Ok(())
}

/// An engine launcher that is dropped once the engine stops taking commands
struct EngineSlot<C> {
    kind: EngineKind,
    launcher: Option<EngineLauncher<C>>,
}

impl<C: Message> EngineSlot<C> {
    fn new(kind: EngineKind, launcher: EngineLauncher<C>) -> Self {
        Self {
            kind,
            launcher: Some(launcher),
        }
    }

    /// Send `command`, returning whether it went out. A failed write marks the
    /// engine as lost in `state` and reaps it.
    fn send(
        &mut self,
        runtime: &tokio::runtime::Runtime,
        command: &C,
        state: &mut ControllerState,
    ) -> bool {
        let Some(launcher) = self.launcher.as_mut() else {
            state.engine_lost(self.kind, "not running");
            println!("[{}] {}", self.kind, state.status_message);
            return false;
        };
        let Err(err) = runtime.block_on(launcher.send_command(command)) else {
            return true;
        };
        log::error!("Cannot reach the {} engine: {}", self.kind, err);
        state.engine_lost(self.kind, &err.to_string());
        println!("[{}] {}", self.kind, state.status_message);
        self.shutdown(runtime);
        false
    }

    fn shutdown(&mut self, runtime: &tokio::runtime::Runtime) {
        if let Some(launcher) = self.launcher.take() {
            if let Err(err) = runtime.block_on(launcher.shutdown()) {
                log::warn!("Cannot shut down {}: {}", self.kind, err);
            }
        }
    }
}

struct Controller<'rt> {
    runtime: &'rt tokio::runtime::Runtime,
    player: EngineSlot<PlayerCommand>,
    ripper: EngineSlot<RipperCommand>,
    worker: Worker,
    events: Sender<ControlEvent>,
    state: ControllerState,
}

impl Controller<'_> {
    fn run(&mut self, events: &Receiver<ControlEvent>) {
        println!("{}", HELP);
        while let Ok(event) = events.recv() {
            match event {
                ControlEvent::Line(line) => match parse_line(&line) {
                    Ok(Some(Action::Quit)) => break,
                    Ok(Some(action)) => self.perform(action),
                    Ok(None) => {}
                    Err(err) => println!("? {:#}", err),
                },
                ControlEvent::InputClosed => break,
                ControlEvent::Reply(engine, reply) => {
                    self.state.handle_reply(engine, reply);
                    println!("[{}] {}", engine, self.state.status_message);
                }
                ControlEvent::WorkerDone {
                    task,
                    enqueue,
                    result,
                } => self.worker_done(task, enqueue, result),
            }
        }
    }

    fn perform(&mut self, action: Action) {
        match action {
            Action::Player(command) => {
                self.send_player(&command);
            }
            Action::Ripper(command) => {
                self.ripper.send(self.runtime, &command, &mut self.state);
            }
            Action::Worker(task) => self.run_worker(task, false),
            Action::QueueDisc { uuid, disc_num } => {
                self.run_worker(WorkerTask::DiscFiles { uuid, disc_num }, true)
            }
            Action::Help => println!("{}", HELP),
            Action::Quit => {}
        }
    }

    fn send_player(&mut self, command: &PlayerCommand) -> bool {
        self.player.send(self.runtime, command, &mut self.state)
    }

    fn run_worker(&self, task: WorkerTask, enqueue: bool) {
        let tx = self.events.clone();
        let sent = task.clone();
        self.worker.do_in_subprocess(task, move |result| {
            let _ = tx.send(ControlEvent::WorkerDone {
                task: sent,
                enqueue,
                result,
            });
        });
    }

    /// Print a worker result. With `enqueue`, the tracks of a disc are also
    /// queued and the set announced.
    fn worker_done(
        &mut self,
        task: WorkerTask,
        enqueue: bool,
        result: Result<WorkerOutput, String>,
    ) {
        if let (true, WorkerTask::DiscFiles { uuid, disc_num }, Ok(WorkerOutput::DiscFiles(files))) =
            (enqueue, &task, &result)
        {
            let queued = files.iter().all(|file| {
                self.send_player(&PlayerCommand::AppendQueue {
                    uuid: uuid.clone(),
                    track_id: TrackId::new(*disc_num, file.track_num),
                    duration_ns: file.duration_ns,
                })
            });
            if !queued || !self.send_player(&PlayerCommand::ReadyPlay) {
                return;
            }
            log::info!("Queued {} tracks of {}", files.len(), uuid);
        }
        self.state.handle_worker_result(result);
        println!("[worker] {}", self.state.status_message);
    }
}
