//! Controller/engine channel of the Cadenza music library.
//!
//! Playback and ripping run in engine subprocesses that speak line-delimited
//! JSON over their stdin and stdout; short jobs run in one-shot worker
//! processes.

pub mod browser;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod launcher;
pub mod library;
pub mod metadata;
pub mod playback;
pub mod protocol;
pub mod rip;
pub mod transport;
pub mod worker;

pub use commands::{PlayerCommand, Reply, RipperCommand};
pub use config::Config;
pub use engine::{Bus, BusReceiver, Engine, bus, run_engine};
pub use error::{LaunchError, PipelineError, ProtocolError};
pub use launcher::EngineLauncher;
pub use library::Library;
pub use protocol::{Message, PipelineState, TrackId};
pub use worker::{Worker, WorkerOutput, WorkerTask};
