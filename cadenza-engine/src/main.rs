//! Engine subprocesses of the cadenza controller.
//!
//! `play` and `rip` serve commands on stdin until stdin closes or `SIGINT`
//! arrives; `worker` runs one task and exits. Logs go to stderr.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use cadenza_core::{
    Config, Library, bus,
    engine::run_engine,
    playback::{Player, RodioPipeline},
    rip::{CddaPipeline, RipTools, Ripper},
    worker,
};

#[derive(Parser, Debug)]
#[command(name = "cadenza-engine")]
#[command(about = "Playback, ripping and worker engine for cadenza")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "CADENZA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Mode {
    /// Gapless playback of a queue of tracks
    Play,
    /// Rip the disc in the drive into the library
    Rip,
    /// Run a single task read from stdin
    Worker,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    log::debug!("Engine {:?} with {:?}", args.mode, config);

    let result = match args.mode {
        Mode::Play => play(&config).await,
        Mode::Rip => rip(&config).await,
        Mode::Worker => worker::serve(&config, tokio::io::stdin(), tokio::io::stdout()).await,
    };
    if let Err(err) = &result {
        log::error!("{:?} engine failed: {:#}", args.mode, err);
    }
    result
}

async fn play(config: &Config) -> anyhow::Result<()> {
    let (bus, events) = bus();
    let pipeline = RodioPipeline::spawn(Duration::from_millis(config.about_to_finish_ms), bus)
        .context("Cannot open audio output")?;
    let player = Player::new(pipeline, Library::from_config(config));

    log::info!("Playback engine ready, library at {}", config.sound_root.display());
    run_engine(
        player,
        events,
        tokio::io::stdin(),
        tokio::io::stdout(),
        Duration::from_millis(config.tick_interval_ms),
        interrupted(),
    )
    .await
}

async fn rip(config: &Config) -> anyhow::Result<()> {
    let (bus, events) = bus();
    let pipeline = CddaPipeline::new(RipTools::from_config(config), bus);
    let ripper = Ripper::new(pipeline, Library::from_config(config));

    log::info!("Ripping engine ready on {}", config.cd_device);
    run_engine(
        ripper,
        events,
        tokio::io::stdin(),
        tokio::io::stdout(),
        Duration::from_millis(config.tick_interval_ms),
        interrupted(),
    )
    .await
}

/// Resolves on the first `SIGINT`.
async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("Cannot listen for SIGINT: {}", err);
        std::future::pending::<()>().await;
    }
}
