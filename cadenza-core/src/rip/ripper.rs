use std::fs;
use std::path::{Path, PathBuf};

use crate::commands::{Reply, RipperCommand};
use crate::engine::Engine;
use crate::error::PipelineError;
use crate::library::Library;
use crate::protocol::{PipelineState, TrackId};

use super::pipeline::{RipEvent, RipPipeline};

/// The disc being ripped
#[derive(Debug)]
struct RipJob {
    uuid: String,
    disc_num: u32,
    /// Zero-based, as stored in the library
    track_num: u32,
    /// Known once the first table of contents arrived
    track_count: u32,
    staging: PathBuf,
    destination: PathBuf,
}

impl RipJob {
    fn track_id(&self) -> TrackId {
        TrackId::new(self.disc_num, self.track_num)
    }
}

/// The ripping engine's state machine.
pub struct Ripper<P> {
    pipeline: P,
    library: Library,
    job: Option<RipJob>,
    timer_running: bool,
}

impl<P: RipPipeline> Ripper<P> {
    pub fn new(pipeline: P, library: Library) -> Self {
        Self {
            pipeline,
            library,
            job: None,
            timer_running: false,
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn is_ripping(&self) -> bool {
        self.job.is_some()
    }

    pub fn rip(&mut self, uuid: String, disc_num: u32, replies: &mut Vec<Reply>) {
        if let Some(job) = &self.job {
            log::warn!("rip {} ignored, already ripping {}", uuid, job.uuid);
            return;
        }

        let dir = self.library.disc_dir(&uuid, disc_num);
        if let Err(err) = fs::create_dir_all(&dir) {
            log::error!("Cannot create {}: {}", dir.display(), err);
            replies.push(Reply::State(PipelineState::Null));
            replies.push(Reply::Error(format!("cannot create {}: {}", dir.display(), err)));
            return;
        }

        self.job = Some(RipJob {
            uuid: uuid.clone(),
            disc_num,
            track_num: 0,
            track_count: 0,
            staging: PathBuf::new(),
            destination: PathBuf::new(),
        });
        if let Err(err) = self.start_track() {
            return self.fail(err.to_string(), replies);
        }

        log::info!("Ripping disc {} of {}", disc_num, uuid);
        replies.push(Reply::State(PipelineState::Playing));
        replies.push(Reply::RipStarted { uuid, disc_num });
    }

    pub fn stop(&mut self, replies: &mut Vec<Reply>) {
        let Some(job) = self.job.take() else {
            log::debug!("stop: not ripping");
            return;
        };
        self.timer_running = false;
        if let Err(err) = self.pipeline.set_state(PipelineState::Null) {
            log::error!("Cannot reset rip pipeline: {}", err);
        }
        discard(&job.staging);
        log::info!("Rip of {} aborted at track {}", job.uuid, job.track_num);
        replies.push(Reply::State(PipelineState::Null));
        replies.push(Reply::RipAborted);
    }

    pub fn on_toc(&mut self, track_count: u32, replies: &mut Vec<Reply>) {
        let Some(job) = self.job.as_mut() else {
            return;
        };
        job.track_count = track_count;
        replies.push(Reply::RipTrackStarted {
            uuid: job.uuid.clone(),
            track_count,
            track_num: job.track_num,
        });
        self.timer_running = true;
    }

    pub fn on_tick(&mut self, replies: &mut Vec<Reply>) {
        let Some(job) = &self.job else {
            return;
        };
        let Some(fraction) = self.pipeline.progress() else {
            return;
        };
        replies.push(Reply::RipTrackPosition {
            uuid: job.uuid.clone(),
            disc_num: job.disc_num,
            track_num: job.track_num,
            fraction: fraction.clamp(0.0, 1.0),
        });
    }

    pub fn on_end_of_stream(&mut self, replies: &mut Vec<Reply>) {
        let Some(job) = self.job.as_mut() else {
            return;
        };
        self.timer_running = false;

        if let Err(err) = fs::rename(&job.staging, &job.destination) {
            let message = format!("cannot move {} into place: {}", job.staging.display(), err);
            return self.fail(message, replies);
        }
        log::info!("Ripped {}", job.destination.display());
        replies.push(Reply::RipTrackFinished {
            uuid: job.uuid.clone(),
            disc_num: job.disc_num,
            track_num: job.track_num,
        });

        job.track_num += 1;
        if job.track_num < job.track_count {
            let result = self
                .pipeline
                .set_state(PipelineState::Null)
                .and_then(|_| self.start_track());
            if let Err(err) = result {
                self.fail(err.to_string(), replies);
            }
            return;
        }

        self.job = None;
        if let Err(err) = self.pipeline.set_state(PipelineState::Null) {
            log::error!("Cannot reset rip pipeline: {}", err);
        }
        log::info!("Disc finished");
        replies.push(Reply::RipFinished);
        replies.push(Reply::State(PipelineState::Null));
    }

    /// Abandon the job and report the last line of `message`.
    pub fn fail(&mut self, message: String, replies: &mut Vec<Reply>) {
        log::error!("Rip pipeline error: {}", message);
        self.timer_running = false;
        if let Err(err) = self.pipeline.set_state(PipelineState::Null) {
            log::error!("Cannot reset rip pipeline: {}", err);
        }
        if let Some(job) = self.job.take() {
            discard(&job.staging);
        }
        replies.push(Reply::State(PipelineState::Null));
        replies.push(Reply::Error(last_line(&message).to_string()));
    }

    /// Point the pipeline at the job's current track and start it.
    fn start_track(&mut self) -> Result<(), PipelineError> {
        let job = self.job.as_mut().ok_or(PipelineError::NoSource)?;
        let track_id = job.track_id();
        job.destination = self.library.rip_path(&job.uuid, track_id);
        job.staging = self.library.staging_path(&job.uuid, track_id);

        self.pipeline.set_track(job.track_num + 1);
        self.pipeline.set_location(&job.staging);
        self.pipeline.set_state(PipelineState::Playing)
    }
}

impl<P: RipPipeline> Engine for Ripper<P> {
    type Command = RipperCommand;
    type Event = RipEvent;

    fn handle_command(
        &mut self,
        command: RipperCommand,
        replies: &mut Vec<Reply>,
    ) -> anyhow::Result<()> {
        match command {
            RipperCommand::Rip { uuid, disc_num } => self.rip(uuid, disc_num, replies),
            RipperCommand::Stop => self.stop(replies),
        }
        Ok(())
    }

    fn handle_event(&mut self, event: RipEvent, replies: &mut Vec<Reply>) -> anyhow::Result<()> {
        match event {
            RipEvent::Toc { track_count } => self.on_toc(track_count, replies),
            RipEvent::EndOfStream => self.on_end_of_stream(replies),
            RipEvent::Error(message) if self.job.is_some() => self.fail(message, replies),
            RipEvent::Error(message) => log::debug!("Ignoring error of a finished rip: {}", message),
        }
        Ok(())
    }

    fn handle_tick(&mut self, replies: &mut Vec<Reply>) -> anyhow::Result<()> {
        self.on_tick(replies);
        Ok(())
    }

    fn timer_running(&self) -> bool {
        self.timer_running
    }

    fn shutdown(&mut self) {
        self.timer_running = false;
        if let Err(err) = self.pipeline.set_state(PipelineState::Null) {
            log::error!("Cannot reset rip pipeline on shutdown: {}", err);
        }
        if let Some(job) = self.job.take() {
            discard(&job.staging);
        }
    }
}

fn discard(staging: &Path) {
    match fs::remove_file(staging) {
        Ok(()) => log::debug!("Removed {}", staging.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => log::warn!("Cannot remove {}: {}", staging.display(), err),
    }
}

/// Last non-blank line of a tool's diagnostic.
fn last_line(message: &str) -> &str {
    message
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or(message)
}
