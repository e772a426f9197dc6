use std::time::Duration;

use crate::commands::{PlayerCommand, Reply};
use crate::engine::Engine;
use crate::error::PipelineError;
use crate::library::Library;
use crate::protocol::PipelineState;

use super::pipeline::{PlayerEvent, PlayerPipeline};
use super::queue::{PendingQueue, QueuedTrack};

/// What a progress tick observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    /// The pipeline moved on to the pre-bound next track
    Rollover,
    Progress,
}

/// Decide whether the pipeline silently rolled over to the next source.
///
/// After about-to-finish the next source is bound; once it starts playing
/// the position restarts from zero, so a position lower than the previous
/// one marks the transition. This only holds at the tick cadence: two
/// rollovers within one tick, or a backwards seek right after
/// about-to-finish, are not told apart.
pub fn classify_tick(
    about_to_finish: bool,
    next_bound: bool,
    last_position: Duration,
    position: Duration,
) -> TickKind {
    if about_to_finish && next_bound && position < last_position {
        TickKind::Rollover
    } else {
        TickKind::Progress
    }
}

/// The playback engine's state machine.
pub struct Player<P> {
    pipeline: P,
    library: Library,
    queue: PendingQueue,
    current: Option<QueuedTrack>,
    /// Pre-bound after about-to-finish, promoted on rollover
    next: Option<QueuedTrack>,
    /// Total duration of the tracks of the set already played
    segment_start: Duration,
    set_duration: Duration,
    random: bool,
    about_to_finish: bool,
    last_position: Duration,
    timer_running: bool,
}

impl<P: PlayerPipeline> Player<P> {
    pub fn new(pipeline: P, library: Library) -> Self {
        Self {
            pipeline,
            library,
            queue: PendingQueue::new(),
            current: None,
            next: None,
            segment_start: Duration::ZERO,
            set_duration: Duration::ZERO,
            random: false,
            about_to_finish: false,
            last_position: Duration::ZERO,
            timer_running: false,
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut P {
        &mut self.pipeline
    }

    pub fn current(&self) -> Option<&QueuedTrack> {
        self.current.as_ref()
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn segment_start(&self) -> Duration {
        self.segment_start
    }

    pub fn is_about_to_finish(&self) -> bool {
        self.about_to_finish
    }

    // ==============================================
    // Commands
    // ==============================================

    pub fn append_queue(&mut self, track: QueuedTrack) {
        self.queue.push_back(track);
    }

    /// Start a new set from the pending queue. A track still current from
    /// an earlier set goes back to the front of the queue.
    pub fn ready_play(&mut self, replies: &mut Vec<Reply>) {
        self.about_to_finish = false;
        self.unbind_next();
        if let Some(track) = self.current.take() {
            log::info!(
                "New set, returning disc {} track {} to the queue",
                track.track_id.disc_num,
                track.track_id.track_num
            );
            self.queue.push_front(track);
            self.timer_running = false;
            if self.pipeline.state() != PipelineState::Null {
                match self.pipeline.set_state(PipelineState::Null) {
                    Ok(()) => replies.push(Reply::State(PipelineState::Null)),
                    Err(err) => return self.fail(err.to_string(), replies),
                }
            }
        }
        self.segment_start = Duration::ZERO;
        self.set_duration = self.queue.total_duration();
        replies.push(Reply::SetReady {
            duration: self.set_duration.as_secs_f64(),
        });
        if !self.start_next_track(replies) {
            log::info!("Set is empty, nothing to make current");
        }
    }

    pub fn play(&mut self, replies: &mut Vec<Reply>) {
        if self.current.is_none() {
            log::warn!("play: no current track, send ready-play first");
            return;
        }
        let result = if self.pipeline.state() == PipelineState::Null {
            self.bind_current()
                .and_then(|_| self.pipeline.set_state(PipelineState::Playing))
        } else {
            self.pipeline.set_state(PipelineState::Playing)
        };
        match result {
            Ok(()) => {
                self.timer_running = true;
                log::info!("Playing");
                replies.push(Reply::State(PipelineState::Playing));
            }
            Err(err) => self.fail(err.to_string(), replies),
        }
    }

    pub fn pause(&mut self, replies: &mut Vec<Reply>) {
        if self.pipeline.state() != PipelineState::Playing {
            return;
        }
        self.timer_running = false;
        match self.pipeline.set_state(PipelineState::Paused) {
            Ok(()) => {
                log::info!("Paused");
                replies.push(Reply::State(PipelineState::Paused));
            }
            Err(err) => self.fail(err.to_string(), replies),
        }
    }

    pub fn stop(&mut self, replies: &mut Vec<Reply>) {
        self.timer_running = false;
        self.about_to_finish = false;
        self.unbind_next();
        match self.pipeline.set_state(PipelineState::Null) {
            Ok(()) => {
                log::info!("Stopped");
                replies.push(Reply::State(PipelineState::Null));
            }
            Err(err) => self.fail(err.to_string(), replies),
        }
    }

    pub fn next_track(&mut self, replies: &mut Vec<Reply>) {
        let Some(old) = self.current.take() else {
            log::warn!("next-track: no current track");
            return;
        };
        let before = self.pipeline.state();
        self.about_to_finish = false;
        self.unbind_next();
        self.finish_track(old, replies);

        if !self.start_next_track(replies) {
            self.finish_set(replies);
            return;
        }

        let target = if before == PipelineState::Playing {
            PipelineState::Playing
        } else {
            PipelineState::Paused
        };
        match self.rebind(target) {
            Ok(()) if target != before => replies.push(Reply::State(target)),
            Ok(()) => {}
            Err(err) => self.fail(err.to_string(), replies),
        }
    }

    pub fn set_ratio(&mut self, ratio: f64, replies: &mut Vec<Reply>) {
        if self.about_to_finish {
            log::debug!("set-ratio ignored, moving on to the next track");
            return;
        }
        if !ratio.is_finite() {
            log::warn!("set-ratio: ignoring ratio {}", ratio);
            return;
        }
        let Some(track) = &self.current else {
            return;
        };
        let ratio = ratio.clamp(0.0, 1.0);
        let target = Duration::from_nanos((track.duration.as_nanos() as f64 * ratio).round() as u64);

        if self.pipeline.state() == PipelineState::Null {
            let result = self
                .bind_current()
                .and_then(|_| self.pipeline.set_state(PipelineState::Paused))
                .and_then(|_| self.pipeline.seek(target));
            match result {
                Ok(()) => replies.push(Reply::State(PipelineState::Paused)),
                Err(err) => return self.fail(err.to_string(), replies),
            }
        } else if let Err(err) = self.pipeline.seek(target) {
            return self.fail(err.to_string(), replies);
        }
        self.last_position = target;
    }

    pub fn random(&mut self, enabled: bool, replies: &mut Vec<Reply>) {
        self.random = enabled;
        log::info!("Random order {}", if enabled { "on" } else { "off" });
        if !enabled || self.pipeline.state() == PipelineState::Playing {
            return;
        }
        let Some(track) = self.current.take() else {
            return;
        };
        // put the current track back so the next pop is a real draw
        self.about_to_finish = false;
        self.unbind_next();
        self.queue.push_back(track);
        if self.pipeline.state() != PipelineState::Null {
            match self.pipeline.set_state(PipelineState::Null) {
                Ok(()) => replies.push(Reply::State(PipelineState::Null)),
                Err(err) => self.fail(err.to_string(), replies),
            }
        }
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
        self.segment_start = Duration::ZERO;
    }

    pub fn volume(&mut self, value: f64) {
        self.pipeline.set_volume(value.clamp(0.0, 1.0));
    }

    pub fn get_state(&self, replies: &mut Vec<Reply>) {
        replies.push(Reply::State(self.pipeline.state()));
    }

    // ==============================================
    // Pipeline events
    // ==============================================

    pub fn on_about_to_finish(&mut self, replies: &mut Vec<Reply>) {
        if self.current.is_none() || self.about_to_finish {
            return;
        }
        self.about_to_finish = true;
        let Some(mut track) = self.queue.pop(self.random) else {
            log::debug!("About to finish the last track of the set");
            return;
        };
        let resolved = self.library.resolve(&track.uuid, track.track_id);
        track.valid = resolved.valid;
        match self.pipeline.set_next_source(&resolved.path) {
            Ok(()) => self.next = Some(track),
            Err(err) => {
                self.queue.push_front(track);
                self.fail(err.to_string(), replies);
            }
        }
    }

    pub fn on_tick(&mut self, replies: &mut Vec<Reply>) {
        let Some(position) = self.pipeline.position() else {
            return;
        };
        match classify_tick(
            self.about_to_finish,
            self.next.is_some(),
            self.last_position,
            position,
        ) {
            TickKind::Rollover => self.roll_over(replies),
            TickKind::Progress => {
                let duration = self.current.as_ref().map(|t| t.duration).unwrap_or_default();
                replies.push(Reply::Position {
                    position: position.as_secs_f64(),
                    duration: duration.as_secs_f64(),
                    set_position: (self.segment_start + position).as_secs_f64(),
                    set_duration: self.set_duration.as_secs_f64(),
                });
            }
        }
        self.last_position = position;
    }

    pub fn on_end_of_stream(&mut self, replies: &mut Vec<Reply>) {
        if self.current.is_none() && self.next.is_none() {
            log::debug!("End of stream with nothing playing");
            return;
        }
        self.about_to_finish = false;
        if let Some(old) = self.current.take() {
            self.finish_track(old, replies);
        }
        // rollover went unnoticed: the pre-bound track has played as well
        if let Some(next) = self.next.take() {
            replies.push(self.track_started(&next));
            self.finish_track(next, replies);
        }

        if self.start_next_track(replies) {
            log::warn!("Output ran dry before the next track was bound, restarting");
            if let Err(err) = self.rebind(PipelineState::Playing) {
                self.fail(err.to_string(), replies);
            }
            return;
        }
        self.finish_set(replies);
    }

    /// Return the pipeline to `NULL` and report `message`. No retry.
    pub fn fail(&mut self, message: String, replies: &mut Vec<Reply>) {
        log::error!("Playback pipeline error: {}", message);
        self.timer_running = false;
        self.about_to_finish = false;
        self.unbind_next();
        if let Err(err) = self.pipeline.set_state(PipelineState::Null) {
            log::error!("Cannot reset pipeline: {}", err);
        }
        replies.push(Reply::State(PipelineState::Null));
        replies.push(Reply::Error(message));
    }

    // ==============================================
    // Helpers
    // ==============================================

    fn track_started(&self, track: &QueuedTrack) -> Reply {
        Reply::TrackStarted {
            duration: track.duration.as_secs_f64(),
            more_tracks: !self.queue.is_empty(),
            track_id: track.track_id,
        }
    }

    fn finish_track(&mut self, track: QueuedTrack, replies: &mut Vec<Reply>) {
        self.segment_start += track.duration;
        replies.push(Reply::TrackFinished {
            remaining: self.queue.len(),
            track_id: track.track_id,
        });
    }

    /// Pop the next pending track and make it current.
    fn start_next_track(&mut self, replies: &mut Vec<Reply>) -> bool {
        match self.queue.pop(self.random) {
            Some(track) => {
                self.last_position = Duration::ZERO;
                replies.push(self.track_started(&track));
                self.current = Some(track);
                true
            }
            None => false,
        }
    }

    fn finish_set(&mut self, replies: &mut Vec<Reply>) {
        self.timer_running = false;
        if let Err(err) = self.pipeline.set_state(PipelineState::Null) {
            log::error!("Cannot reset pipeline: {}", err);
        }
        log::info!("Set finished");
        replies.push(Reply::SetFinished);
    }

    fn bind_current(&mut self) -> Result<(), PipelineError> {
        let track = self.current.as_mut().ok_or(PipelineError::NoSource)?;
        let resolved = self.library.resolve(&track.uuid, track.track_id);
        track.valid = resolved.valid;
        self.pipeline.set_source(&resolved.path)
    }

    /// Load the current track from scratch and bring the pipeline to
    /// `target`. A paused pipeline is pre-rolled at position zero.
    fn rebind(&mut self, target: PipelineState) -> Result<(), PipelineError> {
        self.pipeline.set_state(PipelineState::Null)?;
        self.bind_current()?;
        self.pipeline.set_state(target)?;
        if target == PipelineState::Paused {
            self.pipeline.seek(Duration::ZERO)?;
        }
        self.last_position = Duration::ZERO;
        Ok(())
    }

    fn unbind_next(&mut self) {
        if let Some(next) = self.next.take() {
            self.queue.push_front(next);
        }
    }

    fn roll_over(&mut self, replies: &mut Vec<Reply>) {
        self.about_to_finish = false;
        let Some(next) = self.next.take() else {
            return;
        };
        if let Some(old) = self.current.take() {
            self.finish_track(old, replies);
        }
        log::info!(
            "Rolled over to disc {} track {}",
            next.track_id.disc_num,
            next.track_id.track_num
        );
        replies.push(self.track_started(&next));
        self.current = Some(next);
    }
}

impl<P: PlayerPipeline> Engine for Player<P> {
    type Command = PlayerCommand;
    type Event = PlayerEvent;

    fn handle_command(
        &mut self,
        command: PlayerCommand,
        replies: &mut Vec<Reply>,
    ) -> anyhow::Result<()> {
        match command {
            PlayerCommand::AppendQueue {
                uuid,
                track_id,
                duration_ns,
            } => self.append_queue(QueuedTrack::new(
                uuid,
                track_id,
                Duration::from_nanos(duration_ns),
            )),
            PlayerCommand::ReadyPlay => self.ready_play(replies),
            PlayerCommand::Random(enabled) => self.random(enabled, replies),
            PlayerCommand::Play => self.play(replies),
            PlayerCommand::NextTrack => self.next_track(replies),
            PlayerCommand::Pause => self.pause(replies),
            PlayerCommand::Stop => self.stop(replies),
            PlayerCommand::ClearQueue => self.clear_queue(),
            PlayerCommand::Volume(value) => self.volume(value),
            PlayerCommand::GetState => self.get_state(replies),
            PlayerCommand::SetRatio(ratio) => self.set_ratio(ratio, replies),
        }
        Ok(())
    }

    fn handle_event(&mut self, event: PlayerEvent, replies: &mut Vec<Reply>) -> anyhow::Result<()> {
        match event {
            PlayerEvent::AboutToFinish => self.on_about_to_finish(replies),
            PlayerEvent::EndOfStream => self.on_end_of_stream(replies),
            PlayerEvent::Error(message) => self.fail(message, replies),
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
            log::error!("Cannot reset pipeline on shutdown: {}", err);
        }
    }
}
