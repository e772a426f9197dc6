use cadenza_core::{PipelineState, Reply, TrackId, WorkerOutput};
use strum::Display;

/// Which engine a reply came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum EngineKind {
    Player,
    Ripper,
}

/// Progress of the disc being ripped
#[derive(Debug, Clone, PartialEq)]
pub struct RipProgress {
    pub uuid: String,
    pub disc_num: u32,
    pub track_num: u32,
    pub track_count: u32,
    pub fraction: f64,
}

/// What the controller knows about its engines, rebuilt from their replies
#[derive(Debug, Clone)]
pub struct ControllerState {
    // ==============================
    // Playback
    // ==============================
    pub player_state: PipelineState,
    /// Position in the current track in seconds
    pub position: f64,
    pub duration: f64,
    /// Position in the whole set in seconds
    pub set_position: f64,
    pub set_duration: f64,
    pub current_track: Option<TrackId>,
    pub more_tracks: bool,

    // ==============================
    // Ripping
    // ==============================
    pub ripper_state: PipelineState,
    pub rip: Option<RipProgress>,

    /// Status message to display
    pub status_message: String,
    /// Error message if any
    pub error_message: Option<String>,
}

impl ControllerState {
    pub fn new() -> Self {
        Self {
            player_state: PipelineState::Null,
            position: 0.0,
            duration: 0.0,
            set_position: 0.0,
            set_duration: 0.0,
            current_track: None,
            more_tracks: false,
            ripper_state: PipelineState::Null,
            rip: None,
            status_message: "Idle".to_string(),
            error_message: None,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.player_state == PipelineState::Playing
    }

    /// Handle a reply from one of the engines
    pub fn handle_reply(&mut self, engine: EngineKind, reply: Reply) {
        self.error_message = None;

        match reply {
            Reply::Position {
                position,
                duration,
                set_position,
                set_duration,
            } => {
                self.position = position;
                self.duration = duration;
                self.set_position = set_position;
                self.set_duration = set_duration;
                self.status_message = format!(
                    "{} / {}  (set {} / {})",
                    format_time(position),
                    format_time(duration),
                    format_time(set_position),
                    format_time(set_duration)
                );
            }
            Reply::State(state) => {
                match engine {
                    EngineKind::Player => {
                        self.player_state = state;
                        if state == PipelineState::Null {
                            self.position = 0.0;
                        }
                    }
                    EngineKind::Ripper => self.ripper_state = state,
                }
                self.status_message = format!("{} {}", engine, state_label(state));
            }
            Reply::TrackStarted {
                duration,
                more_tracks,
                track_id,
            } => {
                self.current_track = Some(track_id);
                self.duration = duration;
                self.position = 0.0;
                self.more_tracks = more_tracks;
                self.status_message = format!(
                    "Track {} of disc {} ({}){}",
                    track_id.track_num + 1,
                    track_id.disc_num + 1,
                    format_time(duration),
                    if more_tracks { "" } else { ", last of the set" }
                );
            }
            Reply::TrackFinished {
                remaining,
                track_id,
            } => {
                self.status_message = format!(
                    "Finished track {}, {} to go",
                    track_id.track_num + 1,
                    remaining
                );
            }
            Reply::SetReady { duration } => {
                self.set_duration = duration;
                self.set_position = 0.0;
                self.status_message = format!("Set ready: {}", format_time(duration));
            }
            Reply::SetFinished => {
                self.current_track = None;
                self.more_tracks = false;
                self.status_message = "Set finished".to_string();
            }
            Reply::RipStarted { uuid, disc_num } => {
                self.status_message = format!("Ripping disc {} of {}", disc_num + 1, uuid);
                self.rip = Some(RipProgress {
                    uuid,
                    disc_num,
                    track_num: 0,
                    track_count: 0,
                    fraction: 0.0,
                });
            }
            Reply::RipTrackStarted {
                uuid: _,
                track_count,
                track_num,
            } => {
                if let Some(rip) = &mut self.rip {
                    rip.track_count = track_count;
                    rip.track_num = track_num;
                    rip.fraction = 0.0;
                }
                self.status_message = format!("Ripping track {}/{}", track_num + 1, track_count);
            }
            Reply::RipTrackPosition {
                track_num,
                fraction,
                ..
            } => {
                let count = self.rip.as_ref().map(|r| r.track_count).unwrap_or(0);
                if let Some(rip) = &mut self.rip {
                    rip.track_num = track_num;
                    rip.fraction = fraction;
                }
                self.status_message = format!(
                    "Ripping track {}/{}: {:3.0}%",
                    track_num + 1,
                    count,
                    fraction * 100.0
                );
            }
            Reply::RipTrackFinished { track_num, .. } => {
                if let Some(rip) = &mut self.rip {
                    rip.fraction = 1.0;
                }
                self.status_message = format!("Ripped track {}", track_num + 1);
            }
            Reply::RipFinished => {
                self.rip = None;
                self.status_message = "Rip finished".to_string();
            }
            Reply::RipAborted => {
                self.rip = None;
                self.status_message = "Rip aborted".to_string();
            }
            Reply::Error(msg) => {
                self.status_message = format!("Error: {}", msg);
                self.error_message = Some(msg);
            }
        }
    }

    /// An engine stopped accepting commands.
    pub fn engine_lost(&mut self, engine: EngineKind, message: &str) {
        match engine {
            EngineKind::Player => {
                self.player_state = PipelineState::Null;
                self.current_track = None;
                self.position = 0.0;
            }
            EngineKind::Ripper => {
                self.ripper_state = PipelineState::Null;
                self.rip = None;
            }
        }
        self.status_message = format!("{} engine unavailable: {}", engine, message);
        self.error_message = Some(message.to_string());
    }

    /// Handle the result of a worker task
    pub fn handle_worker_result(&mut self, result: Result<WorkerOutput, String>) {
        self.error_message = None;

        match result {
            Ok(WorkerOutput::Metadata(metadata)) => {
                self.status_message = metadata.to_string();
            }
            Ok(WorkerOutput::Directory(entries)) => {
                self.status_message = entries
                    .iter()
                    .map(|e| {
                        if e.is_dir {
                            format!("{}/", e.name)
                        } else {
                            e.name.clone()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            Ok(WorkerOutput::DiscFiles(files)) => {
                self.status_message = files
                    .iter()
                    .map(|f| {
                        format!(
                            "{:02}  {}  {}",
                            f.track_num,
                            format_time(f.duration_ns as f64 / 1e9),
                            f.path.display()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            Ok(WorkerOutput::Toc(toc)) => {
                let total: f64 = toc.iter().map(|t| t.duration().as_secs_f64()).sum();
                self.status_message = format!("{} tracks, {}", toc.len(), format_time(total));
            }
            Err(msg) => {
                self.status_message = format!("Error: {}", msg);
                self.error_message = Some(msg);
            }
        }
    }
}

fn state_label(state: PipelineState) -> &'static str {
    match state {
        PipelineState::Null | PipelineState::VoidPending => "stopped",
        PipelineState::Ready => "ready",
        PipelineState::Paused => "paused",
        PipelineState::Playing => "running",
    }
}

/// `m:ss`, or `h:mm:ss` from one hour on. Negative and non-finite times show
/// as zero.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.round() as u64
    } else {
        0
    };
    let (hours, mins, secs) = (total / 3600, total / 60 % 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_times() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(65.4), "1:05");
        assert_eq!(format_time(3725.0), "1:02:05");
        assert_eq!(format_time(-3.0), "0:00");
        assert_eq!(format_time(f64::NAN), "0:00");
    }

    #[test]
    fn tracks_playback_replies() {
        let mut state = ControllerState::new();
        state.handle_reply(EngineKind::Player, Reply::SetReady { duration: 300.0 });
        state.handle_reply(
            EngineKind::Player,
            Reply::TrackStarted {
                duration: 120.0,
                more_tracks: true,
                track_id: TrackId::new(0, 0),
            },
        );
        state.handle_reply(EngineKind::Player, Reply::State(PipelineState::Playing));
        assert!(state.is_playing());
        assert_eq!(state.current_track, Some(TrackId::new(0, 0)));
        assert_eq!(state.set_duration, 300.0);

        state.handle_reply(EngineKind::Player, Reply::SetFinished);
        assert_eq!(state.current_track, None);
    }

    #[test]
    fn ripper_state_is_kept_apart() {
        let mut state = ControllerState::new();
        state.handle_reply(EngineKind::Ripper, Reply::State(PipelineState::Playing));
        assert!(!state.is_playing());
        assert_eq!(state.ripper_state, PipelineState::Playing);
    }

    #[test]
    fn rip_progress_follows_replies() {
        let mut state = ControllerState::new();
        state.handle_reply(
            EngineKind::Ripper,
            Reply::RipStarted {
                uuid: "u".into(),
                disc_num: 0,
            },
        );
        state.handle_reply(
            EngineKind::Ripper,
            Reply::RipTrackStarted {
                uuid: "u".into(),
                track_count: 12,
                track_num: 0,
            },
        );
        state.handle_reply(
            EngineKind::Ripper,
            Reply::RipTrackPosition {
                uuid: "u".into(),
                disc_num: 0,
                track_num: 0,
                fraction: 0.25,
            },
        );
        assert_eq!(state.status_message, "Ripping track 1/12:  25%");
        state.handle_reply(EngineKind::Ripper, Reply::RipAborted);
        assert!(state.rip.is_none());
    }

    #[test]
    fn lost_engine_resets_its_state_only() {
        let mut state = ControllerState::new();
        state.handle_reply(EngineKind::Player, Reply::State(PipelineState::Playing));
        state.handle_reply(EngineKind::Ripper, Reply::State(PipelineState::Playing));

        state.engine_lost(EngineKind::Player, "broken pipe");
        assert!(!state.is_playing());
        assert_eq!(state.ripper_state, PipelineState::Playing);
        assert_eq!(state.status_message, "player engine unavailable: broken pipe");
        assert_eq!(state.error_message.as_deref(), Some("broken pipe"));
    }

    #[test]
    fn errors_are_remembered_until_the_next_reply() {
        let mut state = ControllerState::new();
        state.handle_reply(EngineKind::Player, Reply::Error("no output device".into()));
        assert_eq!(state.error_message.as_deref(), Some("no output device"));
        state.handle_reply(EngineKind::Player, Reply::State(PipelineState::Null));
        assert_eq!(state.error_message, None);
    }
}
