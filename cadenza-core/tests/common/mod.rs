#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cadenza_core::playback::PlayerPipeline;
use cadenza_core::rip::RipPipeline;
use cadenza_core::{Library, PipelineError, PipelineState, TrackId};

pub const UUID: &str = "5f1c2b9e";

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

pub fn library(root: &Path) -> Library {
    Library::new(root, vec!["flac".into(), "ogg".into()], root.join("alert.ogg"))
}

/// Put an empty ripped file for a track into the library.
pub fn add_track(library: &Library, track_id: TrackId) -> PathBuf {
    fs::create_dir_all(library.disc_dir(UUID, track_id.disc_num)).unwrap();
    let path = library.rip_path(UUID, track_id);
    fs::write(&path, b"").unwrap();
    path
}

/// Playback pipeline that only records what it is told.
#[derive(Debug, Default)]
pub struct FakePlayerPipeline {
    pub state: PipelineState,
    pub source: Option<PathBuf>,
    pub next_source: Option<PathBuf>,
    /// Reported while not `NULL`
    pub position: Option<Duration>,
    pub seeks: Vec<Duration>,
    pub volume: Option<f64>,
    /// Fail the next transition to `PLAYING`
    pub fail_play: bool,
}

impl PlayerPipeline for FakePlayerPipeline {
    fn set_source(&mut self, path: &Path) -> Result<(), PipelineError> {
        self.source = Some(path.to_path_buf());
        Ok(())
    }

    fn set_next_source(&mut self, path: &Path) -> Result<(), PipelineError> {
        self.next_source = Some(path.to_path_buf());
        Ok(())
    }

    fn set_state(&mut self, state: PipelineState) -> Result<(), PipelineError> {
        if state == PipelineState::Playing && std::mem::take(&mut self.fail_play) {
            self.state = PipelineState::Null;
            return Err(PipelineError::Output("device unplugged".into()));
        }
        match state {
            PipelineState::Null => {
                self.position = None;
                self.next_source = None;
            }
            _ => {
                self.position.get_or_insert(Duration::ZERO);
            }
        }
        self.state = state;
        Ok(())
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    fn position(&self) -> Option<Duration> {
        if self.state == PipelineState::Null {
            None
        } else {
            self.position
        }
    }

    fn seek(&mut self, position: Duration) -> Result<(), PipelineError> {
        self.seeks.push(position);
        self.position = Some(position);
        Ok(())
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = Some(volume);
    }
}

/// Rip pipeline that creates its output file when started.
#[derive(Debug)]
pub struct FakeRipPipeline {
    pub state: PipelineState,
    pub track: u32,
    pub location: Option<PathBuf>,
    /// One-based tracks in the order they were started
    pub started: Vec<u32>,
    pub progress: Option<f64>,
}

impl Default for FakeRipPipeline {
    fn default() -> Self {
        Self {
            state: PipelineState::Null,
            track: 0,
            location: None,
            started: Vec::new(),
            progress: Some(0.5),
        }
    }
}

impl RipPipeline for FakeRipPipeline {
    fn set_track(&mut self, track: u32) {
        self.track = track;
    }

    fn set_location(&mut self, path: &Path) {
        self.location = Some(path.to_path_buf());
    }

    fn set_state(&mut self, state: PipelineState) -> Result<(), PipelineError> {
        if state == PipelineState::Playing && self.state != PipelineState::Playing {
            let location = self.location.as_ref().ok_or(PipelineError::NoSource)?;
            fs::write(location, b"fLaC")?;
            self.started.push(self.track);
        }
        self.state = state;
        Ok(())
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    fn progress(&self) -> Option<f64> {
        self.progress
    }
}
