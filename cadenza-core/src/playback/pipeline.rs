use std::path::Path;
use std::time::Duration;

use crate::error::PipelineError;
use crate::protocol::PipelineState;

/// Events a playback pipeline posts on its bus.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// The current source is about to run out; bind the next one now to
    /// play it without a gap
    AboutToFinish,
    /// The last bound source has finished
    EndOfStream,
    Error(String),
}

/// A gapless playback pipeline.
///
/// Sources are bound while the pipeline is `NULL`; a next source may be
/// bound at any time and starts when the current one ends. After that
/// rollover [`PlayerPipeline::position`] restarts from zero.
pub trait PlayerPipeline {
    fn set_source(&mut self, path: &Path) -> Result<(), PipelineError>;

    fn set_next_source(&mut self, path: &Path) -> Result<(), PipelineError>;

    fn set_state(&mut self, state: PipelineState) -> Result<(), PipelineError>;

    fn state(&self) -> PipelineState;

    /// Position within the source currently heard, `None` when nothing is
    /// loaded.
    fn position(&self) -> Option<Duration>;

    fn seek(&mut self, position: Duration) -> Result<(), PipelineError>;

    /// 0.0 to 1.0
    fn set_volume(&mut self, volume: f64);
}
