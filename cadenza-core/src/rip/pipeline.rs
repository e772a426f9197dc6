use std::path::Path;

use crate::error::PipelineError;
use crate::protocol::PipelineState;

/// Events a ripping pipeline posts on its bus.
#[derive(Debug, Clone, PartialEq)]
pub enum RipEvent {
    /// The table of contents was read for the track being opened
    Toc { track_count: u32 },
    /// The current track is fully written
    EndOfStream,
    Error(String),
}

/// CD source feeding a lossless encoder that writes to a file.
///
/// Track and location are only changed while the pipeline is `NULL`.
pub trait RipPipeline {
    /// One-based track on the disc
    fn set_track(&mut self, track: u32);

    fn set_location(&mut self, path: &Path);

    fn set_state(&mut self, state: PipelineState) -> Result<(), PipelineError>;

    fn state(&self) -> PipelineState;

    /// Fraction of the current track read so far, once it is known
    fn progress(&self) -> Option<f64>;
}
