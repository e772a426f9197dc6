//! Playback engine: a pending queue of tracks played gaplessly through one
//! long-lived output pipeline.

pub mod output;
pub mod pipeline;
pub mod player;
pub mod queue;

pub use output::RodioPipeline;
pub use pipeline::{PlayerEvent, PlayerPipeline};
pub use player::{Player, TickKind, classify_tick};
pub use queue::{PendingQueue, QueuedTrack};
