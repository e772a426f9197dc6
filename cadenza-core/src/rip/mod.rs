//! Ripping engine: reads every track of the disc in the drive and encodes
//! it into the library, one staged file at a time.

pub mod cdda;
pub mod pipeline;
pub mod ripper;

pub use cdda::{CddaPipeline, RipTools, TocEntry, parse_toc, read_toc};
pub use pipeline::{RipEvent, RipPipeline};
pub use ripper::Ripper;
