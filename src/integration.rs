//! Connecting frame providers to the DatingTracker.
//!
//! Radar data arrives from archives, decoders or live feeds. A [`FrameSource`]
//! hides where frames come from; [`DatingPipeline`] pulls them one at a time
//! so the caller can stop between frames.

mod pipeline;
mod source;

pub use pipeline::{DatingPipeline, PipelineError};
pub use source::FrameSource;
