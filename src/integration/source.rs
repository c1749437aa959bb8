//! Trait for frame providers.

use std::convert::Infallible;

use crate::detection::Grid;

/// Provider of consecutive radar frames.
///
/// # Example
///
/// ```ignore
/// use tstorm_rs::{FrameSource, Grid};
///
/// struct Archive {
///     // Decoder state here
/// }
///
/// impl FrameSource for Archive {
///     type Error = std::io::Error;
///
///     fn next_frame(&mut self) -> Result<Option<Grid>, Self::Error> {
///         // Decode the next composite, or Ok(None) at the end
///         Ok(None)
///     }
/// }
/// ```
pub trait FrameSource {
    /// Error type for read or decode failures.
    type Error;

    /// Next frame in time order, or `None` when the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Grid>, Self::Error>;
}

impl FrameSource for std::vec::IntoIter<Grid> {
    type Error = Infallible;

    fn next_frame(&mut self) -> Result<Option<Grid>, Self::Error> {
        Ok(self.next())
    }
}
