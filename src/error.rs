//! Error type shared by detection and tracking.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, DatingError>;

/// Errors raised while detecting or tracking cells.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatingError {
    /// The grid has a zero-length axis.
    #[error("grid is empty ({rows}x{cols})")]
    EmptyGrid { rows: usize, cols: usize },

    /// The input array is not two-dimensional.
    #[error("grid must be 2-D, got rank {0}")]
    InvalidRank(usize),

    /// Every pixel of the grid is NaN or infinite.
    #[error("grid contains no finite values")]
    NoFiniteValues,

    /// A threshold parameter is NaN or infinite.
    #[error("threshold must be finite, got {0}")]
    NonFiniteThreshold(f64),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Two arrays that must share a shape do not.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    /// Tracking needs two seed frames plus at least one tracked frame.
    #[error("tracking needs at least 3 frames, got {0}")]
    InsufficientHistory(usize),

    /// Frame data and timestamps disagree in length.
    #[error("{frames} frames but {timestamps} timestamps")]
    LengthMismatch { frames: usize, timestamps: usize },

    /// Frames must be supplied in strictly increasing time order.
    #[error("timestamp {timestamp} is not after previous frame at {previous}")]
    NonIncreasingTimestamp {
        previous: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// No track with this ID exists in the store.
    #[error("unknown track {0}")]
    UnknownTrack(u64),

    /// The track was terminated and cannot change anymore.
    #[error("track {0} is terminated")]
    TrackTerminated(u64),

    /// A failure attributed to one frame of a sequence.
    #[error("frame {index} at {timestamp}: {source}")]
    Frame {
        index: usize,
        timestamp: DateTime<Utc>,
        #[source]
        source: Box<DatingError>,
    },
}

impl DatingError {
    /// Attach frame context to an error.
    pub(crate) fn at_frame(self, index: usize, timestamp: DateTime<Utc>) -> Self {
        match self {
            already @ DatingError::Frame { .. } => already,
            other => DatingError::Frame {
                index,
                timestamp,
                source: Box::new(other),
            },
        }
    }
}
