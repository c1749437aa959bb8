//! Thunderstorm cell detection and tracking (DATing) on gridded radar fields.
//!
//! Single frames are segmented and labeled by [`detect`]. Sequences are tracked
//! with [`dating`] or frame by frame with [`DatingTracker`].

pub mod detection;
pub mod error;
pub mod integration;
pub mod tracker;

pub use detection::{
    BoundingBox, Cell, Detection, DetectionConfig, Grid, IntensityStats, Mask, ThresholdMode,
    detect,
};
pub use error::{DatingError, Result};
pub use integration::{DatingPipeline, FrameSource, PipelineError};
pub use tracker::{
    AssignmentStrategy, BlockMatching, DatingResult, DatingTracker, FrameOutput, MotionEstimator,
    MotionField, NoMotion, Termination, Track, TrackEvent, TrackOrigin, TrackStatus, TrackStore,
    TrackerConfig, dating, dating_video, dating_with_estimator,
};
