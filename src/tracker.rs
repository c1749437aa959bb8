mod dating;
mod matching;
mod motion;
mod store;
mod track;
mod track_state;

pub use dating::{
    DatingResult, DatingTracker, FrameOutput, TrackEvent, TrackerConfig, dating,
    dating_video, dating_with_estimator,
};
pub use matching::{
    AssignmentResult, AssignmentStrategy, Association, MatchGraph, Prediction, distance_matrix,
    linear_assignment,
};
pub use motion::{BlockMatching, MotionEstimator, MotionField, NoMotion};
pub use store::TrackStore;
pub use track::Track;
pub use track_state::{Termination, TrackOrigin, TrackStatus};
