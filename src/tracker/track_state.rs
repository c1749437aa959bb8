use serde::{Deserialize, Serialize};

/// Externally observable lifecycle state of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackStatus {
    /// Matched within the miss tolerance
    #[default]
    Active,
    /// Will never be extended again
    Terminated,
}

/// How a track came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackOrigin {
    /// Unmatched cell with no continuing track nearby
    #[default]
    Birth,
    /// Secondary fragment of a cell that continues as `parent`
    Split { parent: u64 },
}

/// Why a track was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Missed more consecutive frames than allowed
    Vanished,
    /// Absorbed by the track `into`, which kept the shared cell
    Merged { into: u64 },
}
