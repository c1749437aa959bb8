//! Persistent identity of one storm cell across frames.

use chrono::{DateTime, Utc};
use nalgebra::Point2;
use serde::Serialize;

use crate::detection::Cell;
use crate::tracker::track_state::{Termination, TrackOrigin, TrackStatus};

/// One tracked cell.
///
/// The cell history is only extended by the store, so a track always holds
/// at least one cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    /// Unique track identifier, never reused
    pub id: u64,
    /// Observations in time order
    pub(crate) cells: Vec<Cell>,
    pub status: TrackStatus,
    /// Consecutive frames without a match
    pub misses: u32,
    pub origin: TrackOrigin,
    /// Set once the track is terminated
    pub termination: Option<Termination>,
    /// Timestamp of the frame in which the track was terminated
    pub terminated_at: Option<DateTime<Utc>>,
}

impl Track {
    pub(crate) fn new(id: u64, cell: Cell, origin: TrackOrigin) -> Self {
        Self {
            id,
            cells: vec![cell],
            status: TrackStatus::Active,
            misses: 0,
            origin,
            termination: None,
            terminated_at: None,
        }
    }

    /// Observations in time order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn is_active(&self) -> bool {
        self.status == TrackStatus::Active
    }

    /// Number of observed cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn last_cell(&self) -> &Cell {
        &self.cells[self.cells.len() - 1]
    }

    pub fn first_seen(&self) -> DateTime<Utc> {
        self.cells[0].timestamp
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_cell().timestamp
    }

    /// Centroid path of the track.
    pub fn path(&self) -> Vec<Point2<f64>> {
        self.cells.iter().map(|c| c.centroid).collect()
    }

    /// Frames elapsed since the last observation, counting the current one.
    pub fn frames_since_seen(&self) -> u32 {
        self.misses + 1
    }
}
