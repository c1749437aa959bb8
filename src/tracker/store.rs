//! Registry of tracks and the track ID allocator.

use chrono::{DateTime, Utc};

use crate::detection::Cell;
use crate::error::{DatingError, Result};
use crate::tracker::track::Track;
use crate::tracker::track_state::{Termination, TrackOrigin, TrackStatus};

/// Owns every track of a sequence, active and terminated.
///
/// IDs start at 1 and increase by one per created track; the ID of a
/// terminated track is never handed out again. [`TrackStore::reset`] starts a
/// new, unrelated sequence.
#[derive(Debug, Clone)]
pub struct TrackStore {
    /// Sorted by ID
    tracks: Vec<Track>,
    next_id: u64,
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackStore {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    /// Forget all tracks and restart IDs at 1.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }

    /// ID the next created track will receive.
    pub fn peek_next_id(&self) -> u64 {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn into_tracks(self) -> Vec<Track> {
        self.tracks
    }

    pub fn get(&self, id: u64) -> Option<&Track> {
        self.index_of(id).map(|i| &self.tracks[i])
    }

    /// Active tracks in ID order.
    pub fn active_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active_tracks().count()
    }

    /// Start a new track with its first cell and return its ID.
    pub fn create(&mut self, cell: Cell, origin: TrackOrigin) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.tracks.push(Track::new(id, cell, origin));
        id
    }

    /// Extend an active track and clear its miss count.
    pub fn append(&mut self, id: u64, cell: Cell) -> Result<()> {
        let track = self.active_mut(id)?;
        let previous = track.last_seen();
        if cell.timestamp <= previous {
            return Err(DatingError::NonIncreasingTimestamp {
                previous,
                timestamp: cell.timestamp,
            });
        }
        track.cells.push(cell);
        track.misses = 0;
        Ok(())
    }

    /// Count one more consecutive miss; returns the new miss count.
    pub fn record_miss(&mut self, id: u64) -> Result<u32> {
        let track = self.active_mut(id)?;
        track.misses += 1;
        Ok(track.misses)
    }

    pub fn mark_terminated(
        &mut self,
        id: u64,
        reason: Termination,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let track = self.active_mut(id)?;
        track.status = TrackStatus::Terminated;
        track.termination = Some(reason);
        track.terminated_at = Some(at);
        Ok(())
    }

    fn index_of(&self, id: u64) -> Option<usize> {
        self.tracks.binary_search_by_key(&id, |t| t.id).ok()
    }

    fn active_mut(&mut self, id: u64) -> Result<&mut Track> {
        let index = self.index_of(id).ok_or(DatingError::UnknownTrack(id))?;
        let track = &mut self.tracks[index];
        if !track.is_active() {
            return Err(DatingError::TrackTerminated(id));
        }
        Ok(track)
    }
}
