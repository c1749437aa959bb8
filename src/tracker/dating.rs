//! DATing: detection and tracking over a sequence of frames.

use chrono::{DateTime, Utc};
use log::debug;
use ndarray::{ArrayView3, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::detection::{Detection, DetectionConfig, Grid, detect};
use crate::error::{DatingError, Result};
use crate::tracker::matching::{AssignmentStrategy, MatchGraph, Prediction};
use crate::tracker::motion::{BlockMatching, MotionEstimator, MotionField};
use crate::tracker::store::TrackStore;
use crate::tracker::track::Track;
use crate::tracker::track_state::{Termination, TrackOrigin};

/// Configuration for the DatingTracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub detection: DetectionConfig,
    pub motion: BlockMatching,
    /// Gate between a predicted position and a cell centroid, in pixels
    pub max_match_distance: f64,
    /// Consecutive misses a track survives; one more terminates it
    pub max_missed_frames: u32,
    pub assignment: AssignmentStrategy,
    /// Tracks with fewer cells are left out of [`DatingTracker::finish`]
    pub min_track_length: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig::default(),
            motion: BlockMatching::default(),
            max_match_distance: 10.0,
            max_missed_frames: 0,
            assignment: AssignmentStrategy::Greedy,
            min_track_length: 1,
        }
    }
}

impl TrackerConfig {
    pub fn with_detection(mut self, detection: DetectionConfig) -> Self {
        self.detection = detection;
        self
    }

    pub fn with_motion(mut self, motion: BlockMatching) -> Self {
        self.motion = motion;
        self
    }

    pub fn with_max_match_distance(mut self, distance: f64) -> Self {
        self.max_match_distance = distance;
        self
    }

    pub fn with_max_missed_frames(mut self, frames: u32) -> Self {
        self.max_missed_frames = frames;
        self
    }

    pub fn with_assignment(mut self, assignment: AssignmentStrategy) -> Self {
        self.assignment = assignment;
        self
    }

    pub fn with_min_track_length(mut self, length: usize) -> Self {
        self.min_track_length = length;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.detection.validate()?;
        self.motion.validate()?;
        if !(self.max_match_distance.is_finite() && self.max_match_distance >= 0.0) {
            return Err(DatingError::InvalidConfig(format!(
                "max_match_distance must be finite and non-negative, got {}",
                self.max_match_distance
            )));
        }
        Ok(())
    }
}

/// Something that happened to a track while processing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackEvent {
    Born { track: u64, label: u32 },
    Split { parent: u64, track: u64, label: u32 },
    Continued { track: u64, label: u32 },
    Merged { track: u64, into: u64 },
    Missed { track: u64, misses: u32 },
    Terminated { track: u64 },
}

/// Result of processing one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutput {
    /// Position of the frame in the sequence
    pub index: usize,
    pub detection: Detection,
    /// Track of each cell, aligned with `detection.cells`; `None` while seeding
    pub track_ids: Vec<Option<u64>>,
    pub events: Vec<TrackEvent>,
}

/// Tracks and per-frame outputs of a whole sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct DatingResult {
    pub tracks: Vec<Track>,
    pub frames: Vec<FrameOutput>,
}

impl DatingResult {
    pub fn track(&self, id: u64) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Frames used only to seed motion estimation
    Seeding,
    Tracking,
}

/// Sequential cell tracker.
///
/// The first two frames seed the motion estimator and never produce tracks.
/// From the third frame on, every active track is advected by the motion
/// field of the two previous frames and matched against the new cells.
pub struct DatingTracker {
    config: TrackerConfig,
    estimator: Box<dyn MotionEstimator>,
    store: TrackStore,
    phase: Phase,
    previous: Option<Grid>,
    /// Motion between the last two frames, consumed by the next one
    motion: Option<MotionField>,
    frame_index: usize,
}

impl DatingTracker {
    /// Create a tracker using the block-matching estimator from `config`.
    ///
    /// # Returns
    /// The tracker, or `InvalidConfig` / `NonFiniteThreshold` when `config`
    /// fails validation.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        let estimator = Box::new(config.motion.clone());
        Ok(Self {
            config,
            estimator,
            store: TrackStore::new(),
            phase: Phase::Seeding,
            previous: None,
            motion: None,
            frame_index: 0,
        })
    }

    /// Replace the block-matching estimator.
    pub fn with_motion_estimator(mut self, estimator: impl MotionEstimator + 'static) -> Self {
        self.estimator = Box::new(estimator);
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    pub fn frames_processed(&self) -> usize {
        self.frame_index
    }

    pub fn is_seeding(&self) -> bool {
        self.phase == Phase::Seeding
    }

    /// Start a new sequence: drop all tracks and history, IDs restart at 1.
    pub fn reset(&mut self) {
        self.store.reset();
        self.phase = Phase::Seeding;
        self.previous = None;
        self.motion = None;
        self.frame_index = 0;
    }

    /// Detect the cells of `grid` and track them.
    ///
    /// # Arguments
    /// * `grid` - Next frame; must match the previous frame's shape and be
    ///   strictly later in time
    ///
    /// # Returns
    /// The frame's detection, track assignment and events. Errors carry the
    /// frame index and timestamp.
    pub fn update(&mut self, grid: &Grid) -> Result<FrameOutput> {
        let detection = detect(grid, &self.config.detection)
            .map_err(|e| e.at_frame(self.frame_index, grid.timestamp()))?;
        self.update_detected(grid, detection)
    }

    /// Track cells that were already detected on `grid`.
    ///
    /// # Arguments
    /// * `grid` - Frame the cells were detected on
    /// * `detection` - Cells of `grid`; every cell must carry the frame
    ///   timestamp and a label in `1..=cells.len()`
    ///
    /// # Returns
    /// Same as [`DatingTracker::update`]. Nothing is modified when an error
    /// is returned, so the frame may be retried.
    pub fn update_detected(&mut self, grid: &Grid, detection: Detection) -> Result<FrameOutput> {
        let index = self.frame_index;
        let timestamp = grid.timestamp();
        self.check_frame(grid, &detection)
            .map_err(|e| e.at_frame(index, timestamp))?;

        let (track_ids, events) = match self.phase {
            Phase::Seeding => (vec![None; detection.len()], Vec::new()),
            Phase::Tracking => {
                let pending = self.motion.take();
                let fallback = MotionField::zero(grid.dim());
                match self.associate(&detection, pending.as_ref().unwrap_or(&fallback)) {
                    Ok(out) => out,
                    Err(e) => {
                        self.motion = pending;
                        return Err(e.at_frame(index, timestamp));
                    }
                }
            }
        };

        if let Some(previous) = &self.previous {
            self.motion = Some(self.estimator.estimate(previous, grid));
            self.phase = Phase::Tracking;
        }
        self.previous = Some(grid.clone());
        self.frame_index += 1;

        Ok(FrameOutput {
            index,
            detection,
            track_ids,
            events,
        })
    }

    /// All tracks of the sequence with at least `min_track_length` cells.
    pub fn finish(self) -> Vec<Track> {
        let min_len = self.config.min_track_length;
        self.store
            .into_tracks()
            .into_iter()
            .filter(|t| t.len() >= min_len)
            .collect()
    }

    fn check_frame(&self, grid: &Grid, detection: &Detection) -> Result<()> {
        if detection.labels.dim() != grid.dim() {
            return Err(DatingError::ShapeMismatch {
                expected: grid.dim(),
                got: detection.labels.dim(),
            });
        }
        if detection.timestamp != grid.timestamp() {
            return Err(DatingError::InvalidConfig(format!(
                "detection at {} does not belong to frame at {}",
                detection.timestamp,
                grid.timestamp()
            )));
        }
        let n = detection.cells.len();
        for cell in &detection.cells {
            if cell.timestamp != detection.timestamp {
                return Err(DatingError::InvalidConfig(format!(
                    "cell {} observed at {} in detection at {}",
                    cell.label, cell.timestamp, detection.timestamp
                )));
            }
            if cell.label == 0 || cell.label as usize > n {
                return Err(DatingError::InvalidConfig(format!(
                    "cell label {} outside 1..={n}",
                    cell.label
                )));
            }
        }
        if let Some(previous) = &self.previous {
            if grid.dim() != previous.dim() {
                return Err(DatingError::ShapeMismatch {
                    expected: previous.dim(),
                    got: grid.dim(),
                });
            }
            if grid.timestamp() <= previous.timestamp() {
                return Err(DatingError::NonIncreasingTimestamp {
                    previous: previous.timestamp(),
                    timestamp: grid.timestamp(),
                });
            }
        }
        Ok(())
    }

    fn associate(
        &mut self,
        detection: &Detection,
        motion: &MotionField,
    ) -> Result<(Vec<Option<u64>>, Vec<TrackEvent>)> {
        let predictions: Vec<Prediction> = self
            .store
            .active_tracks()
            .map(|t| Prediction {
                track_id: t.id,
                history: t.len(),
                position: motion.advect(&t.last_cell().centroid, t.frames_since_seen()),
            })
            .collect();

        let centroids = detection.centroids();
        let graph = MatchGraph::new(&predictions, &centroids, self.config.max_match_distance);
        let association = graph.resolve(self.config.assignment);

        let cells = &detection.cells;
        let mut track_ids = vec![None; cells.len()];
        let mut events = Vec::new();

        for &(i, j) in &association.continued {
            let id = predictions[i].track_id;
            self.store.append(id, cells[j].clone())?;
            track_ids[j] = Some(id);
            events.push(TrackEvent::Continued {
                track: id,
                label: cells[j].label,
            });
        }

        for &(i, survivor) in &association.merged {
            let (id, into) = (predictions[i].track_id, predictions[survivor].track_id);
            self.store
                .mark_terminated(id, Termination::Merged { into }, detection.timestamp)?;
            events.push(TrackEvent::Merged { track: id, into });
        }

        for &(j, parent) in &association.births {
            let label = cells[j].label;
            let event = match parent.map(|i| predictions[i].track_id) {
                Some(parent) => {
                    let track = self.store.create(cells[j].clone(), TrackOrigin::Split { parent });
                    track_ids[j] = Some(track);
                    TrackEvent::Split {
                        parent,
                        track,
                        label,
                    }
                }
                None => {
                    let track = self.store.create(cells[j].clone(), TrackOrigin::Birth);
                    track_ids[j] = Some(track);
                    TrackEvent::Born { track, label }
                }
            };
            events.push(event);
        }

        for &i in &association.missed {
            let id = predictions[i].track_id;
            let misses = self.store.record_miss(id)?;
            events.push(TrackEvent::Missed { track: id, misses });
            if misses > self.config.max_missed_frames {
                self.store
                    .mark_terminated(id, Termination::Vanished, detection.timestamp)?;
                events.push(TrackEvent::Terminated { track: id });
            }
        }

        debug!(
            "frame {}: {} cells, {} continued, {} born, {} merged, {} missed, {} active",
            self.frame_index,
            cells.len(),
            association.continued.len(),
            association.births.len(),
            association.merged.len(),
            association.missed.len(),
            self.store.active_count()
        );

        Ok((track_ids, events))
    }
}

/// Detect and track cells over `frames` with the block-matching estimator
/// configured in `config`.
///
/// # Arguments
/// * `frames` - At least 3 grids of equal shape in strictly increasing time
/// * `config` - Detection, motion and association parameters
///
/// # Returns
/// Every track with at least `min_track_length` cells plus one
/// [`FrameOutput`] per frame. The first failing frame aborts the run.
pub fn dating(frames: &[Grid], config: &TrackerConfig) -> Result<DatingResult> {
    dating_with_estimator(frames, config, config.motion.clone())
}

/// Like [`dating`], with a custom motion estimator.
///
/// Single-frame detection runs in parallel ahead of the sequential tracking pass.
pub fn dating_with_estimator(
    frames: &[Grid],
    config: &TrackerConfig,
    estimator: impl MotionEstimator + 'static,
) -> Result<DatingResult> {
    if frames.len() < 3 {
        return Err(DatingError::InsufficientHistory(frames.len()));
    }
    let mut tracker = DatingTracker::new(config.clone())?.with_motion_estimator(estimator);

    let detections: Vec<Result<Detection>> = frames
        .par_iter()
        .enumerate()
        .map(|(i, grid)| {
            detect(grid, &config.detection).map_err(|e| e.at_frame(i, grid.timestamp()))
        })
        .collect();

    let mut outputs = Vec::with_capacity(frames.len());
    for (grid, detection) in frames.iter().zip(detections) {
        outputs.push(tracker.update_detected(grid, detection?)?);
    }

    Ok(DatingResult {
        tracks: tracker.finish(),
        frames: outputs,
    })
}

/// [`dating`] over a (time, row, col) array.
pub fn dating_video(
    video: ArrayView3<'_, f64>,
    timestamps: &[DateTime<Utc>],
    config: &TrackerConfig,
) -> Result<DatingResult> {
    let n = video.len_of(Axis(0));
    if n != timestamps.len() {
        return Err(DatingError::LengthMismatch {
            frames: n,
            timestamps: timestamps.len(),
        });
    }
    let frames = video
        .axis_iter(Axis(0))
        .zip(timestamps)
        .enumerate()
        .map(|(i, (field, &ts))| Grid::new(field.to_owned(), ts).map_err(|e| e.at_frame(i, ts)))
        .collect::<Result<Vec<_>>>()?;
    dating(&frames, config)
}
