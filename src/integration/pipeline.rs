//! DatingPipeline for streaming frames through the tracker.

use log::debug;
use thiserror::Error;

use crate::error::{self, DatingError};
use crate::tracker::{DatingTracker, FrameOutput, Track, TrackerConfig};

use super::FrameSource;

/// Failure of either the frame source or the tracker.
#[derive(Error, Debug)]
pub enum PipelineError<E> {
    #[error("frame source failed: {0}")]
    Source(E),

    #[error(transparent)]
    Dating(#[from] DatingError),
}

/// Bundles a [`FrameSource`] with a [`DatingTracker`].
pub struct DatingPipeline<S: FrameSource> {
    source: S,
    tracker: DatingTracker,
}

impl<S: FrameSource> DatingPipeline<S> {
    /// Create a pipeline with a fresh tracker built from `config`.
    ///
    /// # Arguments
    /// * `source` - Provider of frames in time order
    /// * `config` - Tracker configuration, validated here
    ///
    /// # Returns
    /// The pipeline, or `InvalidConfig` when `config` is rejected.
    pub fn new(source: S, config: TrackerConfig) -> error::Result<Self> {
        Ok(Self {
            source,
            tracker: DatingTracker::new(config)?,
        })
    }

    /// Create a pipeline around an already configured tracker, e.g. one with a
    /// custom motion estimator.
    pub fn with_tracker(source: S, tracker: DatingTracker) -> Self {
        Self { source, tracker }
    }

    /// Pull one frame from the source and track it.
    ///
    /// The caller may stop between any two calls; the tracker stays valid.
    ///
    /// # Returns
    /// The frame's output, `Ok(None)` once the source is exhausted, or the
    /// source or tracker error. A failed frame leaves the tracker unchanged.
    pub fn process_next(&mut self) -> Result<Option<FrameOutput>, PipelineError<S::Error>> {
        let Some(grid) = self.source.next_frame().map_err(PipelineError::Source)? else {
            return Ok(None);
        };
        Ok(Some(self.tracker.update(&grid)?))
    }

    /// Drain the source and return the finished tracks.
    ///
    /// # Returns
    /// Tracks with at least `min_track_length` cells, or
    /// `InsufficientHistory` when the source held fewer than 3 frames.
    pub fn run(mut self) -> Result<Vec<Track>, PipelineError<S::Error>> {
        while self.process_next()?.is_some() {}
        let frames = self.tracker.frames_processed();
        if frames < 3 {
            return Err(DatingError::InsufficientHistory(frames).into());
        }
        debug!(
            "pipeline finished after {} frames, {} tracks",
            frames,
            self.tracker.store().len()
        );
        Ok(self.tracker.finish())
    }

    /// Get a reference to the frame source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Get a mutable reference to the frame source.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Get a reference to the underlying tracker.
    pub fn tracker(&self) -> &DatingTracker {
        &self.tracker
    }

    /// Get a mutable reference to the underlying tracker.
    pub fn tracker_mut(&mut self) -> &mut DatingTracker {
        &mut self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectionConfig, Grid};
    use crate::tracker::NoMotion;
    use chrono::{Duration, TimeZone, Utc};
    use ndarray::{Array2, s};

    fn frames(n: i64) -> Vec<Grid> {
        let start = Utc.with_ymd_and_hms(2016, 7, 11, 21, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let mut data = Array2::zeros((20, 20));
                data.slice_mut(s![6..10, 6..10]).fill(50.0);
                Grid::new(data, start + Duration::minutes(5 * i)).unwrap()
            })
            .collect()
    }

    fn tracker() -> DatingTracker {
        let config = TrackerConfig::default()
            .with_detection(DetectionConfig::default().with_min_size(4));
        DatingTracker::new(config).unwrap().with_motion_estimator(NoMotion)
    }

    #[test]
    fn test_pipeline_runs_to_end() {
        let pipeline = DatingPipeline::with_tracker(frames(5).into_iter(), tracker());
        let tracks = pipeline.run().unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].len(), 3);
    }

    #[test]
    fn test_pipeline_stops_early() {
        let mut pipeline = DatingPipeline::with_tracker(frames(5).into_iter(), tracker());
        for _ in 0..3 {
            assert!(pipeline.process_next().unwrap().is_some());
        }
        assert_eq!(pipeline.tracker().store().len(), 1);
        assert_eq!(pipeline.tracker().frames_processed(), 3);
    }

    #[test]
    fn test_pipeline_restart() {
        let mut pipeline = DatingPipeline::with_tracker(frames(3).into_iter(), tracker());
        while pipeline.process_next().unwrap().is_some() {}
        assert_eq!(pipeline.tracker().store().len(), 1);

        // Refill the source and start a new sequence on the same pipeline.
        *pipeline.source_mut() = frames(4).into_iter();
        pipeline.tracker_mut().reset();
        assert_eq!(pipeline.source().len(), 4);
        let tracks = pipeline.run().unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, 1);
        assert_eq!(tracks[0].len(), 2);
    }

    #[test]
    fn test_pipeline_short_source() {
        let pipeline = DatingPipeline::with_tracker(frames(2).into_iter(), tracker());
        assert!(matches!(
            pipeline.run(),
            Err(PipelineError::Dating(DatingError::InsufficientHistory(2)))
        ));
    }

    struct Broken;

    impl FrameSource for Broken {
        type Error = &'static str;

        fn next_frame(&mut self) -> Result<Option<Grid>, Self::Error> {
            Err("disk on fire")
        }
    }

    #[test]
    fn test_source_error() {
        let mut pipeline = DatingPipeline::with_tracker(Broken, tracker());
        assert!(matches!(
            pipeline.process_next(),
            Err(PipelineError::Source("disk on fire"))
        ));
    }
}
