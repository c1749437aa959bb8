//! Single-frame convective cell detection.
//!
//! A [`Grid`] is thresholded into a [`Mask`] by the segmenter, then the
//! extractor labels 8-connected regions and turns every region that passes the
//! size and peak filters into a [`Cell`]. Both steps are pure functions of
//! their inputs.

mod bbox;
mod cell;
mod components;
mod contour;
mod extractor;
mod grid;
mod segmenter;

pub use bbox::BoundingBox;
pub use cell::{Cell, IntensityStats};
pub use contour::trace_contour;
pub use extractor::{Detection, extract_cells};
pub use grid::Grid;
pub use segmenter::{Mask, ThresholdMode, segment};

use serde::{Deserialize, Serialize};

use crate::error::{DatingError, Result};

/// Parameters of single-frame detection.
///
/// Defaults are tuned to a 1 km reflectivity composite in dBZ; grids of other
/// resolutions or units must override them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub threshold: ThresholdMode,
    /// Minimum cell area in pixels
    pub min_size: usize,
    /// Cells whose maximum stays below this value are discarded
    pub min_peak_intensity: Option<f64>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: ThresholdMode::default(),
            min_size: 50,
            min_peak_intensity: Some(41.0),
        }
    }
}

impl DetectionConfig {
    pub fn with_threshold(mut self, threshold: ThresholdMode) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    pub fn with_min_peak_intensity(mut self, min_peak_intensity: Option<f64>) -> Self {
        self.min_peak_intensity = min_peak_intensity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.threshold.validate()?;
        if self.min_size == 0 {
            return Err(DatingError::InvalidConfig("min_size must be at least 1".into()));
        }
        if let Some(v) = self.min_peak_intensity {
            if !v.is_finite() {
                return Err(DatingError::NonFiniteThreshold(v));
            }
        }
        Ok(())
    }
}

/// Detect the cells of one frame.
pub fn detect(grid: &Grid, config: &DetectionConfig) -> Result<Detection> {
    config.validate()?;
    let mask = segment(grid, &config.threshold, config.min_size)?;
    extract_cells(&mask, grid, config.min_size, config.min_peak_intensity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;

    fn blobs(peaks: &[(f64, f64, f64)]) -> Grid {
        let data = Array2::from_shape_fn((40, 40), |(r, c)| {
            peaks
                .iter()
                .map(|&(pr, pc, h)| h - 3.0 * (r as f64 - pr).hypot(c as f64 - pc))
                .fold(0.0, f64::max)
        });
        Grid::new(data, Utc.with_ymd_and_hms(2016, 7, 11, 21, 0, 0).unwrap()).unwrap()
    }

    #[test]
    fn test_detect_fixed() {
        let grid = blobs(&[(10.0, 10.0, 50.0), (30.0, 28.0, 55.0)]);
        let config = DetectionConfig::default().with_min_size(5);
        let det = detect(&grid, &config).unwrap();

        assert_eq!(det.len(), 2);
        assert_eq!(det.cells[0].peak, (10, 10));
        assert_eq!(det.cells[1].peak, (30, 28));
        assert_eq!(det.labels[[10, 10]], 1);
        assert_eq!(det.labels[[30, 28]], 2);
    }

    #[test]
    fn test_threshold_monotonicity() {
        let grid = blobs(&[(8.0, 8.0, 44.0), (20.0, 30.0, 52.0), (32.0, 10.0, 60.0)]);
        let mut previous = usize::MAX;
        for threshold in [30.0, 35.0, 40.0, 45.0, 50.0, 55.0, 60.0, 65.0] {
            let config = DetectionConfig::default()
                .with_threshold(ThresholdMode::Fixed { threshold })
                .with_min_size(1)
                .with_min_peak_intensity(None);
            let n = detect(&grid, &config).unwrap().len();
            assert!(n <= previous, "{n} cells at {threshold} after {previous}");
            previous = n;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn test_size_filter() {
        let grid = blobs(&[(10.0, 10.0, 50.0), (30.0, 30.0, 42.0)]);
        for min_size in [1, 5, 20, 40] {
            let config = DetectionConfig::default().with_min_size(min_size);
            let det = detect(&grid, &config).unwrap();
            assert!(det.cells.iter().all(|c| c.area >= min_size));
        }
    }

    #[test]
    fn test_zero_min_size_rejected() {
        let grid = blobs(&[(10.0, 10.0, 50.0)]);
        let config = DetectionConfig::default().with_min_size(0);
        assert!(matches!(
            detect(&grid, &config),
            Err(DatingError::InvalidConfig(_))
        ));
    }
}
