//! Threshold segmentation of a grid into a foreground mask.

use log::trace;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::detection::components::{components_within, connected_components};
use crate::detection::grid::Grid;
use crate::error::{DatingError, Result};

/// Binary foreground mask, same shape as its grid.
pub type Mask = Array2<bool>;

/// Upper bound on the number of levels a dynamic threshold may test.
const MAX_LEVELS: f64 = 10_000.0;

/// Threshold policy of the segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ThresholdMode {
    /// Every finite value `>= threshold` is foreground.
    Fixed { threshold: f64 },
    /// Per-region threshold raised until neighbouring intense cores separate.
    Dynamic {
        /// Base threshold; nothing below it is ever foreground
        min_threshold: f64,
        /// Highest level a region's threshold is raised to
        max_threshold: f64,
        /// Increment between tested levels
        step: f64,
        /// Minimum prominence of a core's peak above the level that separates it
        min_difference: f64,
        /// Minimum distance in pixels between the peaks of separated cores
        min_peak_distance: f64,
    },
}

impl Default for ThresholdMode {
    fn default() -> Self {
        ThresholdMode::Fixed { threshold: 35.0 }
    }
}

impl ThresholdMode {
    /// Dynamic mode with the reflectivity defaults (35 to 48 dBZ in 1 dBZ steps).
    pub fn dynamic() -> Self {
        ThresholdMode::Dynamic {
            min_threshold: 35.0,
            max_threshold: 48.0,
            step: 1.0,
            min_difference: 6.0,
            min_peak_distance: 10.0,
        }
    }

    /// Lowest value that can ever be foreground.
    pub fn base_threshold(&self) -> f64 {
        match *self {
            ThresholdMode::Fixed { threshold } => threshold,
            ThresholdMode::Dynamic { min_threshold, .. } => min_threshold,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            ThresholdMode::Fixed { threshold } => finite(threshold).map(|_| ()),
            ThresholdMode::Dynamic {
                min_threshold,
                max_threshold,
                step,
                min_difference,
                min_peak_distance,
            } => {
                finite(min_threshold)?;
                finite(max_threshold)?;
                if max_threshold < min_threshold {
                    return Err(DatingError::InvalidConfig(format!(
                        "max_threshold {max_threshold} is below min_threshold {min_threshold}"
                    )));
                }
                if !(step.is_finite() && step > 0.0) {
                    return Err(DatingError::InvalidConfig(format!(
                        "threshold step must be positive, got {step}"
                    )));
                }
                if (max_threshold - min_threshold) / step > MAX_LEVELS {
                    return Err(DatingError::InvalidConfig(format!(
                        "threshold step {step} gives more than {MAX_LEVELS} levels"
                    )));
                }
                if !min_difference.is_finite() || !min_peak_distance.is_finite() {
                    return Err(DatingError::InvalidConfig(
                        "min_difference and min_peak_distance must be finite".into(),
                    ));
                }
                Ok(())
            }
        }
    }
}

fn finite(threshold: f64) -> Result<f64> {
    if threshold.is_finite() {
        Ok(threshold)
    } else {
        Err(DatingError::NonFiniteThreshold(threshold))
    }
}

/// Segment `grid` into a foreground mask.
///
/// `min_size` is only consulted by the dynamic mode, where regions smaller
/// than it never take part in splitting decisions.
pub fn segment(grid: &Grid, mode: &ThresholdMode, min_size: usize) -> Result<Mask> {
    mode.validate()?;
    let mask = threshold_mask(grid, mode.base_threshold());
    match *mode {
        ThresholdMode::Fixed { .. } => Ok(mask),
        ThresholdMode::Dynamic {
            min_threshold,
            max_threshold,
            step,
            min_difference,
            min_peak_distance,
        } => {
            let refiner = Refiner {
                grid,
                max_threshold,
                step,
                min_difference,
                min_peak_distance,
                min_size: min_size.max(1),
            };
            let mut out = Array2::from_elem(grid.dim(), false);
            for region in connected_components(&mask) {
                if region.len() >= refiner.min_size {
                    refiner.refine(region, min_threshold, &mut out);
                }
            }
            Ok(out)
        }
    }
}

fn threshold_mask(grid: &Grid, threshold: f64) -> Mask {
    grid.data().mapv(|v| v.is_finite() && v >= threshold)
}

struct Refiner<'a> {
    grid: &'a Grid,
    max_threshold: f64,
    step: f64,
    min_difference: f64,
    min_peak_distance: f64,
    min_size: usize,
}

impl Refiner<'_> {
    fn value(&self, (r, c): (usize, usize)) -> f64 {
        self.grid.value(r, c).unwrap_or(f64::NEG_INFINITY)
    }

    /// Highest pixel of a region, first in raster order on ties.
    fn peak(&self, region: &[(usize, usize)]) -> ((usize, usize), f64) {
        let mut best = (region[0], self.value(region[0]));
        for &px in &region[1..] {
            let v = self.value(px);
            if v > best.1 || (v == best.1 && px < best.0) {
                best = (px, v);
            }
        }
        best
    }

    fn separated(&self, peaks: &[(usize, usize)]) -> bool {
        peaks.iter().enumerate().all(|(i, a)| {
            peaks[i + 1..].iter().all(|b| {
                let dr = a.0 as f64 - b.0 as f64;
                let dc = a.1 as f64 - b.1 as f64;
                dr.hypot(dc) >= self.min_peak_distance
            })
        })
    }

    fn refine(&self, region: Vec<(usize, usize)>, level: f64, out: &mut Mask) {
        let steps = ((self.max_threshold - level) / self.step).floor().max(0.0) as usize;

        for k in 1..=steps {
            let next = level + k as f64 * self.step;
            let cores: Vec<_> = components_within(&region, |r, c| self.value((r, c)) >= next)
                .into_iter()
                .filter(|core| core.len() >= self.min_size)
                .map(|core| {
                    let peak = self.peak(&core);
                    (core, peak)
                })
                .filter(|(_, (_, peak_value))| peak_value - next >= self.min_difference)
                .collect();

            if cores.is_empty() {
                break;
            }
            if cores.len() >= 2 {
                let peaks: Vec<_> = cores.iter().map(|(_, (px, _))| *px).collect();
                if self.separated(&peaks) {
                    trace!(
                        "region of {} px splits into {} cores at level {next}",
                        region.len(),
                        cores.len()
                    );
                    for (core, _) in cores {
                        self.refine(core, next, out);
                    }
                    return;
                }
            }
        }

        for (r, c) in region {
            out[[r, c]] = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn grid(data: Array2<f64>) -> Grid {
        Grid::new(data, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()).unwrap()
    }

    /// Two cones of height `peak` joined by a plateau at `bridge`.
    fn twin_peaks(peak: f64, bridge: f64) -> Array2<f64> {
        Array2::from_shape_fn((15, 40), |(r, c)| {
            let d1 = (r as f64 - 7.0).hypot(c as f64 - 10.0);
            let d2 = (r as f64 - 7.0).hypot(c as f64 - 29.0);
            let cone = (peak - 2.0 * d1.min(d2)).max(0.0);
            let on_bridge = (6..=8).contains(&r) && (10..=29).contains(&c);
            if on_bridge { cone.max(bridge) } else { cone }
        })
    }

    #[test]
    fn test_fixed_threshold() {
        let g = grid(ndarray::array![[1.0, 5.0], [f64::NAN, 5.0]]);
        let mask = segment(&g, &ThresholdMode::Fixed { threshold: 5.0 }, 1).unwrap();
        assert_eq!(mask, ndarray::array![[false, true], [false, true]]);
    }

    #[test]
    fn test_non_finite_threshold() {
        let g = grid(Array2::zeros((3, 3)));
        let err = segment(&g, &ThresholdMode::Fixed { threshold: f64::NAN }, 1).unwrap_err();
        assert!(matches!(err, DatingError::NonFiniteThreshold(v) if v.is_nan()));
    }

    #[test]
    fn test_invalid_dynamic_step() {
        let mode = ThresholdMode::Dynamic {
            min_threshold: 10.0,
            max_threshold: 20.0,
            step: 0.0,
            min_difference: 1.0,
            min_peak_distance: 1.0,
        };
        assert!(matches!(
            mode.validate(),
            Err(DatingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_tiny_dynamic_step() {
        let mode = |step| ThresholdMode::Dynamic {
            min_threshold: 35.0,
            max_threshold: 48.0,
            step,
            min_difference: 6.0,
            min_peak_distance: 10.0,
        };
        assert!(matches!(
            mode(1e-12).validate(),
            Err(DatingError::InvalidConfig(_))
        ));
        assert!(mode(0.01).validate().is_ok());
    }

    #[test]
    fn test_dynamic_splits_bridged_cores() {
        let g = grid(twin_peaks(50.0, 36.0));
        let fixed = segment(&g, &ThresholdMode::Fixed { threshold: 35.0 }, 5).unwrap();
        assert_eq!(connected_components(&fixed).len(), 1);

        let dynamic = segment(&g, &ThresholdMode::dynamic(), 5).unwrap();
        assert_eq!(connected_components(&dynamic).len(), 2);
    }

    #[test]
    fn test_dynamic_keeps_close_peaks_together() {
        let g = grid(twin_peaks(50.0, 36.0));
        let mode = ThresholdMode::Dynamic {
            min_threshold: 35.0,
            max_threshold: 48.0,
            step: 1.0,
            min_difference: 6.0,
            min_peak_distance: 25.0,
        };
        let mask = segment(&g, &mode, 5).unwrap();
        assert_eq!(connected_components(&mask).len(), 1);
    }

    #[test]
    fn test_dynamic_is_deterministic() {
        let g = grid(twin_peaks(55.0, 40.0));
        let a = segment(&g, &ThresholdMode::dynamic(), 5).unwrap();
        let b = segment(&g, &ThresholdMode::dynamic(), 5).unwrap();
        assert_eq!(a, b);
    }
}
