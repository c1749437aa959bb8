//! Frame-to-frame motion estimation.
//!
//! The tracker needs to know where a cell observed at frame t-1 should appear
//! at frame t. A [`MotionEstimator`] derives a [`MotionField`] from the fields
//! of two consecutive frames; the field is then used to advect track
//! positions one frame forward.

use log::debug;
use nalgebra::{Point2, Vector2};
use ndarray::{Array2, s};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::detection::Grid;
use crate::error::{DatingError, Result};

/// Block-wise displacement between two frames, in pixels per frame.
///
/// Vectors use the same convention as cell centroids: `x` is the column
/// shift, `y` the row shift.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionField {
    shape: (usize, usize),
    block_size: usize,
    vectors: Array2<Vector2<f64>>,
    degenerate: bool,
}

impl MotionField {
    /// Zero field used when no motion could be estimated.
    pub fn zero(shape: (usize, usize)) -> Self {
        Self {
            degenerate: true,
            ..Self::uniform(shape, Vector2::zeros())
        }
    }

    /// The same displacement everywhere.
    pub fn uniform(shape: (usize, usize), displacement: Vector2<f64>) -> Self {
        Self {
            shape,
            block_size: shape.0.max(shape.1).max(1),
            vectors: Array2::from_elem((1, 1), displacement),
            degenerate: false,
        }
    }

    /// `true` when the estimator found nothing to track and fell back to zero.
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Per-block vectors, indexed by (block row, block column).
    pub fn vectors(&self) -> &Array2<Vector2<f64>> {
        &self.vectors
    }

    /// Displacement of the block containing `point`; outside points use the
    /// nearest block.
    pub fn displacement_at(&self, point: &Point2<f64>) -> Vector2<f64> {
        let (nby, nbx) = self.vectors.dim();
        let block = |coord: f64, n: usize| {
            let idx = (coord.max(0.0).round() as usize) / self.block_size;
            idx.min(n - 1)
        };
        self.vectors[[block(point.y, nby), block(point.x, nbx)]]
    }

    /// Move `point` forward by `frames` frames.
    pub fn advect(&self, point: &Point2<f64>, frames: u32) -> Point2<f64> {
        point + self.displacement_at(point) * f64::from(frames)
    }

    pub fn mean_displacement(&self) -> Vector2<f64> {
        let n = self.vectors.len() as f64;
        self.vectors.iter().sum::<Vector2<f64>>() / n
    }
}

/// Source of motion fields for the tracker.
pub trait MotionEstimator: Send + Sync {
    /// Estimate the displacement from `previous` to `current`.
    ///
    /// Must not fail; degenerate input yields [`MotionField::zero`].
    fn estimate(&self, previous: &Grid, current: &Grid) -> MotionField;
}

/// Estimator that assumes cells do not move.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMotion;

impl MotionEstimator for NoMotion {
    fn estimate(&self, previous: &Grid, _current: &Grid) -> MotionField {
        MotionField::uniform(previous.dim(), Vector2::zeros())
    }
}

/// Block matching on intensity fields.
///
/// Both fields are clipped from below at `intensity_floor` (no-data pixels
/// become the floor). For every `block_size` tile holding at least
/// `min_valid_pixels` pixels above the floor in the previous field, the
/// integer shift within `max_displacement` that minimizes the mean absolute
/// difference is selected. Ties go to the smaller shift, then the smaller row
/// shift, then the smaller column shift. Tiles without enough signal take the
/// mean of the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMatching {
    pub block_size: usize,
    pub max_displacement: usize,
    pub min_valid_pixels: usize,
    pub intensity_floor: f64,
}

impl Default for BlockMatching {
    fn default() -> Self {
        Self {
            block_size: 32,
            max_displacement: 8,
            min_valid_pixels: 16,
            intensity_floor: 35.0,
        }
    }
}

impl BlockMatching {
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(DatingError::InvalidConfig("block_size must be positive".into()));
        }
        if self.min_valid_pixels == 0 {
            return Err(DatingError::InvalidConfig(
                "min_valid_pixels must be positive".into(),
            ));
        }
        if !self.intensity_floor.is_finite() {
            return Err(DatingError::NonFiniteThreshold(self.intensity_floor));
        }
        Ok(())
    }

    fn match_block(
        &self,
        previous: &Array2<f64>,
        current: &Array2<f64>,
        (by, bx): (usize, usize),
    ) -> Option<Vector2<f64>> {
        let (rows, cols) = previous.dim();
        let (r0, c0) = (by * self.block_size, bx * self.block_size);
        let (r1, c1) = ((r0 + self.block_size).min(rows), (c0 + self.block_size).min(cols));

        let block = previous.slice(s![r0..r1, c0..c1]);
        let signal = block.iter().filter(|&&v| v > self.intensity_floor).count();
        if signal < self.min_valid_pixels {
            return None;
        }

        let m = self.max_displacement as isize;
        let min_overlap = block.len().div_ceil(2);
        let mut best: Option<(f64, isize, isize, isize)> = None;

        for dr in -m..=m {
            for dc in -m..=m {
                let mut sum = 0.0;
                let mut n = 0usize;
                for r in r0..r1 {
                    let Some(rr) = r.checked_add_signed(dr).filter(|&rr| rr < rows) else {
                        continue;
                    };
                    for c in c0..c1 {
                        let Some(cc) = c.checked_add_signed(dc).filter(|&cc| cc < cols) else {
                            continue;
                        };
                        sum += (previous[[r, c]] - current[[rr, cc]]).abs();
                        n += 1;
                    }
                }
                if n < min_overlap {
                    continue;
                }
                let candidate = (sum / n as f64, dr * dr + dc * dc, dr, dc);
                let better = match best {
                    None => true,
                    Some(b) => candidate
                        .0
                        .total_cmp(&b.0)
                        .then(candidate.1.cmp(&b.1))
                        .then(candidate.2.cmp(&b.2))
                        .then(candidate.3.cmp(&b.3))
                        .is_lt(),
                };
                if better {
                    best = Some(candidate);
                }
            }
        }

        best.map(|(_, _, dr, dc)| Vector2::new(dc as f64, dr as f64))
    }
}

impl MotionEstimator for BlockMatching {
    fn estimate(&self, previous: &Grid, current: &Grid) -> MotionField {
        let shape = previous.dim();
        if current.dim() != shape || self.validate().is_err() {
            return MotionField::zero(shape);
        }

        let floor = self.intensity_floor;
        let clip = |v: f64| if v.is_finite() { v.max(floor) } else { floor };
        let prev = previous.data().mapv(clip);
        let next = current.data().mapv(clip);

        let nby = shape.0.div_ceil(self.block_size);
        let nbx = shape.1.div_ceil(self.block_size);
        let shifts: Vec<Option<Vector2<f64>>> = (0..nby * nbx)
            .into_par_iter()
            .map(|b| self.match_block(&prev, &next, (b / nbx, b % nbx)))
            .collect();

        let valid: Vec<_> = shifts.iter().flatten().copied().collect();
        if valid.is_empty() {
            debug!("no block with enough signal, falling back to zero motion");
            return MotionField::zero(shape);
        }
        let mean = valid.iter().sum::<Vector2<f64>>() / valid.len() as f64;
        debug!(
            "motion from {} of {} blocks, mean ({:.2}, {:.2}) px/frame",
            valid.len(),
            shifts.len(),
            mean.x,
            mean.y
        );

        MotionField {
            shape,
            block_size: self.block_size,
            vectors: Array2::from_shape_fn((nby, nbx), |(i, j)| shifts[i * nbx + j].unwrap_or(mean)),
            degenerate: false,
        }
    }
}
