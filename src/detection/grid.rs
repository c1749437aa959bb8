//! Timestamped 2-D intensity field.

use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayD, ArrayView2, Ix2};

use crate::error::{DatingError, Result};

/// A validated 2-D field of intensities observed at one instant.
///
/// Individual pixels may be NaN or infinite (no data); those are treated as
/// background by every algorithm in this crate.
#[derive(Debug, Clone)]
pub struct Grid {
    data: Array2<f64>,
    timestamp: DateTime<Utc>,
}

impl Grid {
    /// Create a grid, rejecting empty arrays and arrays without any finite value.
    pub fn new(data: Array2<f64>, timestamp: DateTime<Utc>) -> Result<Self> {
        let (rows, cols) = data.dim();
        if rows == 0 || cols == 0 {
            return Err(DatingError::EmptyGrid { rows, cols });
        }
        if !data.iter().any(|v| v.is_finite()) {
            return Err(DatingError::NoFiniteValues);
        }
        Ok(Self { data, timestamp })
    }

    /// Create a grid from an array of unknown rank.
    pub fn from_dyn(data: ArrayD<f64>, timestamp: DateTime<Utc>) -> Result<Self> {
        let rank = data.ndim();
        let data = data
            .into_dimensionality::<Ix2>()
            .map_err(|_| DatingError::InvalidRank(rank))?;
        Self::new(data, timestamp)
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Intensity at a pixel, `None` for no-data pixels.
    #[inline]
    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        let v = self.data[[row, col]];
        v.is_finite().then_some(v)
    }

    /// Largest finite value in the grid.
    pub fn finite_max(&self) -> f64 {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(f64::NEG_INFINITY, f64::max)
    }
}
