//! Detected convective cell.

use chrono::{DateTime, Utc};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::detection::bbox::BoundingBox;

/// Intensity summary over the pixels of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityStats {
    pub max: f64,
    pub mean: f64,
    pub min: f64,
}

/// One size-filtered connected region of one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Label of the cell in its frame's label array (1-based, not a track ID)
    pub label: u32,
    /// Geometric centroid, `x` = column, `y` = row
    pub centroid: Point2<f64>,
    /// Outer boundary pixels as (row, col), clockwise from the top-left pixel
    pub contour: Vec<(usize, usize)>,
    /// Pixel count
    pub area: usize,
    pub intensity: IntensityStats,
    /// Location of the maximum as (row, col); first in raster order on ties
    pub peak: (usize, usize),
    pub bbox: BoundingBox,
    pub timestamp: DateTime<Utc>,
}

impl Cell {
    /// Centroid as (row, col).
    pub fn centroid_rc(&self) -> (f64, f64) {
        (self.centroid.y, self.centroid.x)
    }
}
