use serde::{Deserialize, Serialize};

/// Axis-aligned pixel bounding box of a cell.
///
/// Bounds are inclusive grid indices:
/// - rows `top..=bottom`
/// - columns `left..=right`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    /// First row covered
    pub top: usize,
    /// First column covered
    pub left: usize,
    /// Last row covered
    pub bottom: usize,
    /// Last column covered
    pub right: usize,
}

impl BoundingBox {
    /// Box covering a single pixel.
    #[inline]
    pub fn from_pixel(row: usize, col: usize) -> Self {
        Self {
            top: row,
            left: col,
            bottom: row,
            right: col,
        }
    }

    /// Grow the box so it covers `(row, col)`.
    #[inline]
    pub fn include(&mut self, row: usize, col: usize) {
        self.top = self.top.min(row);
        self.bottom = self.bottom.max(row);
        self.left = self.left.min(col);
        self.right = self.right.max(col);
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.bottom - self.top + 1
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.right - self.left + 1
    }

    /// Number of pixels covered by the box (not by the cell).
    #[inline]
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    /// Center of the box as (row, col).
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        (
            (self.top + self.bottom) as f64 / 2.0,
            (self.left + self.right) as f64 / 2.0,
        )
    }

    #[inline]
    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.top..=self.bottom).contains(&row) && (self.left..=self.right).contains(&col)
    }
}
