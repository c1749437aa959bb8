//! Cell extraction from a segmented grid.

use chrono::{DateTime, Utc};
use nalgebra::Point2;
use ndarray::Array2;

use crate::detection::bbox::BoundingBox;
use crate::detection::cell::{Cell, IntensityStats};
use crate::detection::components::connected_components;
use crate::detection::contour::trace_contour;
use crate::detection::grid::Grid;
use crate::detection::segmenter::Mask;
use crate::error::{DatingError, Result};

/// Cells of one frame together with their label array.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub timestamp: DateTime<Utc>,
    /// Cells ordered by label
    pub cells: Vec<Cell>,
    /// 0 = background, k = pixel of `cells[k - 1]`
    pub labels: Array2<u32>,
}

impl Detection {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn centroids(&self) -> Vec<Point2<f64>> {
        self.cells.iter().map(|c| c.centroid).collect()
    }
}

/// Label the 8-connected regions of `mask` and describe those that qualify.
///
/// A region qualifies when it has at least `min_size` pixels and, if
/// `min_peak_intensity` is set, its maximum reaches that value. Regions that
/// do not qualify are dropped before labels are assigned. Masked pixels whose
/// grid value is not finite are ignored.
pub fn extract_cells(
    mask: &Mask,
    grid: &Grid,
    min_size: usize,
    min_peak_intensity: Option<f64>,
) -> Result<Detection> {
    if mask.dim() != grid.dim() {
        return Err(DatingError::ShapeMismatch {
            expected: grid.dim(),
            got: mask.dim(),
        });
    }

    let valid = Array2::from_shape_fn(grid.dim(), |(r, c)| {
        mask[[r, c]] && grid.value(r, c).is_some()
    });

    let mut labels = Array2::<u32>::zeros(grid.dim());
    let mut regions = Vec::new();
    for pixels in connected_components(&valid) {
        if pixels.len() < min_size.max(1) {
            continue;
        }
        let stats = summarize(&pixels, grid);
        if min_peak_intensity.is_some_and(|floor| stats.intensity.max < floor) {
            continue;
        }
        let label = regions.len() as u32 + 1;
        for &(r, c) in &pixels {
            labels[[r, c]] = label;
        }
        regions.push((label, pixels[0], stats));
    }

    let cells = regions
        .into_iter()
        .map(|(label, start, stats)| Cell {
            label,
            centroid: stats.centroid,
            contour: trace_contour(&labels, label, start),
            area: stats.area,
            intensity: stats.intensity,
            peak: stats.peak,
            bbox: stats.bbox,
            timestamp: grid.timestamp(),
        })
        .collect();

    Ok(Detection {
        timestamp: grid.timestamp(),
        cells,
        labels,
    })
}

struct RegionStats {
    area: usize,
    centroid: Point2<f64>,
    intensity: IntensityStats,
    peak: (usize, usize),
    bbox: BoundingBox,
}

fn summarize(pixels: &[(usize, usize)], grid: &Grid) -> RegionStats {
    let (r0, c0) = pixels[0];
    let mut bbox = BoundingBox::from_pixel(r0, c0);
    let (mut sum_r, mut sum_c, mut sum_v) = (0.0, 0.0, 0.0);
    let mut max = f64::NEG_INFINITY;
    let mut min = f64::INFINITY;
    let mut peak = (r0, c0);

    for &(r, c) in pixels {
        let v = grid.value(r, c).unwrap_or(f64::NAN);
        bbox.include(r, c);
        sum_r += r as f64;
        sum_c += c as f64;
        sum_v += v;
        if v > max || (v == max && (r, c) < peak) {
            max = v;
            peak = (r, c);
        }
        min = min.min(v);
    }

    let n = pixels.len() as f64;
    RegionStats {
        area: pixels.len(),
        centroid: Point2::new(sum_c / n, sum_r / n),
        intensity: IntensityStats {
            max,
            mean: sum_v / n,
            min,
        },
        peak,
        bbox,
    }
}
