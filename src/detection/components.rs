//! 8-connected component labeling.

use std::collections::VecDeque;

use ndarray::Array2;

use crate::detection::bbox::BoundingBox;

/// Row/column offsets of the 8-neighbourhood.
pub(crate) const NEIGHBORS_8: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

#[inline]
pub(crate) fn offset(
    (row, col): (usize, usize),
    (dr, dc): (isize, isize),
    (rows, cols): (usize, usize),
) -> Option<(usize, usize)> {
    let r = row.checked_add_signed(dr)?;
    let c = col.checked_add_signed(dc)?;
    (r < rows && c < cols).then_some((r, c))
}

/// Connected foreground regions of `mask`.
///
/// Regions are returned in raster order of their first pixel, and each region
/// starts with that pixel.
pub(crate) fn connected_components(mask: &Array2<bool>) -> Vec<Vec<(usize, usize)>> {
    let dim = mask.dim();
    let mut visited = Array2::from_elem(dim, false);
    let mut regions = Vec::new();
    let mut queue = VecDeque::new();

    for ((row, col), &fg) in mask.indexed_iter() {
        if !fg || visited[[row, col]] {
            continue;
        }
        visited[[row, col]] = true;
        queue.push_back((row, col));
        let mut pixels = Vec::new();

        while let Some(px) = queue.pop_front() {
            pixels.push(px);
            for delta in NEIGHBORS_8 {
                if let Some((r, c)) = offset(px, delta, dim) {
                    if mask[[r, c]] && !visited[[r, c]] {
                        visited[[r, c]] = true;
                        queue.push_back((r, c));
                    }
                }
            }
        }
        regions.push(pixels);
    }
    regions
}

/// Connected components of the subset of `pixels` accepted by `keep`.
///
/// Works on a local window spanning the bounding box of `pixels`.
pub(crate) fn components_within(
    pixels: &[(usize, usize)],
    keep: impl Fn(usize, usize) -> bool,
) -> Vec<Vec<(usize, usize)>> {
    let Some(&(r0, c0)) = pixels.first() else {
        return Vec::new();
    };
    let mut bbox = BoundingBox::from_pixel(r0, c0);
    for &(r, c) in pixels {
        bbox.include(r, c);
    }

    let mut local = Array2::from_elem((bbox.height(), bbox.width()), false);
    for &(r, c) in pixels {
        if keep(r, c) {
            local[[r - bbox.top, c - bbox.left]] = true;
        }
    }

    connected_components(&local)
        .into_iter()
        .map(|region| {
            region
                .into_iter()
                .map(|(r, c)| (r + bbox.top, c + bbox.left))
                .collect()
        })
        .collect()
}
