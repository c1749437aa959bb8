//! Outer boundary tracing of labeled regions.

use ndarray::Array2;

use crate::detection::components::offset;

/// Moore neighbourhood in clockwise order, starting west.
const MOORE: [(isize, isize); 8] = [
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
];

fn direction(delta: (isize, isize)) -> usize {
    MOORE.iter().position(|&d| d == delta).unwrap_or(0)
}

/// Trace the outer boundary of the region carrying `label`.
///
/// `start` must be the region's first pixel in raster order. Returns the
/// boundary pixels as (row, col), clockwise, beginning at `start`.
pub fn trace_contour(
    labels: &Array2<u32>,
    label: u32,
    start: (usize, usize),
) -> Vec<(usize, usize)> {
    let dim = labels.dim();
    let mut contour = vec![start];
    let mut current = start;
    // The raster-first pixel always has a background (or out-of-grid) west neighbour.
    let mut backtrack = 0usize;
    let mut first_step: Option<(usize, usize)> = None;
    let max_steps = 4 * labels.len() + 8;

    for _ in 0..max_steps {
        let found = (1..=8).map(|k| (backtrack + k) % 8).find_map(|d| {
            offset(current, MOORE[d], dim)
                .filter(|&(r, c)| labels[[r, c]] == label)
                .map(|px| (px, d))
        });
        let Some((next, d)) = found else {
            // isolated pixel
            break;
        };

        if current == start {
            match first_step {
                None => first_step = Some(next),
                Some(step) if step == next => break,
                Some(_) => {}
            }
        }

        // The background neighbour examined just before `next`, seen from `next`.
        let (br, bc) = MOORE[(d + 7) % 8];
        let (nr, nc) = MOORE[d];
        backtrack = direction((br - nr, bc - nc));

        if next != start {
            contour.push(next);
        }
        current = next;
    }
    contour
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_single_pixel() {
        let labels = array![[0, 0, 0], [0, 1, 0], [0, 0, 0]];
        assert_eq!(trace_contour(&labels, 1, (1, 1)), vec![(1, 1)]);
    }

    #[test]
    fn test_square_boundary_clockwise() {
        let labels = array![
            [0, 0, 0, 0, 0],
            [0, 1, 1, 1, 0],
            [0, 1, 1, 1, 0],
            [0, 1, 1, 1, 0],
            [0, 0, 0, 0, 0],
        ];
        let contour = trace_contour(&labels, 1, (1, 1));
        assert_eq!(
            contour,
            vec![
                (1, 1),
                (1, 2),
                (1, 3),
                (2, 3),
                (3, 3),
                (3, 2),
                (3, 1),
                (2, 1),
            ]
        );
    }

    #[test]
    fn test_region_touching_grid_edge() {
        let labels = array![[2, 2], [2, 0]];
        let contour = trace_contour(&labels, 2, (0, 0));
        assert_eq!(contour, vec![(0, 0), (0, 1), (1, 0)]);
    }

    #[test]
    fn test_other_labels_are_background() {
        let labels = array![[1, 1, 2], [1, 1, 2]];
        let contour = trace_contour(&labels, 1, (0, 0));
        assert_eq!(contour, vec![(0, 0), (0, 1), (1, 1), (1, 0)]);
    }
}
