//! Association of predicted track positions with newly detected cells.
//!
//! Each frame builds one [`MatchGraph`] (predictions x cells, edges within the
//! gate) and resolves it into an [`Association`]. All tie-break rules live
//! here.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;

use log::trace;
use nalgebra::Point2;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Cost given to pairs outside the gate when solving the optimal assignment.
const GATE_PENALTY: f64 = 1e6;

/// Predicted position of one active track for the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub track_id: u64,
    /// Number of cells the track has accumulated so far
    pub history: usize,
    pub position: Point2<f64>,
}

/// How the one-to-one core of the association is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AssignmentStrategy {
    /// Closest pairs first; ties by lower track ID, then lower cell index
    #[default]
    Greedy,
    /// Minimum total distance (Jonker-Volgenant), then greedy for leftovers
    Optimal,
}

/// Outcome of resolving one frame's match graph.
///
/// Track indices refer to the prediction slice, cell indices to the cell slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Association {
    /// (track, cell) pairs; the track continues with the cell
    pub continued: Vec<(usize, usize)>,
    /// (absorbed track, surviving track)
    pub merged: Vec<(usize, usize)>,
    /// (cell, split parent) for cells that start a new track
    pub births: Vec<(usize, Option<usize>)>,
    /// Tracks without any cell inside their gate
    pub missed: Vec<usize>,
}

/// Euclidean distances between predicted positions and cell centroids.
pub fn distance_matrix(positions: &[Point2<f64>], centroids: &[Point2<f64>]) -> Array2<f64> {
    let mut dists = Array2::zeros((positions.len(), centroids.len()));
    for (i, p) in positions.iter().enumerate() {
        for (j, c) in centroids.iter().enumerate() {
            dists[[i, j]] = nalgebra::distance(p, c);
        }
    }
    dists
}

#[derive(Debug, Clone)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

/// Minimum-cost one-to-one assignment keeping only pairs with cost `<= thresh`.
pub fn linear_assignment(cost_matrix: &Array2<f64>, thresh: f64) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 || num_cols == 0 {
        return AssignmentResult {
            matches: vec![],
            unmatched_tracks: (0..num_rows).collect(),
            unmatched_detections: (0..num_cols).collect(),
        };
    }

    let gated = |i: usize, j: usize| cost_matrix[[i, j]] <= thresh;

    let row_to_col: Vec<usize> = if num_rows == 1 && num_cols == 1 {
        vec![0]
    } else {
        let size = num_rows.max(num_cols);
        let mut padded = Array2::<f64>::from_elem((size, size), GATE_PENALTY);
        for i in 0..num_rows {
            for j in 0..num_cols {
                if gated(i, j) {
                    padded[[i, j]] = cost_matrix[[i, j]];
                }
            }
        }
        match lapjv::lapjv(&padded) {
            Ok((row_to_col, _)) => row_to_col,
            Err(e) => {
                trace!("lapjv failed ({e:?}), leaving every pair unmatched");
                vec![usize::MAX; size]
            }
        }
    };

    let mut matches = vec![];
    let mut unmatched_tracks = vec![];
    let mut unmatched_detections_mask = vec![true; num_cols];

    for (row_idx, &col_idx) in row_to_col.iter().enumerate().take(num_rows) {
        if col_idx < num_cols && gated(row_idx, col_idx) {
            matches.push((row_idx, col_idx));
            unmatched_detections_mask[col_idx] = false;
        } else {
            unmatched_tracks.push(row_idx);
        }
    }

    let unmatched_detections = unmatched_detections_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &u)| u.then_some(i))
        .collect();

    AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_detections,
    }
}

/// Bipartite graph between predictions and cells of one frame.
#[derive(Debug, Clone)]
pub struct MatchGraph<'a> {
    predictions: &'a [Prediction],
    distances: Array2<f64>,
    gate: f64,
}

impl<'a> MatchGraph<'a> {
    pub fn new(predictions: &'a [Prediction], centroids: &[Point2<f64>], gate: f64) -> Self {
        let positions: Vec<_> = predictions.iter().map(|p| p.position).collect();
        Self {
            predictions,
            distances: distance_matrix(&positions, centroids),
            gate,
        }
    }

    pub fn num_tracks(&self) -> usize {
        self.distances.nrows()
    }

    pub fn num_cells(&self) -> usize {
        self.distances.ncols()
    }

    pub fn distance(&self, track: usize, cell: usize) -> f64 {
        self.distances[[track, cell]]
    }

    pub fn is_edge(&self, track: usize, cell: usize) -> bool {
        self.distance(track, cell) <= self.gate
    }

    /// Order of preference between two edges: distance, track ID, cell index.
    fn edge_order(&self, a: (usize, usize), b: (usize, usize)) -> Ordering {
        self.distance(a.0, a.1)
            .total_cmp(&self.distance(b.0, b.1))
            .then(self.predictions[a.0].track_id.cmp(&self.predictions[b.0].track_id))
            .then(a.1.cmp(&b.1))
    }

    /// Closest gated cell of `track` not held by any track.
    fn nearest_free(&self, track: usize, track_of: &[Option<usize>]) -> Option<usize> {
        (0..self.num_cells())
            .filter(|&j| track_of[j].is_none() && self.is_edge(track, j))
            .min_by(|&a, &b| self.edge_order((track, a), (track, b)))
    }

    /// All edges, most preferred first.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        let mut edges: Vec<_> = (0..self.num_tracks())
            .flat_map(|i| (0..self.num_cells()).map(move |j| (i, j)))
            .filter(|&(i, j)| self.is_edge(i, j))
            .collect();
        edges.sort_by(|&a, &b| self.edge_order(a, b));
        edges
    }

    /// Resolve the graph into continuations, merges, births and misses.
    pub fn resolve(&self, strategy: AssignmentStrategy) -> Association {
        let n_tracks = self.num_tracks();
        let n_cells = self.num_cells();
        let mut cell_of = vec![None; n_tracks];
        let mut track_of = vec![None; n_cells];
        let edges = self.edges();

        if strategy == AssignmentStrategy::Optimal {
            let result = linear_assignment(&self.distances, self.gate);
            for (i, j) in result.matches {
                cell_of[i] = Some(j);
                track_of[j] = Some(i);
            }
        }
        // Greedy pass; after an optimal core it only fills leftover gated pairs.
        for &(i, j) in &edges {
            if cell_of[i].is_none() && track_of[j].is_none() {
                cell_of[i] = Some(j);
                track_of[j] = Some(i);
            }
        }

        // Merges: an unmatched track claims its nearest gated cell, which is
        // necessarily held by another track at this point.
        let mut claims: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in (0..n_tracks).filter(|&i| cell_of[i].is_none()) {
            let nearest = (0..n_cells)
                .filter(|&j| self.is_edge(i, j))
                .min_by(|&a, &b| self.distance(i, a).total_cmp(&self.distance(i, b)));
            if let Some(j) = nearest {
                claims.entry(j).or_default().push(i);
            }
        }

        let mut merged = Vec::new();
        for (j, claimants) in claims {
            let Some(holder) = track_of[j] else {
                continue;
            };
            let survivor = std::iter::once(holder)
                .chain(claimants.iter().copied())
                .min_by_key(|&i| {
                    let p = &self.predictions[i];
                    (Reverse(p.history), p.track_id)
                })
                .unwrap_or(holder);
            if survivor != holder {
                cell_of[holder] = None;
                cell_of[survivor] = Some(j);
                track_of[j] = Some(survivor);
                // A displaced holder keeps its identity if a free cell is in its gate.
                if let Some(free) = self.nearest_free(holder, &track_of) {
                    trace!(
                        "track {} yields cell {j} and moves to cell {free}",
                        self.predictions[holder].track_id
                    );
                    cell_of[holder] = Some(free);
                    track_of[free] = Some(holder);
                }
            }
            for i in std::iter::once(holder).chain(claimants) {
                if i != survivor && cell_of[i].is_none() {
                    trace!(
                        "track {} merges into {}",
                        self.predictions[i].track_id, self.predictions[survivor].track_id
                    );
                    merged.push((i, survivor));
                }
            }
        }
        merged.sort_unstable();

        // Splits: a leftover cell inside the gate of a continuing track.
        let births = (0..n_cells)
            .filter(|&j| track_of[j].is_none())
            .map(|j| {
                let parent = (0..n_tracks)
                    .filter(|&i| cell_of[i].is_some() && self.is_edge(i, j))
                    .min_by(|&a, &b| self.edge_order((a, j), (b, j)));
                (j, parent)
            })
            .collect();

        let absorbed: Vec<usize> = merged.iter().map(|&(i, _)| i).collect();
        let missed = (0..n_tracks)
            .filter(|&i| cell_of[i].is_none() && !absorbed.contains(&i))
            .collect();

        let continued = cell_of
            .iter()
            .enumerate()
            .filter_map(|(i, j)| j.map(|j| (i, j)))
            .collect();

        Association {
            continued,
            merged,
            births,
            missed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(track_id: u64, history: usize, x: f64, y: f64) -> Prediction {
        Prediction {
            track_id,
            history,
            position: Point2::new(x, y),
        }
    }

    fn points(coords: &[(f64, f64)]) -> Vec<Point2<f64>> {
        coords.iter().map(|&(x, y)| Point2::new(x, y)).collect()
    }

    #[test]
    fn test_distance_matrix() {
        let d = distance_matrix(&points(&[(0.0, 0.0)]), &points(&[(3.0, 4.0), (0.0, 1.0)]));
        assert_eq!(d.dim(), (1, 2));
        assert_eq!(d[[0, 0]], 5.0);
        assert_eq!(d[[0, 1]], 1.0);
    }

    #[test]
    fn test_one_to_one() {
        let preds = [prediction(1, 3, 0.0, 0.0), prediction(2, 3, 20.0, 0.0)];
        let cells = points(&[(21.0, 0.0), (1.0, 1.0)]);
        let assoc = MatchGraph::new(&preds, &cells, 5.0).resolve(AssignmentStrategy::Greedy);

        assert_eq!(assoc.continued, vec![(0, 1), (1, 0)]);
        assert!(assoc.births.is_empty());
        assert!(assoc.merged.is_empty());
        assert!(assoc.missed.is_empty());
    }

    #[test]
    fn test_outside_gate() {
        let preds = [prediction(1, 3, 0.0, 0.0)];
        let cells = points(&[(30.0, 0.0)]);
        let assoc = MatchGraph::new(&preds, &cells, 5.0).resolve(AssignmentStrategy::Greedy);

        assert!(assoc.continued.is_empty());
        assert_eq!(assoc.births, vec![(0, None)]);
        assert_eq!(assoc.missed, vec![0]);
    }

    #[test]
    fn test_merge_keeps_longer_history() {
        // Track 2 is closer but younger; track 1 survives.
        let preds = [prediction(1, 5, 0.0, 0.0), prediction(2, 2, 3.0, 0.0)];
        let cells = points(&[(2.5, 0.0)]);
        let assoc = MatchGraph::new(&preds, &cells, 5.0).resolve(AssignmentStrategy::Greedy);

        assert_eq!(assoc.continued, vec![(0, 0)]);
        assert_eq!(assoc.merged, vec![(1, 0)]);
        assert!(assoc.missed.is_empty());
        assert!(assoc.births.is_empty());
    }

    #[test]
    fn test_merge_tie_goes_to_lower_id() {
        let preds = [prediction(7, 4, 0.0, 0.0), prediction(3, 4, 2.0, 0.0)];
        let cells = points(&[(0.5, 0.0)]);
        let assoc = MatchGraph::new(&preds, &cells, 5.0).resolve(AssignmentStrategy::Greedy);

        assert_eq!(assoc.continued, vec![(1, 0)]);
        assert_eq!(assoc.merged, vec![(0, 1)]);
    }

    #[test]
    fn test_displaced_holder_takes_free_cell() {
        // Track 2 wins cell 0 on history; track 1 still has cell 1 in its gate.
        let preds = [prediction(1, 1, 0.0, 0.0), prediction(2, 3, 6.0, 0.0)];
        let cells = points(&[(2.0, 0.0), (-3.0, 0.0)]);
        let assoc = MatchGraph::new(&preds, &cells, 5.0).resolve(AssignmentStrategy::Greedy);

        assert_eq!(assoc.continued, vec![(0, 1), (1, 0)]);
        assert!(assoc.merged.is_empty());
        assert!(assoc.births.is_empty());
        assert!(assoc.missed.is_empty());
    }

    #[test]
    fn test_split_closer_fragment_continues() {
        let preds = [prediction(4, 3, 10.0, 10.0)];
        let cells = points(&[(13.0, 10.0), (11.0, 10.0)]);
        let assoc = MatchGraph::new(&preds, &cells, 5.0).resolve(AssignmentStrategy::Greedy);

        assert_eq!(assoc.continued, vec![(0, 1)]);
        assert_eq!(assoc.births, vec![(0, Some(0))]);
    }

    #[test]
    fn test_equal_distance_prefers_lower_track_id() {
        let preds = [prediction(9, 1, 0.0, 0.0), prediction(2, 1, 4.0, 0.0)];
        let cells = points(&[(2.0, 0.0), (2.0, 40.0)]);
        let graph = MatchGraph::new(&preds, &cells, 5.0);
        assert_eq!(graph.edges(), vec![(1, 0), (0, 0)]);

        let assoc = graph.resolve(AssignmentStrategy::Greedy);
        assert_eq!(assoc.continued, vec![(1, 0)]);
        assert_eq!(assoc.merged, vec![(0, 1)]);
        assert_eq!(assoc.births, vec![(1, None)]);
    }

    #[test]
    fn test_optimal_avoids_merge() {
        // Greedy gives cell 0 to track 1 first, leaving track 2 nothing but a
        // merge; the optimal core sends track 1 to cell 1 instead.
        let preds = [prediction(1, 2, 0.0, 0.0), prediction(2, 2, 2.5, 0.0)];
        let cells = points(&[(1.0, 0.0), (-2.0, 0.0)]);
        let graph = MatchGraph::new(&preds, &cells, 3.0);

        let greedy = graph.resolve(AssignmentStrategy::Greedy);
        assert_eq!(greedy.continued, vec![(0, 0)]);
        assert_eq!(greedy.merged, vec![(1, 0)]);
        assert_eq!(greedy.births, vec![(1, Some(0))]);

        let optimal = graph.resolve(AssignmentStrategy::Optimal);
        assert_eq!(optimal.continued, vec![(0, 1), (1, 0)]);
        assert!(optimal.merged.is_empty());
        assert!(optimal.births.is_empty());
    }

    #[test]
    fn test_empty_frame() {
        let preds = [prediction(1, 1, 0.0, 0.0)];
        let assoc = MatchGraph::new(&preds, &[], 5.0).resolve(AssignmentStrategy::Optimal);
        assert_eq!(assoc.missed, vec![0]);

        let assoc = MatchGraph::new(&[], &points(&[(1.0, 1.0)]), 5.0)
            .resolve(AssignmentStrategy::Greedy);
        assert_eq!(assoc.births, vec![(0, None)]);
    }
}
