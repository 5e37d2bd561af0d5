//! Bipartite matching between previous and current detections
//!
//! Rows of a cost matrix are previous-frame detections (or tracks), columns are
//! current-frame detections. The matcher pairs rows with columns one-to-one,
//! minimising total cost; surplus on the larger side stays unmatched, as does
//! any realised pair whose cost reaches the configured gate.
use crate::error::{Result, TrackingError};
use ndarray::ArrayView2;
use pathfinding::prelude::{kuhn_munkres_min, Matrix};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Costs are quantised to integers for the exact solver
const COST_SCALE: f64 = 1_000_000.0;

/// Costs are clamped to this magnitude before quantisation
const MAX_ABS_COST: f64 = 1_000.0;

/// Assignment algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStrategy {
    /// Exact minimum-cost assignment (Kuhn-Munkres)
    #[default]
    #[serde(alias = "optimal")]
    Hungarian,
    /// Repeatedly take the cheapest remaining pair
    Greedy,
}

impl fmt::Display for AssignmentStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hungarian => write!(f, "hungarian"),
            Self::Greedy => write!(f, "greedy"),
        }
    }
}

/// Result of a bipartite assignment
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentResult {
    /// Assignments as (prev_idx, cur_idx) pairs, ordered by cur_idx
    pub assignments: Vec<(usize, usize)>,
    /// Indices of unmatched previous detections
    pub unassigned_prev: Vec<usize>,
    /// Indices of unmatched current detections
    pub unassigned_cur: Vec<usize>,
    /// Sum of the realised pair costs
    pub total_cost: f32,
}

impl AssignmentResult {
    fn from_pairs(mut assignments: Vec<(usize, usize)>, cost: ArrayView2<f32>) -> Self {
        assignments.sort_unstable_by_key(|&(prev, cur)| (cur, prev));

        let mut used_prev = vec![false; cost.nrows()];
        let mut used_cur = vec![false; cost.ncols()];
        let mut total_cost = 0.0;
        for &(prev, cur) in &assignments {
            used_prev[prev] = true;
            used_cur[cur] = true;
            total_cost += cost[[prev, cur]];
        }

        Self {
            assignments,
            unassigned_prev: (0..cost.nrows()).filter(|&i| !used_prev[i]).collect(),
            unassigned_cur: (0..cost.ncols()).filter(|&j| !used_cur[j]).collect(),
            total_cost,
        }
    }

    /// For each current detection, the previous detection it matched
    pub fn to_column_matches(&self, num_cur: usize) -> Vec<Option<usize>> {
        let mut matches = vec![None; num_cur];
        for &(prev, cur) in &self.assignments {
            if cur < num_cur {
                matches[cur] = Some(prev);
            }
        }
        matches
    }
}

/// Solves the per-frame assignment problem
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BipartiteMatcher {
    strategy: AssignmentStrategy,
    max_cost: Option<f32>,
}

impl BipartiteMatcher {
    /// # Arguments
    /// * `strategy` - Exact or greedy assignment
    /// * `max_cost` - Pairs with cost `>=` this are never reported as matched
    pub fn new(strategy: AssignmentStrategy, max_cost: Option<f32>) -> Self {
        Self { strategy, max_cost }
    }

    pub fn strategy(&self) -> AssignmentStrategy {
        self.strategy
    }

    pub fn max_cost(&self) -> Option<f32> {
        self.max_cost
    }

    fn gated(&self, cost: f32) -> bool {
        self.max_cost.is_some_and(|max| cost >= max)
    }

    /// Solve the assignment over a `(n_prev, n_cur)` cost matrix
    pub fn solve(&self, cost: ArrayView2<f32>) -> Result<AssignmentResult> {
        if cost.nrows() == 0 || cost.ncols() == 0 {
            return Ok(AssignmentResult::from_pairs(Vec::new(), cost));
        }

        for ((row, col), &value) in cost.indexed_iter() {
            if !value.is_finite() {
                return Err(TrackingError::InvalidCost { row, col, value });
            }
        }

        let pairs = match self.strategy {
            AssignmentStrategy::Hungarian => self.solve_hungarian(cost),
            AssignmentStrategy::Greedy => self.solve_greedy(cost),
        };
        Ok(AssignmentResult::from_pairs(pairs, cost))
    }

    /// For each current detection, `Some(prev_idx)` or `None` for a new track
    pub fn match_columns(&self, cost: ArrayView2<f32>) -> Result<Vec<Option<usize>>> {
        Ok(self.solve(cost)?.to_column_matches(cost.ncols()))
    }

    /// Kuhn-Munkres on quantised costs; gated pairs are priced out, then dropped
    fn solve_hungarian(&self, cost: ArrayView2<f32>) -> Vec<(usize, usize)> {
        let (n_prev, n_cur) = cost.dim();
        // kuhn_munkres needs rows <= columns
        let transposed = n_prev > n_cur;
        let (rows, cols) = if transposed {
            (n_cur, n_prev)
        } else {
            (n_prev, n_cur)
        };

        let quantised = cost.mapv(|c| {
            ((c as f64).clamp(-MAX_ABS_COST, MAX_ABS_COST) * COST_SCALE).round() as i64
        });
        let max_abs = quantised.iter().map(|q| q.abs()).max().unwrap_or(0);
        // Dearer than any difference between two assignments of real pairs
        let penalty = (max_abs + 1).saturating_mul(2 * rows as i64 + 1);

        let mut weights = Matrix::new(rows, cols, 0i64);
        for ((i, j), &q) in quantised.indexed_iter() {
            let w = if self.gated(cost[[i, j]]) { penalty } else { q };
            if transposed {
                weights[(j, i)] = w;
            } else {
                weights[(i, j)] = w;
            }
        }

        let (_total, row_to_col) = kuhn_munkres_min(&weights);

        row_to_col
            .into_iter()
            .enumerate()
            .map(|(r, c)| if transposed { (c, r) } else { (r, c) })
            .filter(|&(prev, cur)| !self.gated(cost[[prev, cur]]))
            .collect()
    }

    /// Cheapest-first selection, ties broken by lowest column then row
    fn solve_greedy(&self, cost: ArrayView2<f32>) -> Vec<(usize, usize)> {
        let (n_prev, n_cur) = cost.dim();

        let mut candidates: Vec<(f32, usize, usize)> = cost
            .indexed_iter()
            .filter(|(_, &c)| !self.gated(c))
            .map(|((i, j), &c)| (c, j, i))
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut used_prev = vec![false; n_prev];
        let mut used_cur = vec![false; n_cur];
        let mut assignments = Vec::with_capacity(n_prev.min(n_cur));

        for (_cost, cur, prev) in candidates {
            if !used_prev[prev] && !used_cur[cur] {
                assignments.push((prev, cur));
                used_prev[prev] = true;
                used_cur[cur] = true;
            }
        }
        assignments
    }
}

impl Default for BipartiteMatcher {
    fn default() -> Self {
        Self::new(AssignmentStrategy::Hungarian, None)
    }
}
