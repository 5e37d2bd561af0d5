//! Frame-to-frame association engines
//!
//! This module provides two interchangeable ways of scoring the previous
//! frame's tracks against the current frame's detections:
//! - GeometricEngine: weighted box overlap, appearance and pose distances
//! - RecurrentEngine: learned per-track hidden states scored against encoded detections
//!
//! The variant is chosen once per sequence from the configuration.

use crate::detections::Frame;
use crate::error::Result;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

mod geometric;
mod recurrent;

pub use geometric::GeometricEngine;
pub use recurrent::{AssociationModel, HiddenStateTable, RecurrentEngine};

/// Which association engine a sequence runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationMode {
    #[default]
    Geometric,
    Recurrent,
}

impl fmt::Display for AssociationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Geometric => write!(f, "geometric"),
            Self::Recurrent => write!(f, "recurrent"),
        }
    }
}

/// Common interface for association engines
///
/// Per frame the sequence driver calls [`cost_matrix`](Self::cost_matrix)
/// (skipped for the first frame and whenever either side is empty), solves the
/// assignment, resolves track IDs and then calls
/// [`post_assignment`](Self::post_assignment) with the result.
pub trait AssociationEngine: Send {
    /// Dissimilarity between previous tracks (rows) and current detections (columns)
    ///
    /// # Arguments
    /// * `prev` - Frame the previous assignment belongs to
    /// * `prev_tracks` - Track IDs of `prev`, index aligned with its detections
    /// * `cur` - Frame being associated
    fn cost_matrix(&mut self, prev: &Frame, prev_tracks: &[u32], cur: &Frame)
        -> Result<Array2<f32>>;

    /// Costs at or above this value never produce a match
    fn max_match_cost(&self) -> Option<f32>;

    /// Hook run after `cur` received its track IDs
    ///
    /// `matches[j]` is the previous detection matched by current detection `j`
    /// (`None` for a new track) and `tracks[j]` its resolved ID.
    fn post_assignment(
        &mut self,
        cur: &Frame,
        matches: &[Option<usize>],
        tracks: &[u32],
    ) -> Result<()>;

    /// Engine name for logging
    fn name(&self) -> &str;
}
