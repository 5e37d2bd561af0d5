//! Association from box overlap, appearance and pose distances

use crate::association::AssociationEngine;
use crate::cost::CostMatrixBuilder;
use crate::detections::Frame;
use crate::error::Result;
use ndarray::Array2;

/// Stateless engine: frame k depends only on frame k-1 and its track IDs
#[derive(Debug, Clone)]
pub struct GeometricEngine {
    builder: CostMatrixBuilder,
    max_cost_fraction: Option<f32>,
}

impl GeometricEngine {
    /// # Arguments
    /// * `builder` - Weighted cost matrix builder
    /// * `max_cost_fraction` - Gate as a fraction of the builder's largest possible cost
    pub fn new(builder: CostMatrixBuilder, max_cost_fraction: Option<f32>) -> Self {
        Self {
            builder,
            max_cost_fraction,
        }
    }

    pub fn builder(&self) -> &CostMatrixBuilder {
        &self.builder
    }
}

impl AssociationEngine for GeometricEngine {
    fn cost_matrix(
        &mut self,
        prev: &Frame,
        _prev_tracks: &[u32],
        cur: &Frame,
    ) -> Result<Array2<f32>> {
        self.builder.build(prev, cur)
    }

    fn max_match_cost(&self) -> Option<f32> {
        self.max_cost_fraction
            .map(|fraction| fraction * self.builder.max_cost())
    }

    fn post_assignment(
        &mut self,
        _cur: &Frame,
        _matches: &[Option<usize>],
        _tracks: &[u32],
    ) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "geometric"
    }
}
