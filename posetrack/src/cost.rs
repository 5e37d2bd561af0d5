//! Weighted multi-metric cost matrices between adjacent frames
//!
//! Each enabled metric yields a `(n_prev, n_cur)` dissimilarity matrix in its
//! own natural range; the builder scales each by its weight and sums them.
//! Metrics with weight exactly zero are never evaluated.

use crate::bbox::{ious, Bbox};
use crate::detections::Frame;
use crate::error::{Result, TrackingError};
use crate::pose::{PckDistance, Skeleton};
use ndarray::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Dissimilarity signals available to the builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CostMetric {
    /// `1 - IoU` of the two boxes
    BboxOverlap,
    /// Cosine distance between appearance embeddings of the box crops
    AppearanceCosine,
    /// PCK-style keypoint distance
    PoseDistance,
}

impl CostMetric {
    pub fn id(&self) -> &'static str {
        match self {
            Self::BboxOverlap => "bbox-overlap",
            Self::AppearanceCosine => "cnn-cosdist",
            Self::PoseDistance => "pose-pck",
        }
    }

    /// Largest value the metric can produce
    pub fn max_value(&self) -> f32 {
        match self {
            Self::BboxOverlap | Self::PoseDistance => 1.0,
            Self::AppearanceCosine => 2.0,
        }
    }
}

impl FromStr for CostMetric {
    type Err = TrackingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bbox-overlap" => Ok(Self::BboxOverlap),
            "cnn-cosdist" | "appearance-cosine" => Ok(Self::AppearanceCosine),
            "pose-pck" | "pose-distance" => Ok(Self::PoseDistance),
            other => Err(TrackingError::UnsupportedMetric(other.to_string())),
        }
    }
}

impl fmt::Display for CostMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Appearance feature extractor for the image region under a box
///
/// Typically backed by a CNN; calls may be expensive and are only made when
/// the appearance metric has a nonzero weight.
pub trait AppearanceEmbedder: Send + Sync {
    fn embed(&self, image: &Path, bbox: &Bbox<f32>) -> Result<Array1<f32>>;
}

/// Fill a `(rows, cols)` matrix in parallel, one row per task
pub fn pairwise<F>(rows: usize, cols: usize, f: F) -> Array2<f32>
where
    F: Fn(usize, usize) -> f32 + Sync,
{
    let mut out = Array2::zeros((rows, cols));
    if rows == 0 || cols == 0 {
        return out;
    }

    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            for (j, value) in row.iter_mut().enumerate() {
                *value = f(i, j);
            }
        });
    out
}

/// `1 - cos(a, b)` in `[0, 2]`; embeddings with zero norm are maximally unrelated
///
/// Both embeddings must have the same length.
pub fn cosine_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 1.0;
    }
    (1.0 - a.dot(&b) / (norm_a * norm_b)).clamp(0.0, 2.0)
}

/// Computes the weighted cost matrix between two frames
#[derive(Clone)]
pub struct CostMatrixBuilder {
    terms: Vec<(CostMetric, f32)>,
    pck: Option<PckDistance>,
    embedder: Option<Arc<dyn AppearanceEmbedder>>,
}

impl fmt::Debug for CostMatrixBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CostMatrixBuilder")
            .field("terms", &self.terms)
            .field("pck", &self.pck)
            .field("embedder", &self.embedder.is_some())
            .finish()
    }
}

impl CostMatrixBuilder {
    /// # Arguments
    /// * `metrics` - Metric identifiers, e.g. `["bbox-overlap", "pose-pck"]`
    /// * `weights` - One non-negative weight per metric
    /// * `skeleton` - Keypoint layout, needed when the pose metric is weighted
    /// * `pck_threshold` - Normalised distance under which a keypoint is correct
    /// * `embedder` - Appearance model, needed when the appearance metric is weighted
    pub fn new<S: AsRef<str>>(
        metrics: &[S],
        weights: &[f32],
        skeleton: &Skeleton,
        pck_threshold: f32,
        embedder: Option<Arc<dyn AppearanceEmbedder>>,
    ) -> Result<Self> {
        if metrics.len() != weights.len() {
            return Err(TrackingError::config(format!(
                "{} cost metrics but {} weights",
                metrics.len(),
                weights.len()
            )));
        }

        let mut terms = Vec::with_capacity(metrics.len());
        for (metric, &weight) in metrics.iter().zip(weights) {
            let metric: CostMetric = metric.as_ref().parse()?;
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(TrackingError::config(format!(
                    "weight for {} must be finite and non-negative, got {}",
                    metric, weight
                )));
            }
            if weight != 0.0 {
                terms.push((metric, weight));
            }
        }

        let uses = |m: CostMetric| terms.iter().any(|(t, _)| *t == m);

        let pck = if uses(CostMetric::PoseDistance) {
            Some(PckDistance::new(skeleton, pck_threshold)?)
        } else {
            None
        };

        if uses(CostMetric::AppearanceCosine) && embedder.is_none() {
            return Err(TrackingError::config(
                "appearance metric is weighted but no embedder was provided",
            ));
        }

        log::debug!(
            "Cost matrix terms: {}",
            terms
                .iter()
                .map(|(m, w)| format!("{}*{}", w, m))
                .collect::<Vec<_>>()
                .join(" + ")
        );

        Ok(Self {
            terms,
            pck,
            embedder,
        })
    }

    /// Metrics that will actually be evaluated, with their weights
    pub fn terms(&self) -> &[(CostMetric, f32)] {
        &self.terms
    }

    /// Largest cost [`build`](Self::build) can produce, summed in metric order
    pub fn max_cost(&self) -> f32 {
        self.terms
            .iter()
            .fold(0.0, |total, &(metric, weight)| total + metric.max_value() * weight)
    }

    /// `(prev.len(), cur.len())` weighted sum of every nonzero-weight metric
    pub fn build(&self, prev: &Frame, cur: &Frame) -> Result<Array2<f32>> {
        let shape = (prev.len(), cur.len());
        if shape.0 == 0 || shape.1 == 0 {
            return Ok(Array2::zeros(shape));
        }

        // Independent metrics run concurrently; summation stays in metric order
        let matrices: Vec<Array2<f32>> = self
            .terms
            .par_iter()
            .map(|&(metric, weight)| -> Result<Array2<f32>> {
                let mut m = self.metric_matrix(metric, prev, cur)?;
                m *= weight;
                Ok(m)
            })
            .collect::<Result<_>>()?;

        let mut total = Array2::<f32>::zeros(shape);
        for m in &matrices {
            total += m;
        }
        Ok(total)
    }

    fn metric_matrix(&self, metric: CostMetric, prev: &Frame, cur: &Frame) -> Result<Array2<f32>> {
        match metric {
            CostMetric::BboxOverlap => Ok(ious(prev.boxes(), cur.boxes()).mapv(|iou| 1.0 - iou)),
            CostMetric::AppearanceCosine => self.appearance_matrix(prev, cur),
            CostMetric::PoseDistance => self.pose_matrix(prev, cur),
        }
    }

    fn pose_matrix(&self, prev: &Frame, cur: &Frame) -> Result<Array2<f32>> {
        let pck = self
            .pck
            .as_ref()
            .ok_or_else(|| TrackingError::config("pose metric used without a skeleton"))?;

        for pose in prev.poses().iter().chain(cur.poses()) {
            pck.check(pose)?;
        }

        let (p, c) = (prev.poses(), cur.poses());
        Ok(pairwise(p.len(), c.len(), |i, j| pck.distance(&p[i], &c[j])))
    }

    fn appearance_matrix(&self, prev: &Frame, cur: &Frame) -> Result<Array2<f32>> {
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| TrackingError::config("appearance metric used without an embedder"))?;

        let prev_feats = embed_frame(embedder.as_ref(), prev)?;
        let cur_feats = embed_frame(embedder.as_ref(), cur)?;

        if let Some(first) = prev_feats.iter().chain(&cur_feats).next() {
            let dim = first.len();
            if let Some(odd) = prev_feats.iter().chain(&cur_feats).find(|f| f.len() != dim) {
                return Err(TrackingError::embedding(format!(
                    "embeddings of length {} and {} between frames {} and {}",
                    dim,
                    odd.len(),
                    prev.index,
                    cur.index
                )));
            }
        }

        Ok(pairwise(prev_feats.len(), cur_feats.len(), |i, j| {
            cosine_distance(prev_feats[i].view(), cur_feats[j].view())
        }))
    }
}

/// One embedding per detection of `frame`, in detection order
fn embed_frame(embedder: &dyn AppearanceEmbedder, frame: &Frame) -> Result<Vec<Array1<f32>>> {
    let image = frame.image_path()?;
    (0..frame.len())
        .into_par_iter()
        .map(|i| embedder.embed(image, &frame.bbox(i)))
        .collect()
}
