//! Keypoint skeletons and the PCK-style pose distance

use crate::error::{Result, TrackingError};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// One detection's keypoints, K rows of `[x, y, score]`
pub type Pose = Array2<f32>;

/// Fraction of the reference segment used as the PCK normaliser (PCKh convention)
pub const HEAD_SIZE_FACTOR: f32 = 0.6;

/// PoseTrack keypoints in COCO order (eyes replaced by head bottom/top)
pub const POSETRACK_KEYPOINTS: [&str; 17] = [
    "nose",
    "head_bottom",
    "head_top",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// COCO-Pose keypoints
pub const COCO_KEYPOINTS: [&str; 17] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// Keypoint pairs tried, in order, as the scale reference of a pose
const SCALE_REFERENCES: [(&str, &str); 3] = [
    ("head_top", "head_bottom"),
    ("left_ear", "right_ear"),
    ("left_shoulder", "right_shoulder"),
];

/// Named keypoint layout shared by every pose of a sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    names: Vec<String>,
}

impl Skeleton {
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
        }
    }

    pub fn posetrack() -> Self {
        Self::new(&POSETRACK_KEYPOINTS)
    }

    pub fn coco() -> Self {
        Self::new(&COCO_KEYPOINTS)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Indices of the first reference pair available in this skeleton
    pub fn scale_reference(&self) -> Option<(usize, usize)> {
        SCALE_REFERENCES
            .iter()
            .find_map(|(a, b)| Some((self.index_of(a)?, self.index_of(b)?)))
    }
}

impl Default for Skeleton {
    fn default() -> Self {
        Self::posetrack()
    }
}

/// PCK distance between poses, normalised by the previous pose's head size
#[derive(Debug, Clone)]
pub struct PckDistance {
    num_keypoints: usize,
    reference: (usize, usize),
    threshold: f32,
}

impl PckDistance {
    pub fn new(skeleton: &Skeleton, threshold: f32) -> Result<Self> {
        let reference = skeleton.scale_reference().ok_or_else(|| {
            TrackingError::config(format!(
                "pose distance needs one of {:?} in the keypoint names",
                SCALE_REFERENCES
            ))
        })?;
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(TrackingError::config(format!(
                "pck threshold must be positive, got {}",
                threshold
            )));
        }

        Ok(Self {
            num_keypoints: skeleton.len(),
            reference,
            threshold,
        })
    }

    pub fn num_keypoints(&self) -> usize {
        self.num_keypoints
    }

    /// Reject poses whose shape does not match the skeleton
    pub fn check(&self, pose: &Pose) -> Result<()> {
        if pose.nrows() != self.num_keypoints || pose.ncols() < 2 {
            return Err(TrackingError::KeypointCount {
                expected: self.num_keypoints,
                actual: pose.nrows(),
            });
        }
        Ok(())
    }

    fn head_size(&self, pose: &Pose) -> f32 {
        let (a, b) = self.reference;
        let dx = pose[[a, 0]] - pose[[b, 0]];
        let dy = pose[[a, 1]] - pose[[b, 1]];
        HEAD_SIZE_FACTOR * (dx * dx + dy * dy).sqrt()
    }

    /// `1 - fraction of keypoints within threshold * head size`, in [0, 1]
    pub fn distance(&self, prev: &Pose, cur: &Pose) -> f32 {
        let head_size = self.head_size(prev);
        if !(head_size.is_finite() && head_size > f32::EPSILON) {
            return 1.0;
        }

        let correct = prev
            .outer_iter()
            .zip(cur.outer_iter())
            .filter(|(p, c)| {
                let dx = p[0] - c[0];
                let dy = p[1] - c[1];
                (dx * dx + dy * dy).sqrt() / head_size < self.threshold
            })
            .count();

        1.0 - correct as f32 / self.num_keypoints as f32
    }
}
