//! Configuration for a tracking pass over one or more sequences
//!
//! Defaults: bbox overlap only, exact assignment, 999 track IDs starting at 0.

use crate::association::AssociationMode;
use crate::cost::CostMetric;
use crate::error::{Result, TrackingError};
use crate::hungarian::AssignmentStrategy;
use crate::pose::{PckDistance, Skeleton, POSETRACK_KEYPOINTS};
use crate::track_ids::{FIRST_TRACK_ID, MAX_TRACK_IDS};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Detections with score <= this are dropped before tracking
    pub conf_threshold: f32,
    /// Cost metric identifiers, parallel to `distance_metric_weights`
    pub distance_metrics: Vec<String>,
    /// Non-negative weight per metric; zero disables a metric entirely
    pub distance_metric_weights: Vec<f32>,
    /// Assignment algorithm
    pub matching: AssignmentStrategy,
    /// Matched pairs costing at least this fraction of the largest possible
    /// weighted cost start a new track instead
    pub max_cost_fraction: Option<f32>,
    /// Geometric or recurrent association
    pub mode: AssociationMode,
    /// Recurrent mode: pairs with similarity <= this start a new track instead
    pub min_similarity: Option<f32>,
    /// Run the external smoothing pass once after matching
    pub flow_smoothing: bool,
    /// Keep only the detection nearest the image centre in each frame
    pub keep_center_detections_only: bool,
    /// Match across empty frames against the last non-empty frame
    pub bridge_empty_frames: bool,
    /// Size of the track ID space
    pub max_track_ids: u32,
    /// ID given to the first track of a sequence
    pub first_track_id: u32,
    /// Keypoint names of the pose skeleton
    pub keypoint_names: Vec<String>,
    /// Normalised distance under which a keypoint counts as correct
    pub pck_threshold: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            conf_threshold: 0.95,
            distance_metrics: vec![
                "bbox-overlap".to_string(),
                "cnn-cosdist".to_string(),
                "pose-pck".to_string(),
            ],
            distance_metric_weights: vec![1.0, 0.0, 0.0],
            matching: AssignmentStrategy::Hungarian,
            max_cost_fraction: Some(1.0),
            mode: AssociationMode::Geometric,
            min_similarity: None,
            flow_smoothing: false,
            keep_center_detections_only: false,
            bridge_empty_frames: false,
            max_track_ids: MAX_TRACK_IDS,
            first_track_id: FIRST_TRACK_ID,
            keypoint_names: POSETRACK_KEYPOINTS.iter().map(|s| s.to_string()).collect(),
            pck_threshold: 0.5,
        }
    }
}

impl TrackerConfig {
    /// Bbox-overlap-only configuration with the given confidence threshold
    pub fn bbox_only(conf_threshold: f32) -> Self {
        Self {
            conf_threshold,
            distance_metrics: vec!["bbox-overlap".to_string()],
            distance_metric_weights: vec![1.0],
            ..Self::default()
        }
    }

    pub fn skeleton(&self) -> Skeleton {
        Skeleton::new(&self.keypoint_names)
    }

    /// Parse every configured metric, in order, with its weight
    pub fn enabled_metrics(&self) -> Result<Vec<(CostMetric, f32)>> {
        if self.distance_metrics.len() != self.distance_metric_weights.len() {
            return Err(TrackingError::config(format!(
                "{} distance metrics but {} weights",
                self.distance_metrics.len(),
                self.distance_metric_weights.len()
            )));
        }
        self.distance_metrics
            .iter()
            .zip(&self.distance_metric_weights)
            .map(|(id, &w)| Ok((id.parse::<CostMetric>()?, w)))
            .collect()
    }

    /// Check every setting before any frame is processed
    pub fn validate(&self) -> Result<()> {
        if !self.conf_threshold.is_finite() {
            return Err(TrackingError::config(format!(
                "confidence threshold must be finite, got {}",
                self.conf_threshold
            )));
        }

        let metrics = self.enabled_metrics()?;
        for (metric, weight) in &metrics {
            if !(weight.is_finite() && *weight >= 0.0) {
                return Err(TrackingError::config(format!(
                    "weight for {} must be finite and non-negative, got {}",
                    metric, weight
                )));
            }
        }

        if self.max_track_ids == 0 {
            return Err(TrackingError::config("max_track_ids must be at least 1"));
        }
        if self.first_track_id >= self.max_track_ids {
            return Err(TrackingError::config(format!(
                "first_track_id {} must be below max_track_ids {}",
                self.first_track_id, self.max_track_ids
            )));
        }

        if self
            .max_cost_fraction
            .is_some_and(|f| !(f.is_finite() && f > 0.0))
        {
            return Err(TrackingError::config(format!(
                "max_cost_fraction must be positive, got {:?}",
                self.max_cost_fraction
            )));
        }
        if self.min_similarity.is_some_and(|s| !s.is_finite()) {
            return Err(TrackingError::config("min_similarity must be finite"));
        }

        let pose_weighted = metrics
            .iter()
            .any(|(m, w)| *m == CostMetric::PoseDistance && *w != 0.0);
        if self.mode == AssociationMode::Geometric && pose_weighted {
            PckDistance::new(&self.skeleton(), self.pck_threshold)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_track_ids, 999);
        assert_eq!(config.first_track_id, 0);
        assert_eq!(config.keypoint_names.len(), 17);
    }

    #[test]
    fn test_length_mismatch() {
        let config = TrackerConfig {
            distance_metric_weights: vec![1.0],
            ..TrackerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TrackingError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_metric_even_with_zero_weight() {
        let config = TrackerConfig {
            distance_metrics: vec!["bbox-overlap".into(), "flow-warp".into()],
            distance_metric_weights: vec![1.0, 0.0],
            ..TrackerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, TrackingError::UnsupportedMetric(ref m) if m == "flow-warp"));
    }

    #[test]
    fn test_negative_weight() {
        let config = TrackerConfig {
            distance_metric_weights: vec![1.0, -0.5, 0.0],
            ..TrackerConfig::default()
        };
        assert!(config.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_id_space() {
        let zero = TrackerConfig {
            max_track_ids: 0,
            ..TrackerConfig::default()
        };
        assert!(zero.validate().is_err());

        let first_outside = TrackerConfig {
            max_track_ids: 10,
            first_track_id: 10,
            ..TrackerConfig::default()
        };
        assert!(first_outside.validate().is_err());
    }

    #[test]
    fn test_cost_fraction_must_be_positive() {
        for bad in [0.0, -0.5, f32::NAN] {
            let config = TrackerConfig {
                max_cost_fraction: Some(bad),
                ..TrackerConfig::default()
            };
            assert!(config.validate().unwrap_err().is_configuration());
        }
        let ungated = TrackerConfig {
            max_cost_fraction: None,
            ..TrackerConfig::default()
        };
        assert!(ungated.validate().is_ok());
    }

    #[test]
    fn test_pose_metric_needs_scale_reference() {
        let config = TrackerConfig {
            distance_metric_weights: vec![1.0, 0.0, 1.0],
            keypoint_names: vec!["nose".into(), "tail".into()],
            ..TrackerConfig::default()
        };
        assert!(config.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let config: TrackerConfig = serde_json::from_str(
            r#"{
                "conf_threshold": 0.5,
                "distance_metrics": ["bbox-overlap", "pose-pck"],
                "distance_metric_weights": [1.0, 0.5],
                "matching": "greedy",
                "mode": "recurrent",
                "max_track_ids": 2
            }"#,
        )
        .unwrap();

        assert_eq!(config.matching, AssignmentStrategy::Greedy);
        assert_eq!(config.mode, AssociationMode::Recurrent);
        assert_eq!(config.max_track_ids, 2);
        assert_eq!(config.first_track_id, 0);
        assert_eq!(config.max_cost_fraction, Some(1.0));
        assert!(config.validate().is_ok());

        let json = serde_json::to_string(&config).unwrap();
        let back: TrackerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
