//! Error types for the pose tracking library

use thiserror::Error;

/// Result type alias for the tracking library
pub type Result<T> = std::result::Result<T, TrackingError>;

/// Errors that can occur while associating detections into tracks
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported cost metric: {0}")]
    UnsupportedMetric(String),

    #[error("Alignment violation in frame {frame}: {boxes} boxes but {poses} poses")]
    AlignmentViolation {
        frame: usize,
        boxes: usize,
        poses: usize,
    },

    #[error("Track assignment of frame {frame} has {tracks} ids for {detections} detections")]
    TrackCount {
        frame: usize,
        detections: usize,
        tracks: usize,
    },

    #[error("Invalid keypoint count: expected {expected}, got {actual}")]
    KeypointCount { expected: usize, actual: usize },

    #[error("Invalid detections in frame {frame}: {reason}")]
    InvalidDetections { frame: usize, reason: String },

    #[error("Invalid cost {value} at ({row}, {col})")]
    InvalidCost { row: usize, col: usize, value: f32 },

    #[error("Match to previous detection {index} but only {tracked} are tracked")]
    MatchOutOfRange { index: usize, tracked: usize },

    #[error("Frames out of order: {current} follows {previous}")]
    FrameOrder { previous: usize, current: usize },

    #[error("No source image for frame {0}")]
    MissingImage(usize),

    #[error("Appearance embedding failed: {0}")]
    Embedding(String),

    #[error("Association model failed: {0}")]
    Model(String),

    #[error("Smoothing pass failed: {0}")]
    Smoothing(String),
}

impl TrackingError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn embedding<S: Into<String>>(msg: S) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    pub fn smoothing<S: Into<String>>(msg: S) -> Self {
        Self::Smoothing(msg.into())
    }

    /// Fatal pre-run errors raised while validating the configuration
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::UnsupportedMetric(_))
    }
}
