//! Multi-person pose tracking across video frames
//!
//! This crate assigns persistent track IDs to per-frame person detections
//! (boxes plus pose keypoints) produced by an external detector. Each frame
//! is associated with the previous one by building a weighted cost matrix,
//! solving a bipartite assignment and resolving matches to IDs drawn from a
//! bounded, wrapping ID space.
//!
//! # Association engines
//!
//! Both engines implement the `AssociationEngine` trait and are selected once
//! per sequence from `TrackerConfig::mode`:
//! - `GeometricEngine`: weighted box overlap, appearance and pose distances
//! - `RecurrentEngine`: learned per-track hidden states (external model)
//!
//! ```rust,ignore
//! use posetrack::{Collaborators, Frame, SequenceTracker, TrackerConfig};
//! use ndarray::{array, Array2};
//!
//! let tracker = SequenceTracker::new(TrackerConfig::default(), Collaborators::default())?;
//! let frames = vec![
//!     Frame::new(0, array![[0.0, 0.0, 10.0, 10.0, 0.99]], vec![Array2::zeros((17, 3))])?,
//!     Frame::new(1, array![[1.0, 1.0, 11.0, 11.0, 0.99]], vec![Array2::zeros((17, 3))])?,
//! ];
//! let report = tracker.run(frames)?;
//! assert_eq!(report.tracks, vec![vec![0], vec![0]]);
//! ```

pub mod association;
pub mod bbox;
pub mod config;
pub mod cost;
pub mod detections;
pub mod error;
pub mod hungarian; // Bipartite assignment between adjacent frames
pub mod pose;
pub mod sequence;
pub mod smoothing;
pub mod track_ids;

pub use association::{
    AssociationEngine, AssociationMode, AssociationModel, GeometricEngine, HiddenStateTable,
    RecurrentEngine,
};
pub use bbox::Bbox;
pub use config::TrackerConfig;
pub use cost::{AppearanceEmbedder, CostMatrixBuilder, CostMetric};
pub use detections::{DetectionStore, Frame};
pub use error::{Result, TrackingError};
pub use hungarian::{AssignmentResult, AssignmentStrategy, BipartiteMatcher};
pub use pose::{PckDistance, Pose, Skeleton};
pub use sequence::{track_sequences, Collaborators, SequenceTracker, TrackingReport};
pub use smoothing::{SmoothedSequence, TrackSmoother};
pub use track_ids::{TrackAssignment, TrackIdAllocator, TrackIdManager};
