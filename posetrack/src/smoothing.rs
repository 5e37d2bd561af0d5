//! Post-hoc temporal smoothing over a fully tracked sequence
//!
//! Smoothing (e.g. optical-flow based pose refinement) is an external step. It
//! sees the whole sequence once, after frame-by-frame matching has finished,
//! and may revise track IDs and poses. Its output is checked for alignment
//! before it replaces the tracker's own result.

use crate::detections::Frame;
use crate::error::{Result, TrackingError};
use crate::pose::Pose;
use crate::track_ids::TrackAssignment;

/// Revised output of a smoothing pass
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SmoothedSequence {
    pub tracks: Vec<TrackAssignment>,
    /// Replacement poses per frame, when the smoother refines keypoints
    pub poses: Option<Vec<Vec<Pose>>>,
}

/// External temporal smoother
pub trait TrackSmoother: Send + Sync {
    fn smooth(&self, frames: &[Frame], tracks: &[TrackAssignment]) -> Result<SmoothedSequence>;
}

/// Run `smoother` and apply its result to `frames`, returning the new tracks
pub fn apply_smoothing(
    smoother: &dyn TrackSmoother,
    frames: &mut [Frame],
    tracks: Vec<TrackAssignment>,
) -> Result<Vec<TrackAssignment>> {
    let smoothed = smoother.smooth(frames, &tracks)?;

    if smoothed.tracks.len() != frames.len() {
        return Err(TrackingError::smoothing(format!(
            "returned tracks for {} frames, sequence has {}",
            smoothed.tracks.len(),
            frames.len()
        )));
    }
    for (frame, frame_tracks) in frames.iter().zip(&smoothed.tracks) {
        if frame_tracks.len() != frame.len() {
            return Err(TrackingError::TrackCount {
                frame: frame.index,
                detections: frame.len(),
                tracks: frame_tracks.len(),
            });
        }
    }

    if let Some(poses) = smoothed.poses {
        if poses.len() != frames.len() {
            return Err(TrackingError::smoothing(format!(
                "returned poses for {} frames, sequence has {}",
                poses.len(),
                frames.len()
            )));
        }
        for (frame, frame_poses) in frames.iter_mut().zip(poses) {
            frame.replace_poses(frame_poses)?;
        }
    }

    log::info!("Smoothing pass applied to {} frames", frames.len());
    Ok(smoothed.tracks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    /// Relabels every track to 7 and zeroes every pose
    struct Flatten;

    impl TrackSmoother for Flatten {
        fn smooth(&self, frames: &[Frame], tracks: &[TrackAssignment]) -> Result<SmoothedSequence> {
            Ok(SmoothedSequence {
                tracks: tracks.iter().map(|t| vec![7; t.len()]).collect(),
                poses: Some(
                    frames
                        .iter()
                        .map(|f| f.poses().iter().map(|p| Array2::zeros(p.dim())).collect())
                        .collect(),
                ),
            })
        }
    }

    /// Drops the last frame
    struct Truncate;

    impl TrackSmoother for Truncate {
        fn smooth(&self, _frames: &[Frame], tracks: &[TrackAssignment]) -> Result<SmoothedSequence> {
            Ok(SmoothedSequence {
                tracks: tracks[..tracks.len() - 1].to_vec(),
                poses: None,
            })
        }
    }

    fn frames() -> Vec<Frame> {
        vec![
            Frame::new(
                0,
                array![[0.0, 0.0, 1.0, 1.0, 0.9]],
                vec![Array2::ones((17, 3))],
            )
            .unwrap(),
            Frame::empty(1),
        ]
    }

    #[test]
    fn test_apply_smoothing() {
        let mut frames = frames();
        let tracks = apply_smoothing(&Flatten, &mut frames, vec![vec![0], vec![]]).unwrap();
        assert_eq!(tracks, vec![vec![7], vec![]]);
        assert_eq!(frames[0].poses()[0], Array2::<f32>::zeros((17, 3)));
    }

    /// Drops the last track ID of every frame
    struct ShortFrames;

    impl TrackSmoother for ShortFrames {
        fn smooth(&self, _frames: &[Frame], tracks: &[TrackAssignment]) -> Result<SmoothedSequence> {
            Ok(SmoothedSequence {
                tracks: tracks
                    .iter()
                    .map(|t| t[..t.len().saturating_sub(1)].to_vec())
                    .collect(),
                poses: None,
            })
        }
    }

    #[test]
    fn test_short_frame_assignment_reports_track_count() {
        let mut frames = frames();
        let err = apply_smoothing(&ShortFrames, &mut frames, vec![vec![0], vec![]]).unwrap_err();
        assert!(matches!(
            err,
            TrackingError::TrackCount {
                frame: 0,
                detections: 1,
                tracks: 0
            }
        ));
        assert!(err.to_string().contains("0 ids for 1 detections"));
    }

    #[test]
    fn test_misaligned_smoother_output_fails() {
        let mut frames = frames();
        let err = apply_smoothing(&Truncate, &mut frames, vec![vec![0], vec![]]).unwrap_err();
        assert!(matches!(err, TrackingError::Smoothing(_)));
    }
}
