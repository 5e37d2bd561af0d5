//! Per-sequence tracking pass
//!
//! A sequence is processed as a fold over its frames in index order. The
//! accumulator is the previous frame's track assignment (held by the
//! [`TrackIdManager`]) plus whatever state the association engine keeps.
//! Independent sequences share nothing and can run in parallel.

use crate::association::{
    AssociationEngine, AssociationMode, AssociationModel, GeometricEngine, RecurrentEngine,
};
use crate::config::TrackerConfig;
use crate::cost::{AppearanceEmbedder, CostMatrixBuilder};
use crate::detections::{DetectionStore, Frame};
use crate::error::{Result, TrackingError};
use crate::hungarian::BipartiteMatcher;
use crate::smoothing::{apply_smoothing, TrackSmoother};
use crate::track_ids::{TrackAssignment, TrackIdManager};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// External models the tracker may call into
#[derive(Clone, Default)]
pub struct Collaborators {
    pub embedder: Option<Arc<dyn AppearanceEmbedder>>,
    pub model: Option<Arc<dyn AssociationModel>>,
    pub smoother: Option<Arc<dyn TrackSmoother>>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("embedder", &self.embedder.is_some())
            .field("model", &self.model.is_some())
            .field("smoother", &self.smoother.is_some())
            .finish()
    }
}

/// Output of one tracking pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingReport {
    /// Filtered (and possibly smoothed) frames the tracks refer to
    pub frames: Vec<Frame>,
    /// Track IDs per frame, index aligned with each frame's detections
    pub tracks: Vec<TrackAssignment>,
    /// Frame index of every allocation that wrapped the ID counter
    pub wrap_events: Vec<usize>,
}

impl TrackingReport {
    /// Number of distinct track IDs in the sequence
    pub fn num_tracks(&self) -> usize {
        self.tracks.iter().flatten().collect::<BTreeSet<_>>().len()
    }

    /// Track IDs of the frame with sequence index `index`
    pub fn tracks_at(&self, index: usize) -> Option<&[u32]> {
        self.frames
            .iter()
            .position(|f| f.index == index)
            .map(|pos| self.tracks[pos].as_slice())
    }
}

#[derive(Clone)]
enum EngineKind {
    Geometric(CostMatrixBuilder),
    Recurrent(Arc<dyn AssociationModel>),
}

/// Tracks detections across the frames of a sequence
///
/// Construction validates the configuration and resolves every collaborator,
/// so [`run`](Self::run) can only fail on the data it is given.
#[derive(Clone)]
pub struct SequenceTracker {
    config: TrackerConfig,
    engine: EngineKind,
    smoother: Option<Arc<dyn TrackSmoother>>,
}

impl std::fmt::Debug for SequenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceTracker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SequenceTracker {
    pub fn new(config: TrackerConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let engine = match config.mode {
            AssociationMode::Geometric => EngineKind::Geometric(CostMatrixBuilder::new(
                &config.distance_metrics,
                &config.distance_metric_weights,
                &config.skeleton(),
                config.pck_threshold,
                collaborators.embedder,
            )?),
            AssociationMode::Recurrent => match collaborators.model {
                Some(model) => EngineKind::Recurrent(model),
                None => {
                    return Err(TrackingError::config(
                        "recurrent mode requires an association model",
                    ))
                }
            },
        };

        let smoother = if config.flow_smoothing {
            match collaborators.smoother {
                Some(smoother) => Some(smoother),
                None => {
                    return Err(TrackingError::config(
                        "flow smoothing is enabled but no smoother was provided",
                    ))
                }
            }
        } else {
            None
        };

        log::info!(
            "Sequence tracker: {} association, {} matching, {} track ids from {}",
            config.mode,
            config.matching,
            config.max_track_ids,
            config.first_track_id
        );

        Ok(Self {
            config,
            engine,
            smoother,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Fresh engine for one sequence; recurrent state never leaks between runs
    fn engine(&self) -> Box<dyn AssociationEngine> {
        match &self.engine {
            EngineKind::Geometric(builder) => Box::new(GeometricEngine::new(
                builder.clone(),
                self.config.max_cost_fraction,
            )),
            EngineKind::Recurrent(model) => Box::new(RecurrentEngine::new(
                Arc::clone(model),
                self.config.min_similarity,
            )),
        }
    }

    /// Track one sequence of frames, given in increasing index order
    pub fn run(&self, frames: Vec<Frame>) -> Result<TrackingReport> {
        let raw = DetectionStore::new(frames)?;
        let mut store = raw.filter_by_confidence(self.config.conf_threshold);
        if self.config.keep_center_detections_only {
            store = store.keep_center_detections();
        }
        let mut frames = store.into_frames();

        let mut engine = self.engine();
        let mut manager = TrackIdManager::new(
            self.config.first_track_id,
            self.config.max_track_ids,
            self.config.bridge_empty_frames,
        )?;

        log::info!(
            "Tracking {} frames ({} detections) with {} association",
            frames.len(),
            frames.iter().map(Frame::len).sum::<usize>(),
            engine.name()
        );

        let mut tracks: Vec<TrackAssignment> = Vec::with_capacity(frames.len());
        let mut wrap_events = Vec::new();
        let mut prev: Option<usize> = None;

        for (pos, cur) in frames.iter().enumerate() {
            let matches = match prev.map(|p| &frames[p]) {
                Some(prev_frame) if !prev_frame.is_empty() && !cur.is_empty() => {
                    let cost = engine.cost_matrix(prev_frame, manager.previous(), cur)?;
                    BipartiteMatcher::new(self.config.matching, engine.max_match_cost())
                        .match_columns(cost.view())?
                }
                _ => vec![None; cur.len()],
            };

            let frame_tracks = manager.assign(&matches)?;
            for _ in 0..frame_tracks.wraps {
                wrap_events.push(cur.index);
            }

            if !(cur.is_empty() && self.config.bridge_empty_frames) {
                engine.post_assignment(cur, &matches, &frame_tracks.tracks)?;
                prev = Some(pos);
            }

            log::debug!(
                "Frame {}: {} detections, {} matched, tracks {:?}",
                cur.index,
                cur.len(),
                matches.iter().filter(|m| m.is_some()).count(),
                frame_tracks.tracks
            );
            tracks.push(frame_tracks.tracks);
        }

        if let Some(smoother) = &self.smoother {
            tracks = apply_smoothing(smoother.as_ref(), &mut frames, tracks)?;
        }

        for (frame, frame_tracks) in frames.iter().zip(&tracks) {
            if frame.poses().len() != frame.len() {
                return Err(TrackingError::AlignmentViolation {
                    frame: frame.index,
                    boxes: frame.len(),
                    poses: frame.poses().len(),
                });
            }
            if frame_tracks.len() != frame.len() {
                return Err(TrackingError::TrackCount {
                    frame: frame.index,
                    detections: frame.len(),
                    tracks: frame_tracks.len(),
                });
            }
        }

        let report = TrackingReport {
            frames,
            tracks,
            wrap_events,
        };
        log::info!(
            "Tracked {} frames: {} tracks, {} id wraps",
            report.frames.len(),
            report.num_tracks(),
            report.wrap_events.len()
        );
        Ok(report)
    }

    /// Track independent sequences in parallel, one result per sequence
    pub fn run_many(&self, sequences: Vec<Vec<Frame>>) -> Vec<Result<TrackingReport>> {
        sequences
            .into_par_iter()
            .map(|frames| self.run(frames))
            .collect()
    }
}

/// Build a tracker and run it over every sequence
///
/// Configuration errors fail the whole call; data errors are reported per sequence.
pub fn track_sequences(
    config: TrackerConfig,
    collaborators: Collaborators,
    sequences: Vec<Vec<Frame>>,
) -> Result<Vec<Result<TrackingReport>>> {
    let tracker = SequenceTracker::new(config, collaborators)?;
    Ok(tracker.run_many(sequences))
}
