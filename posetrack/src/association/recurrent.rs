//! Association from a learned recurrent model
//!
//! Every live track owns one hidden-state vector. Each frame the model encodes
//! the detections, scores them against the hidden states of the previous
//! frame's tracks, and after assignment the states of extended tracks are
//! advanced, new tracks get fresh states, and every track missing from the
//! current frame is retired from the table.

use crate::association::AssociationEngine;
use crate::detections::Frame;
use crate::error::{Result, TrackingError};
use ndarray::prelude::*;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Learned association model (e.g. an LSTM over box and pose features)
pub trait AssociationModel: Send + Sync {
    /// Feature vector of one detection
    fn encode(&self, bbox: ArrayView1<f32>, pose: ArrayView2<f32>) -> Result<Array1<f32>>;

    /// Higher is more similar
    fn similarity(&self, hidden: ArrayView1<f32>, feature: ArrayView1<f32>) -> Result<f32>;

    /// Advance a track's hidden state with its newly matched detection
    fn update(&self, hidden: ArrayView1<f32>, feature: ArrayView1<f32>) -> Result<Array1<f32>>;

    /// Hidden state of a track started from `feature`
    fn init_hidden_state(&self, feature: ArrayView1<f32>) -> Result<Array1<f32>>;
}

/// Hidden states keyed by track ID
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HiddenStateTable {
    states: BTreeMap<u32, Array1<f32>>,
}

impl HiddenStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, track_id: u32) -> Option<&Array1<f32>> {
        self.states.get(&track_id)
    }

    pub fn insert(&mut self, track_id: u32, state: Array1<f32>) {
        self.states.insert(track_id, state);
    }

    pub fn track_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.states.keys().copied()
    }

    /// Drop every state whose track is not in `live`; returns the retired IDs
    pub fn retire_absent(&mut self, live: &[u32]) -> Vec<u32> {
        let mut retired = Vec::new();
        self.states.retain(|id, _| {
            let keep = live.contains(id);
            if !keep {
                retired.push(*id);
            }
            keep
        });
        retired
    }
}

/// Encodings of the frame last scored, reused by the post-assignment step
#[derive(Debug, Clone)]
struct EncodedFrame {
    frame: usize,
    features: Vec<Array1<f32>>,
}

/// Engine driven by an [`AssociationModel`] and a per-sequence state table
pub struct RecurrentEngine {
    model: Arc<dyn AssociationModel>,
    states: HiddenStateTable,
    encoded: Option<EncodedFrame>,
    min_similarity: Option<f32>,
}

impl RecurrentEngine {
    /// # Arguments
    /// * `model` - Shared model; its weights are never mutated
    /// * `min_similarity` - Pairs scoring at or below this never match
    pub fn new(model: Arc<dyn AssociationModel>, min_similarity: Option<f32>) -> Self {
        Self {
            model,
            states: HiddenStateTable::new(),
            encoded: None,
            min_similarity,
        }
    }

    pub fn states(&self) -> &HiddenStateTable {
        &self.states
    }

    fn encode_frame(&self, frame: &Frame) -> Result<Vec<Array1<f32>>> {
        let boxes = frame.boxes();
        let poses = frame.poses();
        (0..frame.len())
            .into_par_iter()
            .map(|i| self.model.encode(boxes.row(i), poses[i].view()))
            .collect()
    }

    fn features_for(&mut self, frame: &Frame) -> Result<Vec<Array1<f32>>> {
        match self.encoded.take() {
            Some(encoded) if encoded.frame == frame.index => Ok(encoded.features),
            _ => self.encode_frame(frame),
        }
    }
}

impl AssociationEngine for RecurrentEngine {
    fn cost_matrix(
        &mut self,
        _prev: &Frame,
        prev_tracks: &[u32],
        cur: &Frame,
    ) -> Result<Array2<f32>> {
        let features = self.encode_frame(cur)?;

        let hidden: Vec<&Array1<f32>> = prev_tracks
            .iter()
            .map(|&id| {
                self.states.get(id).ok_or_else(|| {
                    TrackingError::model(format!("no hidden state for track {}", id))
                })
            })
            .collect::<Result<_>>()?;

        let model = self.model.as_ref();
        let scores: Vec<Vec<f32>> = hidden
            .par_iter()
            .map(|h| {
                features
                    .iter()
                    .map(|f| model.similarity(h.view(), f.view()))
                    .collect::<Result<Vec<f32>>>()
            })
            .collect::<Result<_>>()?;

        let cost = Array2::from_shape_fn((hidden.len(), features.len()), |(i, j)| -scores[i][j]);

        self.encoded = Some(EncodedFrame {
            frame: cur.index,
            features,
        });
        Ok(cost)
    }

    fn max_match_cost(&self) -> Option<f32> {
        self.min_similarity.map(|s| -s)
    }

    fn post_assignment(
        &mut self,
        cur: &Frame,
        matches: &[Option<usize>],
        tracks: &[u32],
    ) -> Result<()> {
        let features = self.features_for(cur)?;
        if features.len() != tracks.len() || matches.len() != tracks.len() {
            return Err(TrackingError::AlignmentViolation {
                frame: cur.index,
                boxes: features.len(),
                poses: tracks.len(),
            });
        }

        let mut next: BTreeMap<u32, Array1<f32>> = BTreeMap::new();

        // Extended tracks first, so a wrapped new ID can never clobber them
        for (j, feature) in features.iter().enumerate() {
            if matches[j].is_none() {
                continue;
            }
            let id = tracks[j];
            let state = match self.states.get(id) {
                Some(hidden) => self.model.update(hidden.view(), feature.view())?,
                None => {
                    log::warn!("Track {} matched without a hidden state, reinitialising", id);
                    self.model.init_hidden_state(feature.view())?
                }
            };
            next.insert(id, state);
        }

        for (j, feature) in features.iter().enumerate() {
            if matches[j].is_some() {
                continue;
            }
            let id = tracks[j];
            if next.contains_key(&id) {
                log::warn!(
                    "New track id {} aliases a live track in frame {}",
                    id,
                    cur.index
                );
                continue;
            }
            next.insert(id, self.model.init_hidden_state(feature.view())?);
        }

        for (id, state) in next {
            self.states.insert(id, state);
        }

        let retired = self.states.retire_absent(tracks);
        if !retired.is_empty() {
            log::debug!(
                "Frame {}: retired hidden states of tracks {:?}",
                cur.index,
                retired
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "recurrent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Box centre as feature; hidden state is the last matched centre
    #[derive(Default)]
    struct CentreModel {
        encodes: AtomicUsize,
        updates: AtomicUsize,
        inits: AtomicUsize,
    }

    impl AssociationModel for CentreModel {
        fn encode(&self, bbox: ArrayView1<f32>, _pose: ArrayView2<f32>) -> Result<Array1<f32>> {
            self.encodes.fetch_add(1, Ordering::SeqCst);
            Ok(array![(bbox[0] + bbox[2]) / 2.0, (bbox[1] + bbox[3]) / 2.0])
        }

        fn similarity(&self, hidden: ArrayView1<f32>, feature: ArrayView1<f32>) -> Result<f32> {
            let d = &hidden - &feature;
            Ok(-d.dot(&d).sqrt())
        }

        fn update(&self, _hidden: ArrayView1<f32>, feature: ArrayView1<f32>) -> Result<Array1<f32>> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(feature.to_owned())
        }

        fn init_hidden_state(&self, feature: ArrayView1<f32>) -> Result<Array1<f32>> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(feature.to_owned())
        }
    }

    fn frame(index: usize, boxes: Array2<f32>) -> Frame {
        let poses = (0..boxes.nrows()).map(|_| Array2::zeros((17, 3))).collect();
        Frame::new(index, boxes, poses).unwrap()
    }

    #[test]
    fn test_state_lifecycle() {
        let model = Arc::new(CentreModel::default());
        let mut engine = RecurrentEngine::new(model.clone(), None);

        let f0 = frame(0, array![[0.0, 0.0, 10.0, 10.0, 0.9], [50.0, 50.0, 60.0, 60.0, 0.9]]);
        engine.post_assignment(&f0, &[None, None], &[0, 1]).unwrap();
        assert_eq!(engine.states().track_ids().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(model.inits.load(Ordering::SeqCst), 2);

        let f1 = frame(1, array![[1.0, 1.0, 11.0, 11.0, 0.9], [200.0, 200.0, 210.0, 210.0, 0.9]]);
        let cost = engine.cost_matrix(&f0, &[0, 1], &f1).unwrap();
        assert_eq!(cost.dim(), (2, 2));
        // negated similarity: nearer is cheaper
        assert_abs_diff_eq!(cost[[0, 0]], 2.0f32.sqrt(), epsilon = 1e-5);
        assert!(cost[[0, 0]] < cost[[0, 1]]);

        engine.post_assignment(&f1, &[Some(0), None], &[0, 2]).unwrap();
        assert_eq!(engine.states().track_ids().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(engine.states().get(0).unwrap(), &array![6.0, 6.0]);
        assert_eq!(model.updates.load(Ordering::SeqCst), 1);
        assert_eq!(model.inits.load(Ordering::SeqCst), 3);
        // encodings from cost_matrix are reused
        assert_eq!(model.encodes.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_empty_frame_retires_everything() {
        let mut engine = RecurrentEngine::new(Arc::new(CentreModel::default()), None);
        let f0 = frame(0, array![[0.0, 0.0, 10.0, 10.0, 0.9]]);
        engine.post_assignment(&f0, &[None], &[0]).unwrap();

        engine.post_assignment(&Frame::empty(1), &[], &[]).unwrap();
        assert!(engine.states().is_empty());
    }

    #[test]
    fn test_missing_hidden_state_fails() {
        let mut engine = RecurrentEngine::new(Arc::new(CentreModel::default()), None);
        let f0 = frame(0, array![[0.0, 0.0, 10.0, 10.0, 0.9]]);
        let err = engine.cost_matrix(&f0, &[3], &f0).unwrap_err();
        assert!(matches!(err, TrackingError::Model(_)));
    }

    #[test]
    fn test_aliased_new_id_keeps_matched_state() {
        let mut engine = RecurrentEngine::new(Arc::new(CentreModel::default()), None);
        let f0 = frame(0, array![[0.0, 0.0, 10.0, 10.0, 0.9]]);
        engine.post_assignment(&f0, &[None], &[0]).unwrap();

        let f1 = frame(1, array![[2.0, 2.0, 12.0, 12.0, 0.9], [80.0, 80.0, 90.0, 90.0, 0.9]]);
        engine.post_assignment(&f1, &[Some(0), None], &[0, 0]).unwrap();
        assert_eq!(engine.states().len(), 1);
        assert_eq!(engine.states().get(0).unwrap(), &array![7.0, 7.0]);
    }

    #[test]
    fn test_similarity_gate() {
        let engine = RecurrentEngine::new(Arc::new(CentreModel::default()), Some(-5.0));
        assert_eq!(engine.max_match_cost(), Some(5.0));
    }

    #[test]
    fn test_retire_absent() {
        let mut table = HiddenStateTable::new();
        for id in [3, 5, 9] {
            table.insert(id, array![id as f32]);
        }
        assert_eq!(table.retire_absent(&[9, 3]), vec![5]);
        assert_eq!(table.track_ids().collect::<Vec<_>>(), vec![3, 9]);
    }
}
