//! Per-frame detection storage and confidence filtering
//!
//! A [`Frame`] holds the detector output for one image: an `N x 5` array of
//! `[x1, y1, x2, y2, score]` rows and `N` poses, index aligned. Every
//! transform here keeps that alignment; constructing a frame that breaks it
//! fails with [`TrackingError::AlignmentViolation`].

use crate::bbox::Bbox;
use crate::error::{Result, TrackingError};
use crate::pose::Pose;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Number of columns in a detector box row
pub const BOX_COLUMNS: usize = 5;

/// Detections of a single video frame
///
/// Deserialization goes through [`Frame::new`], so a decoded frame obeys the
/// same box-shape and alignment rules as a constructed one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFrame")]
pub struct Frame {
    /// Position of the frame in its sequence
    pub index: usize,
    /// Source image, needed only by appearance metrics
    pub image: Option<PathBuf>,
    /// Image size as (width, height), when known
    pub size: Option<(u32, u32)>,
    boxes: Array2<f32>,
    poses: Vec<Pose>,
}

impl Frame {
    pub fn new(index: usize, boxes: Array2<f32>, poses: Vec<Pose>) -> Result<Self> {
        if boxes.nrows() > 0 && boxes.ncols() != BOX_COLUMNS {
            return Err(TrackingError::InvalidDetections {
                frame: index,
                reason: format!(
                    "expected {} box columns, got {}",
                    BOX_COLUMNS,
                    boxes.ncols()
                ),
            });
        }
        if boxes.nrows() != poses.len() {
            return Err(TrackingError::AlignmentViolation {
                frame: index,
                boxes: boxes.nrows(),
                poses: poses.len(),
            });
        }

        // Normalise the empty case so zero-row frames always have 5 columns
        let boxes = if boxes.nrows() == 0 {
            Array2::zeros((0, BOX_COLUMNS))
        } else {
            boxes
        };

        Ok(Self {
            index,
            image: None,
            size: None,
            boxes,
            poses,
        })
    }

    /// Frame without any detections
    pub fn empty(index: usize) -> Self {
        Self {
            index,
            image: None,
            size: None,
            boxes: Array2::zeros((0, BOX_COLUMNS)),
            poses: Vec::new(),
        }
    }

    pub fn with_image<P: Into<PathBuf>>(mut self, image: P) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    pub fn len(&self) -> usize {
        self.boxes.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.nrows() == 0
    }

    pub fn boxes(&self) -> ArrayView2<'_, f32> {
        self.boxes.view()
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub fn bbox(&self, det_idx: usize) -> Bbox<f32> {
        Bbox::from_row(self.boxes.row(det_idx))
    }

    pub fn score(&self, det_idx: usize) -> f32 {
        self.boxes[[det_idx, 4]]
    }

    pub fn image_path(&self) -> Result<&Path> {
        self.image
            .as_deref()
            .ok_or(TrackingError::MissingImage(self.index))
    }

    /// Keep only the detections at `keep`, in that order
    pub fn select(&self, keep: &[usize]) -> Self {
        Self {
            index: self.index,
            image: self.image.clone(),
            size: self.size,
            boxes: self.boxes.select(Axis(0), keep),
            poses: keep.iter().map(|&i| self.poses[i].clone()).collect(),
        }
    }

    /// Replace every pose, keeping boxes untouched
    pub fn replace_poses(&mut self, poses: Vec<Pose>) -> Result<()> {
        if poses.len() != self.boxes.nrows() {
            return Err(TrackingError::AlignmentViolation {
                frame: self.index,
                boxes: self.boxes.nrows(),
                poses: poses.len(),
            });
        }
        self.poses = poses;
        Ok(())
    }

    /// Detections whose score strictly exceeds `conf`
    pub fn filter_by_confidence(&self, conf: f32) -> Self {
        let keep: Vec<usize> = self
            .boxes
            .column(4)
            .iter()
            .enumerate()
            .filter(|(_, &score)| score > conf)
            .map(|(i, _)| i)
            .collect();
        self.select(&keep)
    }

    /// The single detection closest to the image centre
    pub fn keep_center_detection(&self) -> Self {
        let Some((width, height)) = self.size else {
            return self.clone();
        };
        let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);

        let closest = (0..self.len()).min_by(|&a, &b| {
            let da = center_distance(&self.bbox(a), cx, cy);
            let db = center_distance(&self.bbox(b), cx, cy);
            da.total_cmp(&db)
        });

        match closest {
            Some(idx) => self.select(&[idx]),
            None => self.clone(),
        }
    }
}

/// Unchecked wire form of a [`Frame`]
#[derive(Deserialize)]
struct RawFrame {
    index: usize,
    #[serde(default)]
    image: Option<PathBuf>,
    #[serde(default)]
    size: Option<(u32, u32)>,
    boxes: Array2<f32>,
    poses: Vec<Pose>,
}

impl TryFrom<RawFrame> for Frame {
    type Error = TrackingError;

    fn try_from(raw: RawFrame) -> Result<Self> {
        let mut frame = Frame::new(raw.index, raw.boxes, raw.poses)?;
        frame.image = raw.image;
        frame.size = raw.size;
        Ok(frame)
    }
}

fn center_distance(bbox: &Bbox<f32>, cx: f32, cy: f32) -> f32 {
    let dx = bbox.center_x() - cx;
    let dy = bbox.center_y() - cy;
    dx * dx + dy * dy
}

/// Ordered frames of one video sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Frame>", into = "Vec<Frame>")]
pub struct DetectionStore {
    frames: Vec<Frame>,
}

impl DetectionStore {
    /// Validate alignment and strictly increasing frame order
    pub fn new(frames: Vec<Frame>) -> Result<Self> {
        for frame in &frames {
            if frame.boxes.nrows() != frame.poses.len() {
                return Err(TrackingError::AlignmentViolation {
                    frame: frame.index,
                    boxes: frame.boxes.nrows(),
                    poses: frame.poses.len(),
                });
            }
        }
        for pair in frames.windows(2) {
            if pair[1].index <= pair[0].index {
                return Err(TrackingError::FrameOrder {
                    previous: pair[0].index,
                    current: pair[1].index,
                });
            }
        }
        Ok(Self { frames })
    }

    /// Drop every detection with score `<= conf` in every frame
    pub fn filter_by_confidence(&self, conf: f32) -> Self {
        let frames: Vec<Frame> = self
            .frames
            .iter()
            .map(|frame| frame.filter_by_confidence(conf))
            .collect();

        let kept: usize = frames.iter().map(Frame::len).sum();
        log::debug!(
            "Confidence filter (> {:.3}) kept {}/{} detections",
            conf,
            kept,
            self.num_detections()
        );

        Self { frames }
    }

    /// Keep only the most central detection of each frame
    pub fn keep_center_detections(&self) -> Self {
        Self {
            frames: self
                .frames
                .iter()
                .map(Frame::keep_center_detection)
                .collect(),
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut [Frame] {
        &mut self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn num_detections(&self) -> usize {
        self.frames.iter().map(Frame::len).sum()
    }
}

impl TryFrom<Vec<Frame>> for DetectionStore {
    type Error = TrackingError;

    fn try_from(frames: Vec<Frame>) -> Result<Self> {
        Self::new(frames)
    }
}

impl From<DetectionStore> for Vec<Frame> {
    fn from(store: DetectionStore) -> Self {
        store.frames
    }
}
