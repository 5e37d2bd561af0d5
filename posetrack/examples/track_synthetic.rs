//! Track a few synthetic people walking across a 640x480 frame
//!
//! Run with `RUST_LOG=debug` to see per-frame matches.

use ndarray::{Array1, Array2};
use posetrack::{Collaborators, Frame, Pose, SequenceTracker, TrackerConfig};
use rand::prelude::*;

const FRAMES: usize = 12;

/// Upright skeleton filling `bbox`
fn synthetic_pose(bbox: &[f32; 4], rng: &mut StdRng) -> Pose {
    let [x1, y1, x2, y2] = *bbox;
    let (w, h) = (x2 - x1, y2 - y1);
    // (x, y) as fractions of the box, PoseTrack keypoint order
    let layout = [
        (0.5, 0.15), // nose
        (0.5, 0.10), // head_bottom
        (0.5, 0.0),  // head_top
        (0.4, 0.1),
        (0.6, 0.1),
        (0.3, 0.25),
        (0.7, 0.25),
        (0.2, 0.45),
        (0.8, 0.45),
        (0.15, 0.6),
        (0.85, 0.6),
        (0.4, 0.6),
        (0.6, 0.6),
        (0.4, 0.8),
        (0.6, 0.8),
        (0.4, 1.0),
        (0.6, 1.0),
    ];
    let mut pose = Array2::zeros((layout.len(), 3));
    for (k, (fx, fy)) in layout.iter().enumerate() {
        pose[[k, 0]] = x1 + fx * w + rng.gen_range(-1.0..1.0);
        pose[[k, 1]] = y1 + fy * h + rng.gen_range(-1.0..1.0);
        pose[[k, 2]] = 1.0;
    }
    pose
}

fn build_frames(rng: &mut StdRng) -> anyhow::Result<Vec<Frame>> {
    // (start x, start y, dx per frame, first frame, last frame)
    let people = [
        (20.0, 100.0, 6.0, 0, FRAMES),
        (400.0, 120.0, -4.0, 0, 7),
        (300.0, 300.0, 2.0, 4, FRAMES),
    ];

    let mut frames = Vec::with_capacity(FRAMES);
    for f in 0..FRAMES {
        let mut rows = Vec::new();
        let mut poses = Vec::new();
        for &(x, y, dx, first, last) in &people {
            if f < first || f >= last {
                continue;
            }
            let x1 = x + dx * f as f32;
            let bbox = [x1, y, x1 + 60.0, y + 150.0];
            rows.push(Array1::from(vec![
                bbox[0],
                bbox[1],
                bbox[2],
                bbox[3],
                rng.gen_range(0.96..1.0),
            ]));
            poses.push(synthetic_pose(&bbox, rng));
        }
        // A spurious low-confidence detection the filter drops
        if f % 3 == 0 {
            rows.push(Array1::from(vec![500.0, 20.0, 540.0, 60.0, 0.3]));
            poses.push(Array2::zeros((17, 3)));
        }

        let mut boxes = Array2::zeros((rows.len(), 5));
        for (i, row) in rows.iter().enumerate() {
            boxes.row_mut(i).assign(row);
        }
        frames.push(Frame::new(f, boxes, poses)?.with_size(640, 480));
    }
    Ok(frames)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut rng = StdRng::seed_from_u64(42);
    let frames = build_frames(&mut rng)?;

    let config = TrackerConfig {
        distance_metric_weights: vec![1.0, 0.0, 0.5],
        ..TrackerConfig::default()
    };
    log::info!("Config: {}", serde_json::to_string(&config)?);

    let tracker = SequenceTracker::new(config, Collaborators::default())?;
    let report = tracker.run(frames)?;

    for (frame, tracks) in report.frames.iter().zip(&report.tracks) {
        println!("Frame {:>2}: tracks {:?}", frame.index, tracks);
    }
    println!(
        "\n{} distinct tracks, {} id wraps",
        report.num_tracks(),
        report.wrap_events.len()
    );

    Ok(())
}
