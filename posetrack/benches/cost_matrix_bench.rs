//! Benchmarks for cost matrix construction and full sequence passes

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use posetrack::{Collaborators, CostMatrixBuilder, Frame, SequenceTracker, Skeleton, TrackerConfig};
use rand::prelude::*;
use std::hint::black_box;

fn create_test_frame(rng: &mut StdRng, index: usize, n_detections: usize) -> Frame {
    let mut boxes = Array2::zeros((n_detections, 5));
    let mut poses = Vec::with_capacity(n_detections);
    for i in 0..n_detections {
        let x = rng.gen_range(0.0..1800.0f32);
        let y = rng.gen_range(0.0..900.0f32);
        let (w, h) = (rng.gen_range(40.0..120.0f32), rng.gen_range(100.0..300.0f32));
        boxes
            .row_mut(i)
            .assign(&ndarray::arr1(&[x, y, x + w, y + h, 0.99]));
        poses.push(Array2::from_shape_fn((17, 3), |(_, c)| match c {
            0 => x + rng.gen_range(0.0..w),
            1 => y + rng.gen_range(0.0..h),
            _ => 1.0,
        }));
    }
    Frame::new(index, boxes, poses).unwrap()
}

/// Detections drifting a few pixels per frame
fn create_test_sequence(n_detections: usize, n_frames: usize) -> Vec<Frame> {
    (0..n_frames)
        .map(|frame| {
            let mut data = Vec::with_capacity(n_detections * 5);
            for i in 0..n_detections {
                let x = (frame * 3 + i * 60) as f32;
                let y = (frame * 2 + i * 30) as f32;
                data.extend(&[x, y, x + 50.0, y + 120.0, 0.99]);
            }
            let boxes = Array2::from_shape_vec((n_detections, 5), data).unwrap();
            Frame::new(frame, boxes, vec![Array2::ones((17, 3)); n_detections]).unwrap()
        })
        .collect()
}

fn bench_cost_matrix(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let skeleton = Skeleton::posetrack();
    let mut group = c.benchmark_group("cost_matrix");

    for &n in &[5usize, 20, 50] {
        let prev = create_test_frame(&mut rng, 0, n);
        let cur = create_test_frame(&mut rng, 1, n);

        let bbox_only =
            CostMatrixBuilder::new(&["bbox-overlap"], &[1.0], &skeleton, 0.5, None).unwrap();
        group.bench_with_input(BenchmarkId::new("bbox_overlap", n), &n, |b, _| {
            b.iter(|| bbox_only.build(black_box(&prev), black_box(&cur)).unwrap())
        });

        let with_pose = CostMatrixBuilder::new(
            &["bbox-overlap", "pose-pck"],
            &[1.0, 1.0],
            &skeleton,
            0.5,
            None,
        )
        .unwrap();
        group.bench_with_input(BenchmarkId::new("bbox_overlap_pose_pck", n), &n, |b, _| {
            b.iter(|| with_pose.build(black_box(&prev), black_box(&cur)).unwrap())
        });
    }
    group.finish();
}

fn bench_sequence(c: &mut Criterion) {
    let frames = create_test_sequence(20, 30);
    let tracker = SequenceTracker::new(TrackerConfig::default(), Collaborators::default()).unwrap();

    c.bench_function("sequence_20_detections_30_frames", |b| {
        b.iter_batched(
            || frames.clone(),
            |frames| tracker.run(black_box(frames)).unwrap(),
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_cost_matrix, bench_sequence);
criterion_main!(benches);
