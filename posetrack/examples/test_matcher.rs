use ndarray::Array2;
use posetrack::hungarian::{AssignmentStrategy, BipartiteMatcher};

fn main() -> anyhow::Result<()> {
    println!("Testing bipartite matcher...");

    // Rows are previous detections, columns current detections
    let cost_matrix = Array2::from_shape_vec(
        (3, 3),
        vec![
            0.1, 0.9, 1.0, // Previous detection 0 costs
            0.8, 0.2, 1.0, // Previous detection 1 costs
            1.0, 1.0, 1.0, // Previous detection 2 overlaps nothing
        ],
    )?;

    for strategy in [AssignmentStrategy::Hungarian, AssignmentStrategy::Greedy] {
        let matcher = BipartiteMatcher::new(strategy, Some(1.0));
        let result = matcher.solve(cost_matrix.view())?;

        println!("\n{} matching:", strategy);
        println!("  Assignments: {:?}", result.assignments);
        println!("  Unassigned previous: {:?}", result.unassigned_prev);
        println!("  Unassigned current: {:?}", result.unassigned_cur);
        println!("  Total cost: {:.3}", result.total_cost);
        println!("  Per column: {:?}", result.to_column_matches(3));
    }

    // More current detections than previous ones
    println!("\nTesting rectangular matrix (2x4)...");
    let wide = Array2::from_shape_fn((2, 4), |(i, j)| if i == j { 0.1 } else { 0.9 });
    let result = BipartiteMatcher::default().solve(wide.view())?;
    println!("  Assignments: {:?}", result.assignments);
    println!("  Unassigned current: {:?}", result.unassigned_cur);

    println!("\nTesting with larger matrix (100x100)...");
    let large = Array2::from_shape_fn((100, 100), |(i, j)| ((i + j) as f32 % 10.0) / 10.0);
    let start = std::time::Instant::now();
    let large_result = BipartiteMatcher::default().solve(large.view())?;
    println!(
        "  Solved in {:?}, {} assignments",
        start.elapsed(),
        large_result.assignments.len()
    );

    Ok(())
}
