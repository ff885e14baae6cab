use shared::*;

use sjoin::config::Algorithm;
use tracing::info;

/// Two coincident points join even with epsilon zero: their degenerate MBRs
/// share a point.
#[test]
fn test_two_points_zero_epsilon() {
    for (name, config) in portfolio(0.0) {
        let summary = run_join(
            config,
            points(&[(0.0, 0.0, 0.0)]),
            points(&[(0.0, 0.0, 0.0)]),
        );
        assert_eq!(summary.results, 1, "{name} missed the coincident pair");
    }
}

/// Points 0.4 apart with epsilon 1: the half-epsilon inflations overlap.
#[test]
fn test_two_points_within_epsilon() {
    for (name, config) in portfolio(1.0) {
        let summary = run_join(
            config,
            points(&[(0.0, 0.0, 0.0)]),
            points(&[(0.4, 0.0, 0.0)]),
        );
        assert_eq!(summary.results, 1, "{name} missed the near pair");
        assert_eq!(summary.pairs, vec![(0, 0)], "{name} produced wrong ids");
    }
}

/// Points 2 apart with epsilon 1: inflating each by 0.5 leaves a gap.
#[test]
fn test_two_points_beyond_epsilon() {
    for (name, config) in portfolio(1.0) {
        let summary = run_join(
            config,
            points(&[(0.0, 0.0, 0.0)]),
            points(&[(2.0, 0.0, 0.0)]),
        );
        assert_eq!(summary.results, 0, "{name} produced a spurious pair");
    }
}

/// Eight A points on the unit-cube corners against the cube center with
/// epsilon 0.9: every inflated corner MBR reaches the inflated center MBR.
#[test]
fn test_unit_cube_corners_against_center() {
    let corners: Vec<(f32, f32, f32)> = (0..8)
        .map(|i| {
            (
                (i & 1) as f32,
                (i >> 1 & 1) as f32,
                (i >> 2 & 1) as f32,
            )
        })
        .collect();
    for (name, config) in portfolio(0.9) {
        let summary = run_join(config, points(&corners), points(&[(0.5, 0.5, 0.5)]));
        assert_eq!(summary.results, 8, "{name} missed corner pairs");
    }
}

/// One thousand random points per side with a fixed seed: the de-duplicated
/// result set is identical across the whole portfolio.
#[test]
fn test_random_thousand_points_all_algorithms_agree() {
    let objects_a = random_points(1000, 10.0, 42);
    let objects_b = random_points(1000, 10.0, 1042);

    let reference = run_join(nl_config(0.1), objects_a.clone(), objects_b.clone());
    let expected = pair_set(&reference);
    info!("Reference NL result: {} pairs", expected.len());
    assert!(!expected.is_empty(), "seeded data should produce matches");

    for (name, config) in portfolio(0.1) {
        if config.algorithm == Algorithm::NestedLoop {
            continue;
        }
        let summary = run_join(config, objects_a.clone(), objects_b.clone());
        assert_eq!(
            pair_set(&summary),
            expected,
            "{name} disagrees with nested loop"
        );
    }
}

/// Two skew segments whose inflated cone MBRs overlap.
#[test]
fn test_segments_touching_on_inflation() {
    let seg_a = segment((0.0, 0.0, 0.0), (1.0, 0.0, 0.0), 0.1);
    let seg_b = segment((0.5, 0.1, 0.0), (0.5, 0.5, 0.0), 0.1);
    for (name, config) in portfolio(0.2) {
        let summary = run_join(config, vec![seg_a], vec![seg_b]);
        assert_eq!(summary.results, 1, "{name} missed the segment pair");
    }
}
