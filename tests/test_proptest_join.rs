//! Property-based tests for the join portfolio.

use shared::*;

use proptest::prelude::*;
use sjoin::config::Traversal;
use sjoin::geometry::Vertex;
use sjoin::objects::SpatialObject;

prop_compose! {
    fn arb_point()(x in 0.0f32..10.0, y in 0.0f32..10.0, z in 0.0f32..10.0) -> SpatialObject {
        SpatialObject::Point(Vertex::new(x, y, z))
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_every_algorithm_matches_nested_loop(
        objects_a in prop::collection::vec(arb_point(), 0..40),
        objects_b in prop::collection::vec(arb_point(), 0..40),
        epsilon in 0.0f64..2.0,
    ) {
        let expected = pair_set(&run_join(
            nl_config(epsilon),
            objects_a.clone(),
            objects_b.clone(),
        ));
        for (name, config) in portfolio(epsilon) {
            let summary = run_join(config, objects_a.clone(), objects_b.clone());
            prop_assert_eq!(
                pair_set(&summary),
                expected.clone(),
                "{} diverged from NL",
                name
            );
        }
    }

    #[test]
    fn test_produced_pairs_have_overlapping_inflated_mbrs(
        objects_a in prop::collection::vec(arb_point(), 1..30),
        objects_b in prop::collection::vec(arb_point(), 1..30),
        epsilon in 0.0f64..1.0,
    ) {
        let summary = run_join(
            touch_config(epsilon, 4, 2),
            objects_a.clone(),
            objects_b.clone(),
        );
        let radius = (epsilon / 2.0) as f32;
        for (a_id, b_id) in summary.pairs {
            let mut mbr_a = objects_a[a_id as usize].mbr();
            mbr_a.expand(radius);
            let mut mbr_b = objects_b[b_id as usize].mbr();
            mbr_b.expand(radius);
            prop_assert!(
                sjoin::geometry::Box3::overlap(&mbr_a, &mbr_b),
                "pair without inflated-MBR overlap"
            );
        }
    }

    #[test]
    fn test_results_are_unique_after_dedup(
        objects_a in prop::collection::vec(arb_point(), 0..30),
        objects_b in prop::collection::vec(arb_point(), 0..30),
    ) {
        let summary = run_join(
            touch_traversal_config(1.0, 4, 2, Traversal::BottomUp),
            objects_a,
            objects_b,
        );
        let unique = pair_set(&summary);
        prop_assert_eq!(unique.len(), summary.pairs.len(), "duplicates survived dedup");
    }
}
