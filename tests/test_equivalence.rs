use shared::*;

use sjoin::config::{JoinConfig, SortOrder, Traversal};

/// Empty input on either side yields zero results and zero duplicates for
/// every algorithm.
#[test]
fn test_empty_sides() {
    let some = points(&[(1.0, 1.0, 1.0), (2.0, 2.0, 2.0)]);
    for (name, config) in portfolio(0.5) {
        let summary = run_join(config.clone(), Vec::new(), some.clone());
        assert_eq!(summary.results, 0, "{name} with empty A");
        assert_eq!(summary.duplicates, 0, "{name} with empty A");

        let summary = run_join(config.clone(), some.clone(), Vec::new());
        assert_eq!(summary.results, 0, "{name} with empty B");

        let summary = run_join(config, Vec::new(), Vec::new());
        assert_eq!(summary.results, 0, "{name} with both sides empty");
    }
}

/// All objects at the same location: the full cross product joins, and the
/// de-duplicated count is exactly |A| times |B|.
#[test]
fn test_coincident_objects_full_cross_product() {
    let objects_a = points(&[(3.0, 3.0, 3.0); 7]);
    let objects_b = points(&[(3.0, 3.0, 3.0); 5]);
    for (name, config) in portfolio(0.5) {
        let summary = run_join(config, objects_a.clone(), objects_b.clone());
        assert_eq!(summary.results, 35, "{name} cross product size");
    }
}

/// A leaf size larger than |A| degenerates TOUCH to a single-node tree; the
/// result still equals the nested loop.
#[test]
fn test_touch_single_node_tree_matches_nl() {
    let objects_a = random_points(50, 5.0, 7);
    let objects_b = random_points(80, 5.0, 8);
    let expected = pair_set(&run_join(
        nl_config(0.3),
        objects_a.clone(),
        objects_b.clone(),
    ));

    for traversal in [
        Traversal::TopDown,
        Traversal::BottomUp,
        Traversal::TopDownDemand,
        Traversal::TopDownFilter,
    ] {
        let config = touch_traversal_config(0.3, 1000, 4, traversal);
        let summary = run_join(config, objects_a.clone(), objects_b.clone());
        assert_eq!(
            pair_set(&summary),
            expected,
            "single-node TOUCH:{} diverged",
            traversal.name()
        );
    }
}

/// Fanout 1 is the pathological chain case; the builder must terminate and
/// the result must equal the nested loop.
#[test]
fn test_touch_fanout_one_matches_nl() {
    let objects_a = random_points(40, 5.0, 17);
    let objects_b = random_points(40, 5.0, 18);
    let expected = pair_set(&run_join(
        nl_config(0.4),
        objects_a.clone(),
        objects_b.clone(),
    ));

    let config = touch_traversal_config(0.4, 2, 1, Traversal::TopDown);
    let summary = run_join(config, objects_a.clone(), objects_b.clone());
    assert_eq!(pair_set(&summary), expected);
}

/// Every sort order builds a tree that joins the same pair set.
#[test]
fn test_touch_sort_orders_agree() {
    let objects_a = random_points(200, 8.0, 21);
    let objects_b = random_points(200, 8.0, 22);
    let expected = pair_set(&run_join(
        nl_config(0.2),
        objects_a.clone(),
        objects_b.clone(),
    ));

    for order in [
        SortOrder::None,
        SortOrder::Hilbert,
        SortOrder::CenterX,
        SortOrder::LowX,
    ] {
        let config = JoinConfig {
            sort: order,
            ..touch_config(0.2, 8, 3)
        };
        let summary = run_join(config, objects_a.clone(), objects_b.clone());
        assert_eq!(
            pair_set(&summary),
            expected,
            "sort order {} diverged",
            order.name()
        );
    }
}

/// Asymmetric cardinalities (the TOUCH design point): a small indexed side
/// against a large probe side.
#[test]
fn test_asymmetric_cardinalities() {
    let objects_a = random_points(30, 6.0, 31);
    let objects_b = random_points(600, 6.0, 32);
    let expected = pair_set(&run_join(
        nl_config(0.25),
        objects_a.clone(),
        objects_b.clone(),
    ));
    assert!(!expected.is_empty());

    for (name, config) in portfolio(0.25) {
        let summary = run_join(config, objects_a.clone(), objects_b.clone());
        assert_eq!(pair_set(&summary), expected, "{name} diverged");
    }
}

/// Every produced pair keeps the canonical orientation: the first id refers
/// to an A entry, the second to a B entry.
#[test]
fn test_pairs_are_canonically_oriented() {
    let objects_a = random_points(25, 4.0, 41);
    let objects_b = random_points(25, 4.0, 42);
    for (name, config) in portfolio(0.5) {
        let summary = run_join(config, objects_a.clone(), objects_b.clone());
        for &(a_id, b_id) in &summary.pairs {
            assert!((a_id as usize) < objects_a.len(), "{name}: bad A id");
            assert!((b_id as usize) < objects_b.len(), "{name}: bad B id");
        }
    }
}

/// Re-running the same engine configuration over the same data gives the
/// same deterministic pair order.
#[test]
fn test_post_dedup_order_is_deterministic() {
    let objects_a = random_points(60, 5.0, 51);
    let objects_b = random_points(60, 5.0, 52);
    let first = run_join(pbsm_config(0.3, 6), objects_a.clone(), objects_b.clone());
    let second = run_join(pbsm_config(0.3, 6), objects_a, objects_b);
    assert_eq!(first.pairs, second.pairs);
}

/// Replication-based algorithms report the duplicates their grids produced;
/// the de-duplicated results stay correct.
#[test]
fn test_pbsm_counts_duplicates() {
    // Inflated MBRs span several cells of the 8x8x8 grid, so both sides
    // replicate and cell-by-cell joins repeat pairs.
    let objects_a = random_points(50, 2.0, 61);
    let objects_b = random_points(50, 2.0, 62);
    let summary = run_join(pbsm_config(1.0, 8), objects_a.clone(), objects_b.clone());
    assert!(summary.duplicates > 0, "replication should repeat pairs");

    let expected = pair_set(&run_join(nl_config(1.0), objects_a, objects_b));
    assert_eq!(pair_set(&summary), expected);
}
