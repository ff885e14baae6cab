use shared::*;

use sjoin::config::JoinConfig;
use sjoin::external_sort::{ExternalSort, ObjectCodec, SortKey};
use sjoin::objects::ObjectKind;

/// Plane sweep with a tiny sort budget spills its sort to disk and still
/// produces the in-memory result.
#[test]
fn test_plane_sweep_with_spilled_sort_matches_in_memory() {
    let objects_a = random_points(300, 8.0, 91);
    let objects_b = random_points(300, 8.0, 92);

    let in_memory = run_join(ps_config(0.2), objects_a.clone(), objects_b.clone());
    let spilled_config = JoinConfig {
        sort_budget: 16,
        ..ps_config(0.2)
    };
    let spilled = run_join(spilled_config, objects_a, objects_b);

    assert_eq!(pair_set(&in_memory), pair_set(&spilled));
    assert_eq!(in_memory.results, spilled.results);
}

/// The sorter handles a budget equal to the input size (single spilled run).
#[test]
fn test_single_run_spill() {
    let objects = random_points(64, 5.0, 93);
    let codec = ObjectCodec {
        kind: ObjectKind::Point,
        key: SortKey::Center(2),
    };
    let mut sorter = ExternalSort::new(codec, 64);
    for object in &objects {
        sorter.insert(*object).unwrap();
    }
    assert!(sorter.out_of_core());
    let sorted: Vec<_> = sorter
        .finish()
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(sorted.len(), 64);
    for pair in sorted.windows(2) {
        assert!(pair[0].center()[2] <= pair[1].center()[2]);
    }
}

/// Many tiny runs merge back into one totally ordered stream.
#[test]
fn test_many_runs_merge_in_order() {
    let objects = random_points(1000, 50.0, 94);
    let codec = ObjectCodec {
        kind: ObjectKind::Point,
        key: SortKey::MbrLow(0),
    };
    let mut sorter = ExternalSort::new(codec, 10);
    for object in &objects {
        sorter.insert(*object).unwrap();
    }
    let sorted: Vec<_> = sorter
        .finish()
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(sorted.len(), objects.len());
    for pair in sorted.windows(2) {
        assert!(pair[0].mbr().low[0] <= pair[1].mbr().low[0]);
    }
}
