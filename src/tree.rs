//! ## Partition Tree
//!
//! The hierarchical space decomposition TOUCH is built on: a balanced tree
//! packed bottom-up over the A-side entries. Leaves hold up to `leaf_size`
//! entries; upper levels group `fanout` children after re-sorting node
//! centers with the same key. Nodes live in one arena and refer to their
//! children by [`NodeId`]; there are no parent pointers.

use crate::entry::{EntryId, TreeEntry};
use crate::geometry::{Box3, DIMENSION};
use crate::grid::GridHash;
use crate::hilbert::hilbert_key;
use crate::config::SortOrder;
use crate::engine::JoinStats;
use ordered_float::OrderedFloat;
use std::time::Instant;
use tracing::{debug, info};

/// Index of a node in the tree arena.
pub type NodeId = usize;

/// Number of entry sides (A and B).
pub const SIDES: usize = 2;

/// One vertex of the partition tree.
#[derive(Debug)]
pub struct TreeNode {
    /// 0 for leaves, increasing toward the root.
    pub level: u32,
    pub is_root: bool,
    pub children: Vec<NodeId>,
    /// Union of the MBRs of all build-time descendants.
    pub mbr: Box3,
    /// Entries assigned to this node (not pushed further down), per side.
    pub attached: [Vec<EntryId>; SIDES],
    /// Deferred-obligation bucket used by the top-down-demand traversal.
    pub attached_ans: [Vec<EntryId>; SIDES],
    /// Union of `attached[t]` MBRs only; prunes node-local joins.
    pub mbr_self: [Box3; SIDES],
    /// Union of `attached[t]` and `attached_ans[t]` MBRs.
    pub mbr_light: [Box3; SIDES],
    /// Union of `attached_ans[t]` MBRs only.
    pub mbr_dark: [Box3; SIDES],
    /// Side-t union over the whole subtree, filled by the analysis pass.
    pub mbr_combined: [Box3; SIDES],
    /// Optional local grid over `attached[t]`.
    pub local_grid: [Option<GridHash>; SIDES],
    /// Count of side-t entries in this subtree, own attachments included.
    pub obj_below: [u64; SIDES],
    /// Per-axis extent sums of the entries attached here (incl. ans).
    pub size_sum: [[f64; DIMENSION]; SIDES],
    /// Per-axis squared extent sums.
    pub size_sq_sum: [[f64; DIMENSION]; SIDES],
    /// Volume sums of the entries attached here (incl. ans).
    pub vol_sum: [f64; SIDES],
}

impl TreeNode {
    pub fn new(level: u32) -> Self {
        TreeNode {
            level,
            is_root: false,
            children: Vec::new(),
            mbr: Box3::empty(),
            attached: [Vec::new(), Vec::new()],
            attached_ans: [Vec::new(), Vec::new()],
            mbr_self: [Box3::empty(); SIDES],
            mbr_light: [Box3::empty(); SIDES],
            mbr_dark: [Box3::empty(); SIDES],
            mbr_combined: [Box3::empty(); SIDES],
            local_grid: [None, None],
            obj_below: [0; SIDES],
            size_sum: [[0.0; DIMENSION]; SIDES],
            size_sq_sum: [[0.0; DIMENSION]; SIDES],
            vol_sum: [0.0; SIDES],
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Attaches an entry to this node and folds its MBR into the self and
    /// light aggregates.
    pub fn attach(&mut self, side: usize, id: EntryId, entries: &[TreeEntry]) {
        let mbr = entries[id].mbr;
        self.attached[side].push(id);
        self.mbr_self[side].expand_to(&mbr);
        self.mbr_light[side].expand_to(&mbr);
    }

    /// Attaches an entry to the deferred bucket, folding its MBR into the
    /// dark and light aggregates.
    pub fn attach_deferred(&mut self, side: usize, id: EntryId, entries: &[TreeEntry]) {
        let mbr = entries[id].mbr;
        self.attached_ans[side].push(id);
        self.mbr_dark[side].expand_to(&mbr);
        self.mbr_light[side].expand_to(&mbr);
    }

    /// Entries stored at this node on one side, both buckets.
    pub fn stored(&self, side: usize) -> usize {
        self.attached[side].len() + self.attached_ans[side].len()
    }
}

/// The packed tree: node arena plus root and level count.
#[derive(Debug)]
pub struct PartitionTree {
    pub nodes: Vec<TreeNode>,
    pub root: NodeId,
    /// Number of levels; 1 for a single-leaf tree.
    pub levels: u32,
}

impl PartitionTree {
    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn total_nodes(&self) -> usize {
        self.nodes.len()
    }
}

type Key = (u64, [OrderedFloat<f64>; DIMENSION]);

fn center_key(center: &crate::geometry::Vertex) -> [OrderedFloat<f64>; DIMENSION] {
    [
        OrderedFloat(center[0] as f64),
        OrderedFloat(center[1] as f64),
        OrderedFloat(center[2] as f64),
    ]
}

/// Sort key of one MBR under the configured order. The Hilbert key carries
/// the center tuple as a tie break; the other orders leave the curve slot 0.
fn sort_value(mbr: &Box3, order: SortOrder, reference: &Box3) -> Key {
    match order {
        SortOrder::None => (0, [OrderedFloat(0.0); DIMENSION]),
        SortOrder::Hilbert => {
            let center = mbr.center();
            (hilbert_key(&center, reference), center_key(&center))
        }
        SortOrder::CenterX => (0, center_key(&mbr.center())),
        SortOrder::LowX => (0, center_key(&mbr.low)),
    }
}

/// Builds the partition tree over the A-side entries.
///
/// Empty input yields a single empty leaf root. With `fanout = 1` the packer
/// clamps the effective group size to 2 above the leaves; a chain that never
/// shrinks the level could not terminate.
pub fn build_tree(
    entries: &[TreeEntry],
    ids: &[EntryId],
    order: SortOrder,
    leaf_size: usize,
    fanout: usize,
    stats: &mut JoinStats,
) -> PartitionTree {
    debug_assert!(leaf_size > 0 && fanout > 0);
    let partition_start = Instant::now();

    let mut nodes: Vec<TreeNode> = Vec::new();

    if ids.is_empty() {
        let mut root = TreeNode::new(0);
        root.is_root = true;
        nodes.push(root);
        stats.partition += partition_start.elapsed();
        stats.levels = 1;
        stats.total_nodes = 1;
        return PartitionTree {
            nodes,
            root: 0,
            levels: 1,
        };
    }

    // Reference box for the Hilbert curve: the bounding box of the input.
    let mut reference = Box3::empty();
    for &id in ids {
        reference.expand_to(&entries[id].mbr);
    }

    // Leaf sort.
    let sort_start = Instant::now();
    let mut sorted: Vec<EntryId> = ids.to_vec();
    if order != SortOrder::None {
        sorted.sort_by_key(|&id| sort_value(&entries[id].mbr, order, &reference));
    }
    stats.sorting += sort_start.elapsed();
    debug!("Sorted {} leaf entries ({})", sorted.len(), order);

    // Leaf pack.
    let mut current: Vec<NodeId> = Vec::new();
    for chunk in sorted.chunks(leaf_size) {
        let mut leaf = TreeNode::new(0);
        for &id in chunk {
            leaf.attach(0, id, entries);
        }
        leaf.mbr = leaf.mbr_self[0];
        current.push(nodes.len());
        nodes.push(leaf);
    }

    // Upper-level pack.
    let mut levels = 1;
    while current.len() > 1 {
        let sort_start = Instant::now();
        if order != SortOrder::None {
            current.sort_by_key(|&n| sort_value(&nodes[n].mbr, order, &reference));
        }
        stats.sorting += sort_start.elapsed();

        let group = if fanout > 1 { fanout } else { 2 };
        let mut next: Vec<NodeId> = Vec::new();
        for chunk in current.chunks(group) {
            let mut parent = TreeNode::new(levels);
            for &child in chunk {
                parent.mbr = Box3::union_safe(&parent.mbr, &nodes[child].mbr);
                parent.children.push(child);
            }
            next.push(nodes.len());
            nodes.push(parent);
        }
        debug!(
            "Packed tree level {}: {} nodes from {} children",
            levels,
            next.len(),
            current.len()
        );
        current = next;
        levels += 1;
    }

    let root = current[0];
    nodes[root].is_root = true;
    stats.partition += partition_start.elapsed();
    stats.levels = levels;
    stats.total_nodes = nodes.len() as u64;
    info!(
        "Partition tree built: {} nodes, {} levels, {} entries",
        nodes.len(),
        levels,
        ids.len()
    );

    PartitionTree { nodes, root, levels }
}
