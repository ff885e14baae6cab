//! ## TOUCH Hierarchical Join
//!
//! The hierarchical spatial hash join: a partition tree is built over the
//! A side, every B entry is assigned to the deepest node whose children
//! cannot separate it, and the probe phase enumerates ancestor-descendant
//! candidate pairs with one of three traversal strategies (top-down BFS,
//! bottom-up pathway, top-down on-demand with or without a descent filter).
//! Per-node local joins run either as nested loops or against the node's
//! adaptive local grid.

use crate::config::{Algorithm, GridPolicy, Traversal};
use crate::engine::JoinContext;
use crate::entry::EntryId;
use crate::geometry::{Box3, DIMENSION};
use crate::grid::{dynamic_equal_grid, dynamic_flex_grid, static_grid};
use crate::tree::{NodeId, PartitionTree, SIDES};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, info};

/// The TOUCH engine state: the partition tree plus the probe knobs.
pub struct TouchJoin {
    pub tree: PartitionTree,
    pub traversal: Traversal,
    pub local_join: Algorithm,
    pub grid_policy: GridPolicy,
    pub local_cells: usize,
}

impl TouchJoin {
    pub fn new(
        tree: PartitionTree,
        traversal: Traversal,
        local_join: Algorithm,
        grid_policy: GridPolicy,
        local_cells: usize,
    ) -> Self {
        TouchJoin {
            tree,
            traversal,
            local_join,
            grid_policy,
            local_cells,
        }
    }

    fn use_grid(&self) -> bool {
        self.local_join == Algorithm::SpatialGrid
    }

    /// Assigns every B entry to the deepest node whose overlapping children
    /// do not uniquely cover it. Entries overlapping no child anywhere are
    /// filtered.
    pub fn assign(&mut self, ds_b: &[EntryId], ctx: &mut JoinContext<'_>) {
        let start = Instant::now();
        for &obj in ds_b {
            let mbr = ctx.entries[obj].mbr;
            let mut current = self.tree.root;

            if self.tree.node(current).is_leaf() {
                // Single-node tree: the root takes everything it overlaps.
                if Box3::overlap(&mbr, &self.tree.node(current).mbr) {
                    self.tree.nodes[current].attach(1, obj, ctx.entries);
                } else {
                    ctx.stats.filtered[1] += 1;
                }
                continue;
            }

            loop {
                let node = self.tree.node(current);
                let mut overlapping = None;
                let mut count = 0;
                for &child in &node.children {
                    if Box3::overlap(&mbr, &self.tree.node(child).mbr) {
                        count += 1;
                        if count == 1 {
                            overlapping = Some(child);
                        } else {
                            break;
                        }
                    }
                }
                match count {
                    0 => {
                        ctx.stats.filtered[1] += 1;
                        break;
                    }
                    1 => {
                        let next = match overlapping {
                            Some(child) => child,
                            None => unreachable!("one overlapping child was counted"),
                        };
                        if self.tree.node(next).is_leaf() {
                            self.tree.nodes[next].attach(1, obj, ctx.entries);
                            break;
                        }
                        current = next;
                    }
                    _ => {
                        self.tree.nodes[current].attach(1, obj, ctx.entries);
                        break;
                    }
                }
            }
        }
        ctx.stats.building += start.elapsed();
        info!(
            "Assigned {} B entries ({} filtered)",
            ds_b.len(),
            ctx.stats.filtered[1]
        );
    }

    /// Post-assignment analysis: subtree counts and combined MBRs, entry
    /// size statistics, and the per-level reporting aggregates.
    ///
    /// Children were packed before their parents, so a single forward pass
    /// over the arena sees every child before its parent.
    pub fn analyze(&mut self, ctx: &mut JoinContext<'_>) {
        let start = Instant::now();

        for index in 0..self.tree.nodes.len() {
            // Subtree counts and reach boxes from the already-final children.
            let mut obj_below = [0u64; SIDES];
            let mut combined = [Box3::empty(); SIDES];
            for child_pos in 0..self.tree.nodes[index].children.len() {
                let child = self.tree.nodes[index].children[child_pos];
                debug_assert!(child < index);
                for t in 0..SIDES {
                    obj_below[t] += self.tree.nodes[child].obj_below[t];
                    combined[t] =
                        Box3::union_safe(&combined[t], &self.tree.nodes[child].mbr_combined[t]);
                }
            }
            let node = &mut self.tree.nodes[index];
            for t in 0..SIDES {
                node.obj_below[t] = obj_below[t] + node.stored(t) as u64;
                node.mbr_combined[t] = Box3::union_safe(&combined[t], &node.mbr_light[t]);
            }

            // Entry size statistics over both buckets.
            for t in 0..SIDES {
                let mut size_sum = [0.0; DIMENSION];
                let mut size_sq_sum = [0.0; DIMENSION];
                let mut vol_sum = 0.0;
                for &id in node.attached[t].iter().chain(node.attached_ans[t].iter()) {
                    let mbr = &ctx.entries[id].mbr;
                    for axis in 0..DIMENSION {
                        let extent = mbr.length(axis) as f64;
                        size_sum[axis] += extent;
                        size_sq_sum[axis] += extent * extent;
                    }
                    vol_sum += mbr.volume();
                }
                node.size_sum[t] = size_sum;
                node.size_sq_sum[t] = size_sq_sum;
                node.vol_sum[t] = vol_sum;
            }
        }

        // Reporting aggregates: per-level assignment counts and mean entry
        // sizes for the first ten levels, plus occupancy over all nodes.
        let mut level_size_sum = [[0.0f64; 10]; SIDES];
        let mut level_size_sq = [[0.0f64; 10]; SIDES];
        let mut occupied_sum = 0u64;
        let mut occupied_sq_sum = 0u64;
        let mut empty_nodes = 0u64;
        for node in &self.tree.nodes {
            let stored_total = (node.stored(0) + node.stored(1)) as u64;
            occupied_sum += stored_total;
            occupied_sq_sum += stored_total * stored_total;
            if stored_total == 0 {
                empty_nodes += 1;
            }
            ctx.stats.max_mapped = ctx.stats.max_mapped.max(stored_total);

            let level = node.level as usize;
            if level >= 10 {
                continue;
            }
            for t in 0..SIDES {
                ctx.stats.level_assigned[t][level] += node.attached[t].len() as u64;
                ctx.stats.level_assigned_ans[t][level] += node.attached_ans[t].len() as u64;
                level_size_sum[t][level] +=
                    node.size_sum[t].iter().sum::<f64>() / DIMENSION as f64;
                level_size_sq[t][level] +=
                    node.size_sq_sum[t].iter().sum::<f64>() / DIMENSION as f64;
            }
        }
        for t in 0..SIDES {
            for level in 0..10 {
                let assigned =
                    ctx.stats.level_assigned[t][level] + ctx.stats.level_assigned_ans[t][level];
                if assigned > 0 {
                    let avg = level_size_sum[t][level] / assigned as f64;
                    ctx.stats.level_avg[t][level] = avg;
                    ctx.stats.level_std[t][level] =
                        (level_size_sq[t][level] / assigned as f64 - avg * avg).max(0.0).sqrt();
                }
            }
        }
        let node_count = self.tree.nodes.len() as f64;
        ctx.stats.avg_per_cell = occupied_sum as f64 / (SIDES as f64 * node_count);
        ctx.stats.percentage_empty = empty_nodes as f64 / node_count * 100.0;
        ctx.stats.std_per_cell = (occupied_sq_sum as f64 / (SIDES as f64 * node_count)
            - ctx.stats.avg_per_cell * ctx.stats.avg_per_cell)
            .max(0.0)
            .sqrt();

        ctx.stats.analyzing += start.elapsed();
        debug!("Analysis pass complete over {} nodes", self.tree.nodes.len());
    }

    /// Builds the per-node local grids over `attached[t]` when the local
    /// join runs on grids. Resolution follows the configured policy and the
    /// node's entry-size statistics.
    pub fn build_local_grids(&mut self, ctx: &mut JoinContext<'_>) {
        if !self.use_grid() {
            return;
        }
        let start = Instant::now();
        let mut built = 0usize;
        for node in self.tree.nodes.iter_mut() {
            for t in 0..SIDES {
                if node.attached[t].is_empty() {
                    continue;
                }
                let universe = node.mbr_self[t];
                let stored = node.stored(t) as f64;
                let mut grid = match self.grid_policy {
                    GridPolicy::Static => static_grid(universe, self.local_cells),
                    GridPolicy::DynamicEqual => {
                        dynamic_equal_grid(universe, node.vol_sum[t] / stored)
                    }
                    GridPolicy::DynamicFlex => {
                        let mut mean = [0.0; DIMENSION];
                        for axis in 0..DIMENSION {
                            mean[axis] = node.size_sum[t][axis] / stored;
                        }
                        dynamic_flex_grid(universe, mean)
                    }
                };
                grid.build(&node.attached[t], ctx.entries);
                node.local_grid[t] = Some(grid);
                built += 1;
            }
        }
        ctx.stats.grid_build += start.elapsed();
        debug!("Built {built} local grids");
    }

    /// Runs the probe phase with the configured traversal.
    pub fn probe(&self, ctx: &mut JoinContext<'_>) {
        let start = Instant::now();
        match self.traversal {
            Traversal::TopDown => self.probe_top_down(ctx),
            Traversal::BottomUp => {
                let mut path = Vec::new();
                self.pathway_join(self.tree.root, &mut path, ctx);
            }
            Traversal::TopDownDemand => self.pathway_join_down(self.tree.root, false, ctx),
            Traversal::TopDownFilter => self.pathway_join_down(self.tree.root, true, ctx),
        }
        ctx.stats.probing += start.elapsed();
    }

    // --- top-down (TD) ---

    fn probe_top_down(&self, ctx: &mut JoinContext<'_>) {
        let mut queue = VecDeque::new();
        queue.push_back(self.tree.root);
        while let Some(current) = queue.pop_front() {
            let node = self.tree.node(current);
            for &child in &node.children {
                queue.push_back(child);
            }
            if node.stored(0) + node.stored(1) == 0 {
                continue;
            }
            self.join_node_to_desc(current, ctx);
        }
    }

    /// Joins everything attached at `ancestor` against the attached sets of
    /// its descendants, then the two sides attached at the node itself.
    fn join_node_to_desc(&self, ancestor: NodeId, ctx: &mut JoinContext<'_>) {
        let node = self.tree.node(ancestor);

        for &obj in &node.attached[0] {
            self.join_object_to_desc(obj, ancestor, ctx);
        }
        for &obj in &node.attached[1] {
            self.join_object_to_desc(obj, ancestor, ctx);
        }

        // Intra-node cross set; the smaller side drives.
        let drive = if node.attached[0].len() < node.attached[1].len() {
            0
        } else {
            1
        };
        let other = 1 - drive;
        if node.attached[drive].is_empty() || node.attached[other].is_empty() {
            return;
        }
        if let (true, Some(grid)) = (self.use_grid(), node.local_grid[drive].as_ref()) {
            ctx.probe_grid_list(grid, &node.attached[other]);
        } else {
            for &obj in &node.attached[drive] {
                ctx.stats.items_max_compared += node.attached[other].len() as u64;
                if Box3::overlap(&ctx.entries[obj].mbr, &node.mbr_self[other]) {
                    ctx.nested_loop_one(obj, &node.attached[other]);
                }
            }
        }
    }

    /// Walks the subtree under `ancestor`, joining `obj` against every
    /// child's opposite attached set and descending only into children whose
    /// MBR overlaps the object.
    fn join_object_to_desc(&self, obj: EntryId, ancestor: NodeId, ctx: &mut JoinContext<'_>) {
        let opp = ctx.entries[obj].side.opposite().index();
        let mbr = ctx.entries[obj].mbr;

        let mut queue = VecDeque::new();
        queue.push_back(ancestor);
        while let Some(current) = queue.pop_front() {
            let node = self.tree.node(current);
            if node.is_leaf() {
                continue;
            }
            for &child_id in &node.children {
                let child = self.tree.node(child_id);
                ctx.stats.items_max_compared += child.attached[opp].len() as u64;
                if let (true, Some(grid)) = (self.use_grid(), child.local_grid[opp].as_ref()) {
                    ctx.probe_grid(grid, obj);
                } else {
                    ctx.nested_loop_one(obj, &child.attached[opp]);
                }
                if Box3::overlap(&mbr, &child.mbr) {
                    queue.push_back(child_id);
                } else {
                    ctx.stats.add_filter += child.obj_below[opp];
                }
            }
        }
    }

    // --- bottom-up pathway (BU) ---

    /// Post-order recursion; on the way back up, the node joins against
    /// every ancestor on the current path, itself included.
    fn pathway_join(&self, node: NodeId, path: &mut Vec<NodeId>, ctx: &mut JoinContext<'_>) {
        path.push(node);
        for &child in &self.tree.node(node).children {
            self.pathway_join(child, path, ctx);
        }
        for index in 0..path.len() {
            self.join_pair(node, path[index], ctx);
        }
        path.pop();
    }

    /// The `JOIN` primitive: both attached buckets of `node` against both
    /// attached buckets of the ancestor. At the self node the smaller side
    /// drives and each type-0 entry meets each opposite type-1 entry once.
    fn join_pair(&self, node_id: NodeId, ancestor_id: NodeId, ctx: &mut JoinContext<'_>) {
        if node_id == ancestor_id {
            self.join_self(node_id, ctx);
            return;
        }
        let node = self.tree.node(node_id);
        let ancestor = self.tree.node(ancestor_id);
        for t in 0..SIDES {
            let opp = 1 - t;
            let targets = &ancestor.attached[opp];
            if targets.is_empty() {
                continue;
            }
            ctx.stats.items_max_compared += node.stored(t) as u64 * targets.len() as u64;
            if let (true, Some(grid)) = (self.use_grid(), node.local_grid[t].as_ref()) {
                ctx.probe_grid_list(grid, targets);
            } else {
                ctx.nested_loop(&node.attached[t], targets);
            }
            ctx.nested_loop(&node.attached_ans[t], targets);
        }
    }

    /// Self-node join shared by `JOIN` and `JOIN_down`: the side with fewer
    /// stored entries drives against the opposite attached and deferred
    /// buckets.
    fn join_self(&self, node_id: NodeId, ctx: &mut JoinContext<'_>) {
        let node = self.tree.node(node_id);
        let t = if node.stored(0) < node.stored(1) { 0 } else { 1 };
        let opp = 1 - t;
        if node.stored(t) == 0 || node.stored(opp) == 0 {
            return;
        }
        ctx.stats.items_max_compared += node.stored(t) as u64 * node.stored(opp) as u64;
        if let (true, Some(grid)) = (self.use_grid(), node.local_grid[t].as_ref()) {
            ctx.probe_grid_list(grid, &node.attached[opp]);
            ctx.probe_grid_list(grid, &node.attached_ans[opp]);
        } else {
            ctx.nested_loop(&node.attached[t], &node.attached[opp]);
            ctx.nested_loop(&node.attached[t], &node.attached_ans[opp]);
        }
        ctx.nested_loop(&node.attached_ans[t], &node.attached[opp]);
        ctx.nested_loop(&node.attached_ans[t], &node.attached_ans[opp]);
    }

    // --- top-down on-demand (TDD / TDF) ---

    /// Recursive pre-order: each node joins against its entire subtree, then
    /// the recursion continues per child.
    fn pathway_join_down(&self, node: NodeId, filter: bool, ctx: &mut JoinContext<'_>) {
        self.join_down_recursive(node, node, filter, ctx);
        for &child in &self.tree.node(node).children {
            self.pathway_join_down(child, filter, ctx);
        }
    }

    /// `JoinDownR`: joins the upper node against `descendant` and recurses
    /// over the descendant's children. With `filter` set, a child subtree is
    /// skipped when nothing stored at the upper node can reach anything
    /// stored below the child.
    fn join_down_recursive(
        &self,
        upper: NodeId,
        descendant: NodeId,
        filter: bool,
        ctx: &mut JoinContext<'_>,
    ) {
        self.join_down_pair(upper, descendant, ctx);
        let upper_reach = self.attached_box(upper);
        for &child in &self.tree.node(descendant).children {
            if filter {
                let child_reach = self.subtree_box(child);
                if !Box3::overlap(&upper_reach, &child_reach) {
                    let below = self.tree.node(child);
                    ctx.stats.add_filter += below.obj_below[0] + below.obj_below[1];
                    continue;
                }
            }
            self.join_down_recursive(upper, child, filter, ctx);
        }
    }

    /// The `JOIN_down` primitive: the upper node's attached entries against
    /// both buckets of the descendant. Deferred entries of the upper node
    /// join only at the self node.
    fn join_down_pair(&self, upper: NodeId, descendant: NodeId, ctx: &mut JoinContext<'_>) {
        if upper == descendant {
            self.join_self(upper, ctx);
            return;
        }
        let node = self.tree.node(upper);
        let desc = self.tree.node(descendant);
        for t in 0..SIDES {
            let opp = 1 - t;
            if node.attached[t].is_empty() || desc.stored(opp) == 0 {
                continue;
            }
            ctx.stats.items_max_compared +=
                node.attached[t].len() as u64 * desc.stored(opp) as u64;
            if let (true, Some(grid)) = (self.use_grid(), node.local_grid[t].as_ref()) {
                ctx.probe_grid_list(grid, &desc.attached[opp]);
                ctx.probe_grid_list(grid, &desc.attached_ans[opp]);
            } else {
                ctx.nested_loop(&node.attached[t], &desc.attached[opp]);
                ctx.nested_loop(&node.attached[t], &desc.attached_ans[opp]);
            }
        }
    }

    /// Box covering everything attached at a node, both sides and buckets.
    fn attached_box(&self, node: NodeId) -> Box3 {
        let n = self.tree.node(node);
        Box3::union_safe(&n.mbr_light[0], &n.mbr_light[1])
    }

    /// Box covering everything stored anywhere in a subtree.
    fn subtree_box(&self, node: NodeId) -> Box3 {
        let n = self.tree.node(node);
        Box3::union_safe(&n.mbr_combined[0], &n.mbr_combined[1])
    }
}
