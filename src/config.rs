//! ## Join Configuration
//!
//! This module defines the immutable configuration consumed by the join
//! engine: the algorithm selectors, the partition-sort order, the TOUCH tree
//! traversal, the local-grid resolution policy, and the numeric knobs
//! (epsilon, leaf size, fanout, grid resolutions).
//!
//! The integer tags accepted by the `from_tag` constructors match the
//! command-line interface of the engine.

use crate::errors::JoinError;
use std::fmt;
use std::path::PathBuf;

/// The join algorithm, either the outer algorithm or the local (per-bucket,
/// per-node) one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Nested loop over the full cross product.
    NestedLoop,
    /// Plane sweep along the x axis.
    PlaneSweep,
    /// Single spatial grid hash built over A, probed by B.
    SpatialGrid,
    /// Size-separation spatial hash (a tower of grids).
    SizeSeparation,
    /// Partition-based spatial merge (replication grid on both sides).
    Pbsm,
    /// Hierarchical TOUCH join.
    Touch,
}

impl Algorithm {
    /// Parses the numeric algorithm tag used by the CLI.
    pub fn from_tag(tag: u32) -> Result<Self, JoinError> {
        match tag {
            0 => Ok(Algorithm::NestedLoop),
            1 => Ok(Algorithm::PlaneSweep),
            2 => Ok(Algorithm::SpatialGrid),
            3 => Ok(Algorithm::SizeSeparation),
            4 => Ok(Algorithm::Pbsm),
            5 => Ok(Algorithm::Touch),
            other => Err(JoinError::config(format!("unknown algorithm tag: {other}"))),
        }
    }

    /// Short display name, used by the summary printer and the CSV log.
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::NestedLoop => "NL",
            Algorithm::PlaneSweep => "PS",
            Algorithm::SpatialGrid => "SGrid",
            Algorithm::SizeSeparation => "S3",
            Algorithm::Pbsm => "PBSM",
            Algorithm::Touch => "TOUCH",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The sort key applied to entries (and to nodes) while packing the
/// partition tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// No sorting; test mode.
    None,
    /// Hilbert value over entry centers (default).
    Hilbert,
    /// Center coordinates, x then y then z.
    CenterX,
    /// Lower-x corner of the MBR, tie-broken on the remaining axes.
    LowX,
}

impl SortOrder {
    /// Parses the numeric sort tag used by the CLI.
    pub fn from_tag(tag: u32) -> Result<Self, JoinError> {
        match tag {
            0 => Ok(SortOrder::None),
            1 => Ok(SortOrder::Hilbert),
            2 => Ok(SortOrder::CenterX),
            3 => Ok(SortOrder::LowX),
            other => Err(JoinError::config(format!("unknown sort tag: {other}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SortOrder::None => "none",
            SortOrder::Hilbert => "hilbert",
            SortOrder::CenterX => "center-x",
            SortOrder::LowX => "low-x",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The tree traversal used by the TOUCH probe phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    /// Bottom-up pathway join along the DFS ancestor stack.
    BottomUp,
    /// Top-down BFS with descendant probing (default).
    TopDown,
    /// Top-down on-demand recursion, no descent filter.
    TopDownDemand,
    /// Top-down on-demand recursion with the MBR descent filter.
    TopDownFilter,
}

impl Traversal {
    /// Parses the numeric traversal tag used by the CLI.
    pub fn from_tag(tag: u32) -> Result<Self, JoinError> {
        match tag {
            0 => Ok(Traversal::BottomUp),
            1 => Ok(Traversal::TopDown),
            2 => Ok(Traversal::TopDownDemand),
            3 => Ok(Traversal::TopDownFilter),
            other => Err(JoinError::config(format!("unknown traversal tag: {other}"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Traversal::BottomUp => "BU",
            Traversal::TopDown => "TD",
            Traversal::TopDownDemand => "TDD",
            Traversal::TopDownFilter => "TDF",
        }
    }
}

impl fmt::Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolution policy of the per-node local grids built inside TOUCH nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridPolicy {
    /// Fixed number of cells per axis over the node subspace.
    Static,
    /// Cubic cells sized by the cube root of the mean entry volume.
    DynamicEqual,
    /// Per-axis cell widths from the mean entry extent on that axis.
    DynamicFlex,
}

impl GridPolicy {
    /// Parses the numeric resolution-policy tag used by the CLI.
    pub fn from_tag(tag: u32) -> Result<Self, JoinError> {
        match tag {
            0 => Ok(GridPolicy::Static),
            1 => Ok(GridPolicy::DynamicEqual),
            2 => Ok(GridPolicy::DynamicFlex),
            other => Err(JoinError::config(format!(
                "unknown grid resolution tag: {other}"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GridPolicy::Static => "static",
            GridPolicy::DynamicEqual => "dynamic-equal",
            GridPolicy::DynamicFlex => "dynamic-flex",
        }
    }
}

impl fmt::Display for GridPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The object-level refinement predicate applied to candidate pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Refinement {
    /// Closed-interval overlap of the two cached inflated MBRs (default).
    #[default]
    MbrOverlap,
    /// Corner containment either way, or corner-to-MBR proximity below
    /// epsilon.
    CornerProximity,
}

/// Immutable configuration of one join run.
///
/// Defaults mirror the engine's CLI defaults: nested loop inside and out,
/// epsilon 0.5, Hilbert leaf sort, top-down traversal, dynamic-flex local
/// grids, leaf size 100, fanout 2.
#[derive(Debug, Clone)]
pub struct JoinConfig {
    /// Outer join algorithm.
    pub algorithm: Algorithm,
    /// Local (per-bucket, per-node) join algorithm.
    pub local_join: Algorithm,
    /// Proximity threshold; entry MBRs are inflated by `epsilon / 2` at load.
    pub epsilon: f64,
    /// Partition-tree sort order.
    pub sort: SortOrder,
    /// TOUCH probe traversal.
    pub traversal: Traversal,
    /// Local-grid resolution policy.
    pub grid_policy: GridPolicy,
    /// Pair refinement predicate.
    pub refinement: Refinement,
    /// Maximum number of entries per leaf of the partition tree.
    pub leaf_size: usize,
    /// Number of children per non-leaf node.
    pub fanout: usize,
    /// Cells per axis of static local grids inside TOUCH nodes.
    pub local_cells: usize,
    /// Cells per axis for SGrid and PBSM.
    pub resolution: usize,
    /// Number of levels of the size-separation tower.
    pub s3_levels: usize,
    /// Per-axis growth factor between consecutive S3 levels.
    pub s3_base: usize,
    /// Cap on the number of records loaded from A (0 = all).
    pub limit_a: usize,
    /// Cap on the number of records loaded from B (0 = all).
    pub limit_b: usize,
    /// Maximum objects sorted in memory before the plane-sweep sort spills
    /// to disk (0 = never spill).
    pub sort_budget: usize,
    /// Print per-phase progress and the full summary block.
    pub verbose: bool,
    /// Destination of the CSV performance log, if any.
    pub log_path: Option<PathBuf>,
}

impl Default for JoinConfig {
    fn default() -> Self {
        JoinConfig {
            algorithm: Algorithm::NestedLoop,
            local_join: Algorithm::NestedLoop,
            epsilon: 0.5,
            sort: SortOrder::Hilbert,
            traversal: Traversal::TopDown,
            grid_policy: GridPolicy::DynamicFlex,
            refinement: Refinement::MbrOverlap,
            leaf_size: 100,
            fanout: 2,
            local_cells: 100,
            resolution: 100,
            s3_levels: 4,
            s3_base: 2,
            limit_a: 0,
            limit_b: 0,
            sort_budget: 0,
            verbose: false,
            log_path: None,
        }
    }
}

impl JoinConfig {
    /// Validates the numeric knobs before any data is loaded.
    pub fn validate(&self) -> Result<(), JoinError> {
        if self.epsilon < 0.0 || !self.epsilon.is_finite() {
            return Err(JoinError::config(format!(
                "epsilon must be finite and non-negative, got {}",
                self.epsilon
            )));
        }
        if self.leaf_size == 0 {
            return Err(JoinError::config("leaf size must be greater than zero"));
        }
        if self.fanout == 0 {
            return Err(JoinError::config("fanout must be greater than zero"));
        }
        if self.resolution == 0 || self.local_cells == 0 {
            return Err(JoinError::config(
                "grid resolutions must be greater than zero",
            ));
        }
        if self.s3_levels == 0 || self.s3_base < 2 {
            return Err(JoinError::config(
                "S3 needs at least one level and a base of at least 2",
            ));
        }
        Ok(())
    }

    /// Composite algorithm name, e.g. `TOUCH:TD`, used by logs and reports.
    pub fn algorithm_name(&self) -> String {
        match self.algorithm {
            Algorithm::Touch => format!("{}:{}", self.algorithm.name(), self.traversal.name()),
            other => other.name().to_string(),
        }
    }
}
