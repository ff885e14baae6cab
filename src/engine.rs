//! ## Join Engine
//!
//! The façade tying the portfolio together: it owns the entry arena, the
//! per-side id lists and universes, the result buffer and the run
//! statistics, and dispatches one join per [`JoinConfig`]. Every run ends
//! with the de-duplication pass, so the returned pair set is unique and
//! deterministically ordered.

use crate::config::{Algorithm, JoinConfig, Refinement};
use crate::dataset::read_dataset;
use crate::entry::{EntryId, Side, TreeEntry};
use crate::errors::JoinError;
use crate::geometry::{Box3, Scalar};
use crate::grid::GridHash;
use crate::objects::SpatialObject;
use crate::pairs::ResultPairs;
use crate::pbsm::pbsm_join;
use crate::s3::S3Hash;
use crate::sweep::plane_sweep;
use crate::touch::TouchJoin;
use crate::tree::build_tree;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Timers, counters and tree facts of one run. Advisory output.
#[derive(Debug, Clone, Default)]
pub struct JoinStats {
    pub data_load: Duration,
    pub initialize: Duration,
    pub sorting: Duration,
    pub building: Duration,
    pub partition: Duration,
    pub grid_build: Duration,
    pub probing: Duration,
    pub comparing: Duration,
    pub analyzing: Duration,
    pub dedup: Duration,
    pub total: Duration,

    /// Refinement-predicate evaluations.
    pub items_compared: u64,
    /// Upper bound of candidate pairs the probes enumerated.
    pub items_max_compared: u64,
    /// Grid cells visited by hash probes.
    pub hash_probes: u64,
    /// Entries filtered per side (no overlap with the probed structure).
    pub filtered: [u64; 2],
    /// Subtree entries skipped by traversal descent filters.
    pub add_filter: u64,

    pub duplicates: u64,
    pub results: u64,

    pub levels: u32,
    pub total_nodes: u64,
    pub max_mapped: u64,
    pub avg_per_cell: f64,
    pub std_per_cell: f64,
    pub percentage_empty: f64,
    pub rep_a: f64,
    pub rep_b: f64,

    /// Per-level attached counts for the first ten levels, per side.
    pub level_assigned: [[u64; 10]; 2],
    pub level_assigned_ans: [[u64; 10]; 2],
    /// Per-level mean inflated-entry extent, per side.
    pub level_avg: [[f64; 10]; 2],
    pub level_std: [[f64; 10]; 2],

    /// Virtual/resident memory sampled before the probe, in KB.
    pub mem_vm_start_kb: f64,
    pub mem_rss_start_kb: f64,
    /// Virtual/resident memory sampled after the probe, in KB.
    pub mem_vm_kb: f64,
    pub mem_rss_kb: f64,

    pub size_a: u64,
    pub size_b: u64,
}

/// Mutable probe context threaded through every algorithm: the entry arena,
/// the predicate, and the output sinks.
pub struct JoinContext<'a> {
    pub entries: &'a [TreeEntry],
    pub epsilon: f64,
    pub refinement: Refinement,
    pub stats: &'a mut JoinStats,
    pub pairs: &'a mut ResultPairs,
}

impl JoinContext<'_> {
    /// The refinement predicate over the two cached inflated MBRs.
    pub fn is_touching(&mut self, a: EntryId, b: EntryId) -> bool {
        self.stats.items_compared += 1;
        let mbr_a = &self.entries[a].mbr;
        let mbr_b = &self.entries[b].mbr;
        match self.refinement {
            Refinement::MbrOverlap => Box3::overlap(mbr_a, mbr_b),
            Refinement::CornerProximity => {
                let epsilon_sq = self.epsilon * self.epsilon;
                for corner in mbr_a.corners() {
                    if mbr_b.contains_point(&corner) {
                        return true;
                    }
                }
                for corner in mbr_b.corners() {
                    if mbr_a.contains_point(&corner) {
                        return true;
                    }
                }
                for corner in mbr_a.corners() {
                    if mbr_b.point_distance_sq(&corner) < epsilon_sq {
                        return true;
                    }
                }
                for corner in mbr_b.corners() {
                    if mbr_a.point_distance_sq(&corner) < epsilon_sq {
                        return true;
                    }
                }
                false
            }
        }
    }

    /// Refines one candidate pair and buffers it on success.
    pub fn emit_if_touching(&mut self, a: EntryId, b: EntryId) {
        if self.is_touching(a, b) {
            self.pairs.add_pair(a, b, self.entries);
        }
    }

    /// Nested loop of one entry against a list.
    pub fn nested_loop_one(&mut self, a: EntryId, others: &[EntryId]) {
        for &b in others {
            self.emit_if_touching(a, b);
        }
    }

    /// Nested loop over the full cross product of two lists.
    pub fn nested_loop(&mut self, left: &[EntryId], right: &[EntryId]) {
        for &a in left {
            self.nested_loop_one(a, right);
        }
    }

    /// Probes a grid with one entry: candidates from every overlapped cell
    /// are refined; an entry missing the grid universe counts as filtered.
    pub fn probe_grid(&mut self, grid: &GridHash, obj: EntryId) {
        let mbr = self.entries[obj].mbr;
        let mut visited = 0;
        let mut candidates = Vec::new();
        let hit = grid.probe(&mbr, &mut visited, |candidate| candidates.push(candidate));
        self.stats.hash_probes += visited;
        if !hit {
            self.stats.filtered[self.entries[obj].side.index()] += 1;
            return;
        }
        for candidate in candidates {
            self.emit_if_touching(obj, candidate);
        }
    }

    /// Probes a grid with a list of entries.
    pub fn probe_grid_list(&mut self, grid: &GridHash, probes: &[EntryId]) {
        for &obj in probes {
            self.probe_grid(grid, obj);
        }
    }
}

/// The outcome of one run: the unique pairs as per-side entry ids plus the
/// stats snapshot.
#[derive(Debug, Clone)]
pub struct JoinSummary {
    pub results: u64,
    pub duplicates: u64,
    /// Unique pairs as `(a.id, b.id)`.
    pub pairs: Vec<(u32, u32)>,
    pub stats: JoinStats,
}

/// One epsilon spatial join over two in-memory datasets.
///
/// An engine instance is single-threaded and not reusable across different
/// datasets; independent instances share no mutable state.
pub struct SpatialJoin {
    config: JoinConfig,
    entries: Vec<TreeEntry>,
    ds_a: Vec<EntryId>,
    ds_b: Vec<EntryId>,
    universe_a: Box3,
    universe_b: Box3,
    stats: JoinStats,
    pairs: ResultPairs,
    file_a: Option<PathBuf>,
    file_b: Option<PathBuf>,
}

impl SpatialJoin {
    /// Validates the configuration and creates an empty engine.
    pub fn new(config: JoinConfig) -> Result<Self, JoinError> {
        config.validate()?;
        Ok(SpatialJoin {
            config,
            entries: Vec::new(),
            ds_a: Vec::new(),
            ds_b: Vec::new(),
            universe_a: Box3::empty(),
            universe_b: Box3::empty(),
            stats: JoinStats::default(),
            pairs: ResultPairs::new(),
            file_a: None,
            file_b: None,
        })
    }

    pub fn config(&self) -> &JoinConfig {
        &self.config
    }

    pub fn stats(&self) -> &JoinStats {
        &self.stats
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn file_names(&self) -> (Option<&Path>, Option<&Path>) {
        (self.file_a.as_deref(), self.file_b.as_deref())
    }

    /// Loads both datasets from binary files, honoring the configured load
    /// caps.
    pub fn load_files(&mut self, path_a: &Path, path_b: &Path) -> Result<(), JoinError> {
        let start = Instant::now();
        let dataset_a = read_dataset(path_a, self.config.limit_a)?;
        let dataset_b = read_dataset(path_b, self.config.limit_b)?;
        self.file_a = Some(path_a.to_path_buf());
        self.file_b = Some(path_b.to_path_buf());
        self.ingest(dataset_a.objects, Side::A);
        self.ingest(dataset_b.objects, Side::B);
        self.stats.data_load += start.elapsed();
        Ok(())
    }

    /// Ingests in-memory object vectors; the test and library entry point.
    pub fn load_objects(&mut self, objects_a: Vec<SpatialObject>, objects_b: Vec<SpatialObject>) {
        let start = Instant::now();
        self.ingest(objects_a, Side::A);
        self.ingest(objects_b, Side::B);
        self.stats.data_load += start.elapsed();
    }

    fn ingest(&mut self, objects: Vec<SpatialObject>, side: Side) {
        let mut universe = Box3::empty();
        for (index, object) in objects.into_iter().enumerate() {
            let entry = TreeEntry::new(object, side, index as u32, self.config.epsilon);
            universe.expand_to(&entry.mbr);
            match side {
                Side::A => self.ds_a.push(self.entries.len()),
                Side::B => self.ds_b.push(self.entries.len()),
            }
            self.entries.push(entry);
        }
        if !universe.is_empty {
            universe.expand(self.config.epsilon as Scalar);
        }
        match side {
            Side::A => {
                self.universe_a = universe;
                self.stats.size_a = self.ds_a.len() as u64;
            }
            Side::B => {
                self.universe_b = universe;
                self.stats.size_b = self.ds_b.len() as u64;
            }
        }
        info!(
            "Ingested {} entries on side {:?}",
            match side {
                Side::A => self.ds_a.len(),
                Side::B => self.ds_b.len(),
            },
            side
        );
    }

    /// Runs the configured join to completion and returns the unique pairs.
    ///
    /// On failure the result buffer is discarded; there are no partial
    /// results.
    pub fn run(&mut self) -> Result<JoinSummary, JoinError> {
        let total_start = Instant::now();
        self.pairs.clear();

        let outcome = self.dispatch();
        if let Err(err) = outcome {
            self.pairs.clear();
            return Err(err);
        }

        self.pairs.deduplicate();
        self.stats.dedup = self.pairs.dedup_time;
        self.stats.duplicates = self.pairs.duplicates;
        self.stats.results = self.pairs.len() as u64;
        self.stats.total += total_start.elapsed();

        let pairs = self
            .pairs
            .pairs()
            .iter()
            .map(|&(a, b)| (self.entries[a].id, self.entries[b].id))
            .collect();
        info!(
            "{} done: {} results, {} duplicates",
            self.config.algorithm_name(),
            self.stats.results,
            self.stats.duplicates
        );
        Ok(JoinSummary {
            results: self.stats.results,
            duplicates: self.stats.duplicates,
            pairs,
            stats: self.stats.clone(),
        })
    }

    fn dispatch(&mut self) -> Result<(), JoinError> {
        let config = self.config.clone();
        let shared_universe = Box3::union_safe(&self.universe_a, &self.universe_b);
        let (vm_before, rss_before) = process_memory_kb();
        self.stats.mem_vm_start_kb = vm_before;
        self.stats.mem_rss_start_kb = rss_before;

        let mut ctx = JoinContext {
            entries: &self.entries,
            epsilon: config.epsilon,
            refinement: config.refinement,
            stats: &mut self.stats,
            pairs: &mut self.pairs,
        };

        match config.algorithm {
            Algorithm::NestedLoop => {
                let start = Instant::now();
                ctx.stats.items_max_compared +=
                    self.ds_a.len() as u64 * self.ds_b.len() as u64;
                ctx.nested_loop(&self.ds_a, &self.ds_b);
                ctx.stats.comparing += start.elapsed();
            }
            Algorithm::PlaneSweep => {
                plane_sweep(&mut ctx, &self.ds_a, &self.ds_b, config.sort_budget)?;
            }
            Algorithm::SpatialGrid => {
                let init_start = Instant::now();
                let mut grid = GridHash::with_resolution(shared_universe, config.resolution);
                ctx.stats.initialize += init_start.elapsed();

                let build_start = Instant::now();
                grid.build(&self.ds_a, ctx.entries);
                ctx.stats.building += build_start.elapsed();
                ctx.stats.rep_a = if self.ds_a.is_empty() {
                    1.0
                } else {
                    grid.stored_references() as f64 / self.ds_a.len() as f64
                };

                let probe_start = Instant::now();
                ctx.probe_grid_list(&grid, &self.ds_b);
                ctx.stats.probing += probe_start.elapsed();
            }
            Algorithm::SizeSeparation => {
                let init_start = Instant::now();
                let mut s3 = S3Hash::new(shared_universe, config.s3_levels, config.s3_base);
                ctx.stats.initialize += init_start.elapsed();

                let build_start = Instant::now();
                s3.build(&self.ds_a, &self.ds_b, ctx.entries);
                ctx.stats.building += build_start.elapsed();

                let probe_start = Instant::now();
                s3.probe(&mut ctx);
                ctx.stats.probing += probe_start.elapsed();
            }
            Algorithm::Pbsm => {
                pbsm_join(
                    &mut ctx,
                    &self.ds_a,
                    &self.ds_b,
                    shared_universe,
                    config.resolution,
                );
            }
            Algorithm::Touch => {
                let tree = build_tree(
                    ctx.entries,
                    &self.ds_a,
                    config.sort,
                    config.leaf_size,
                    config.fanout,
                    ctx.stats,
                );
                let mut touch = TouchJoin::new(
                    tree,
                    config.traversal,
                    config.local_join,
                    config.grid_policy,
                    config.local_cells,
                );
                touch.assign(&self.ds_b, &mut ctx);
                touch.analyze(&mut ctx);
                touch.build_local_grids(&mut ctx);
                touch.probe(&mut ctx);
                debug!("TOUCH probe finished");
            }
        }

        let (vm_after, rss_after) = process_memory_kb();
        self.stats.mem_vm_kb = vm_after;
        self.stats.mem_rss_kb = rss_after;
        Ok(())
    }
}

/// Samples virtual and resident memory of the process from
/// `/proc/self/status`, in KB. Returns zeros when the probe fails.
pub fn process_memory_kb() -> (f64, f64) {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return (0.0, 0.0);
    };
    let mut vm = 0.0;
    let mut rss = 0.0;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmSize:") {
            vm = rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse()
                .unwrap_or(0.0);
        } else if let Some(rest) = line.strip_prefix("VmRSS:") {
            rss = rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse()
                .unwrap_or(0.0);
        }
    }
    (vm, rss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vertex;

    fn points(coordinates: &[(f32, f32, f32)]) -> Vec<SpatialObject> {
        coordinates
            .iter()
            .map(|&(x, y, z)| SpatialObject::Point(Vertex::new(x, y, z)))
            .collect()
    }

    fn run(config: JoinConfig, a: &[(f32, f32, f32)], b: &[(f32, f32, f32)]) -> JoinSummary {
        let mut engine = SpatialJoin::new(config).unwrap();
        engine.load_objects(points(a), points(b));
        engine.run().unwrap()
    }

    #[test]
    fn test_nested_loop_two_touching_points() {
        let config = JoinConfig {
            epsilon: 1.0,
            ..JoinConfig::default()
        };
        let summary = run(config, &[(0.0, 0.0, 0.0)], &[(0.4, 0.0, 0.0)]);
        assert_eq!(summary.results, 1);
        assert_eq!(summary.pairs, vec![(0, 0)]);
    }

    #[test]
    fn test_nested_loop_distant_points() {
        let config = JoinConfig {
            epsilon: 1.0,
            ..JoinConfig::default()
        };
        let summary = run(config, &[(0.0, 0.0, 0.0)], &[(2.0, 0.0, 0.0)]);
        assert_eq!(summary.results, 0);
    }

    #[test]
    fn test_empty_sides_produce_empty_result() {
        let summary = run(JoinConfig::default(), &[], &[(0.0, 0.0, 0.0)]);
        assert_eq!(summary.results, 0);
        assert_eq!(summary.duplicates, 0);
        let summary = run(JoinConfig::default(), &[(0.0, 0.0, 0.0)], &[]);
        assert_eq!(summary.results, 0);
    }

    #[test]
    fn test_corner_proximity_accepts_coincident_points() {
        let config = JoinConfig {
            epsilon: 0.0,
            refinement: Refinement::CornerProximity,
            ..JoinConfig::default()
        };
        let summary = run(config, &[(0.0, 0.0, 0.0)], &[(0.0, 0.0, 0.0)]);
        assert_eq!(summary.results, 1);
    }

    #[test]
    fn test_memory_probe_does_not_fail() {
        let (vm, rss) = process_memory_kb();
        assert!(vm >= 0.0);
        assert!(rss >= 0.0);
    }

    #[test]
    fn test_stats_count_comparisons() {
        let config = JoinConfig {
            epsilon: 0.5,
            ..JoinConfig::default()
        };
        let summary = run(
            config,
            &[(0.0, 0.0, 0.0), (5.0, 5.0, 5.0)],
            &[(0.1, 0.0, 0.0), (9.0, 9.0, 9.0)],
        );
        assert_eq!(summary.stats.items_compared, 4);
        assert_eq!(summary.stats.items_max_compared, 4);
        assert_eq!(summary.results, 1);
    }
}
