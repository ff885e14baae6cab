//! ## Size-Separation Spatial Hash
//!
//! A tower of grids over the shared universe: level `l` has `base^l` cells
//! per axis. Each entry is inserted at the deepest level where one single
//! cell still encloses its MBR, so large objects live near the top and
//! small ones sink to the fine levels. The probe joins every non-empty
//! A-cell against the one coarser B-cell covering it per level above, the
//! identical cell at its own level, and every contained finer B-cell below.
//!
//! Entries land in exactly one cell each, so the probe enumerates each
//! candidate pair at most once.

use crate::engine::JoinContext;
use crate::entry::{EntryId, TreeEntry};
use crate::geometry::{Box3, Vertex, DIMENSION};
use std::collections::HashMap;
use tracing::{debug, info};

type CellTable = HashMap<u64, Vec<EntryId>>;

/// The size-separation join state: per-level sparse cell tables per side.
pub struct S3Hash {
    universe: Box3,
    base: usize,
    /// Cells per axis at each level: `base^level`.
    resolution: Vec<u64>,
    /// Cell widths per axis at each level.
    widths: Vec<[f64; DIMENSION]>,
    tables: [Vec<CellTable>; 2],
}

impl S3Hash {
    pub fn new(universe: Box3, levels: usize, base: usize) -> Self {
        debug_assert!(levels > 0 && base >= 2);
        let mut resolution = Vec::with_capacity(levels);
        let mut widths = Vec::with_capacity(levels);
        let mut cells_per_axis = 1u64;
        for _ in 0..levels {
            resolution.push(cells_per_axis);
            let mut level_widths = [0.0; DIMENSION];
            for axis in 0..DIMENSION {
                let extent = if universe.is_empty {
                    0.0
                } else {
                    universe.length(axis) as f64
                };
                level_widths[axis] = extent / cells_per_axis as f64;
            }
            widths.push(level_widths);
            cells_per_axis = cells_per_axis.saturating_mul(base as u64);
        }
        S3Hash {
            universe,
            base,
            resolution,
            widths,
            tables: [vec![CellTable::new(); levels], vec![CellTable::new(); levels]],
        }
    }

    pub fn levels(&self) -> usize {
        self.resolution.len()
    }

    /// Grid coordinates of a vertex at one level, clamped into the grid.
    fn locate(&self, v: &Vertex, level: usize) -> [u64; DIMENSION] {
        let mut location = [0u64; DIMENSION];
        for axis in 0..DIMENSION {
            let width = self.widths[level][axis];
            let coordinate = if width > 0.0 && v[axis] > self.universe.low[axis] {
                ((v[axis] - self.universe.low[axis]) as f64 / width).floor()
            } else {
                0.0
            };
            location[axis] = (coordinate.max(0.0) as u64).min(self.resolution[level] - 1);
        }
        location
    }

    fn index(&self, location: [u64; DIMENSION], level: usize) -> u64 {
        let r = self.resolution[level];
        location[0] + location[1] * r + location[2] * r * r
    }

    fn decode(&self, index: u64, level: usize) -> [u64; DIMENSION] {
        let r = self.resolution[level];
        [index % r, (index / r) % r, index / (r * r)]
    }

    /// The deepest level whose single cell encloses the MBR, and the cell.
    fn placement(&self, mbr: &Box3) -> (usize, u64) {
        for level in (0..self.levels()).rev() {
            let low = self.locate(&mbr.low, level);
            let high = self.locate(&mbr.high, level);
            if low == high {
                return (level, self.index(low, level));
            }
        }
        // Level 0 has a single cell and always encloses.
        (0, 0)
    }

    /// Inserts both sides into their towers.
    pub fn build(&mut self, ds_a: &[EntryId], ds_b: &[EntryId], entries: &[TreeEntry]) {
        for (side, ids) in [(0, ds_a), (1, ds_b)] {
            for &id in ids {
                let (level, index) = self.placement(&entries[id].mbr);
                self.tables[side][level].entry(index).or_default().push(id);
            }
        }
        debug!(
            "S3 build: {} A cells, {} B cells over {} levels",
            self.tables[0].iter().map(CellTable::len).sum::<usize>(),
            self.tables[1].iter().map(CellTable::len).sum::<usize>(),
            self.levels()
        );
    }

    fn join_cells(
        &self,
        bucket_a: &[EntryId],
        level_b: usize,
        index_b: u64,
        ctx: &mut JoinContext<'_>,
    ) {
        if let Some(bucket_b) = self.tables[1][level_b].get(&index_b) {
            ctx.stats.items_max_compared += bucket_a.len() as u64 * bucket_b.len() as u64;
            ctx.nested_loop(bucket_a, bucket_b);
        }
    }

    /// Joins every non-empty A cell against the B cells that can reach it.
    pub fn probe(&self, ctx: &mut JoinContext<'_>) {
        for level_a in (0..self.levels()).rev() {
            for (&index_a, bucket_a) in &self.tables[0][level_a] {
                let location = self.decode(index_a, level_a);

                // Coarser B levels: the single covering cell per level.
                for level_b in 0..level_a {
                    let shrink = (self.base as u64).pow((level_a - level_b) as u32);
                    let covering = [
                        location[0] / shrink,
                        location[1] / shrink,
                        location[2] / shrink,
                    ];
                    self.join_cells(bucket_a, level_b, self.index(covering, level_b), ctx);
                }

                // The identical cell.
                self.join_cells(bucket_a, level_a, index_a, ctx);

                // Finer B levels: every contained cell.
                for level_b in level_a + 1..self.levels() {
                    let grow = (self.base as u64).pow((level_b - level_a) as u32);
                    for x in location[0] * grow..(location[0] + 1) * grow {
                        for y in location[1] * grow..(location[1] + 1) * grow {
                            for z in location[2] * grow..(location[2] + 1) * grow {
                                self.join_cells(
                                    bucket_a,
                                    level_b,
                                    self.index([x, y, z], level_b),
                                    ctx,
                                );
                            }
                        }
                    }
                }
            }
        }
        info!("S3 probe finished: {} buffered pairs", ctx.pairs.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Side;
    use crate::objects::SpatialObject;

    fn box_entry(low: (f32, f32, f32), high: (f32, f32, f32), side: Side, id: u32) -> TreeEntry {
        TreeEntry::new(
            SpatialObject::Box(Box3::new(
                Vertex::new(low.0, low.1, low.2),
                Vertex::new(high.0, high.1, high.2),
            )),
            side,
            id,
            0.0,
        )
    }

    fn universe() -> Box3 {
        Box3::new(Vertex::new(0.0, 0.0, 0.0), Vertex::new(16.0, 16.0, 16.0))
    }

    #[test]
    fn test_small_objects_sink_to_fine_levels() {
        let entries = vec![box_entry((0.0, 0.0, 0.0), (0.5, 0.5, 0.5), Side::A, 0)];
        let s3 = S3Hash::new(universe(), 4, 2);
        let (level, _) = s3.placement(&entries[0].mbr);
        assert_eq!(level, 3);
    }

    #[test]
    fn test_large_objects_stay_on_coarse_levels() {
        let entries = vec![box_entry((1.0, 1.0, 1.0), (15.0, 15.0, 15.0), Side::A, 0)];
        let s3 = S3Hash::new(universe(), 4, 2);
        let (level, index) = s3.placement(&entries[0].mbr);
        assert_eq!(level, 0);
        assert_eq!(index, 0);
    }

    #[test]
    fn test_straddling_object_moves_up_one_level() {
        // Crosses the mid plane at x = 8, so no level-1+ cell encloses it.
        let entries = vec![box_entry((7.0, 0.0, 0.0), (9.0, 1.0, 1.0), Side::A, 0)];
        let s3 = S3Hash::new(universe(), 4, 2);
        let (level, _) = s3.placement(&entries[0].mbr);
        assert_eq!(level, 0);
    }

    #[test]
    fn test_build_places_each_entry_once() {
        let entries = vec![
            box_entry((0.0, 0.0, 0.0), (0.5, 0.5, 0.5), Side::A, 0),
            box_entry((10.0, 10.0, 10.0), (10.5, 10.5, 10.5), Side::A, 1),
            box_entry((0.1, 0.1, 0.1), (0.4, 0.4, 0.4), Side::B, 0),
        ];
        let mut s3 = S3Hash::new(universe(), 4, 2);
        s3.build(&[0, 1], &[2], &entries);
        let stored_a: usize = s3.tables[0]
            .iter()
            .flat_map(|t| t.values())
            .map(Vec::len)
            .sum();
        assert_eq!(stored_a, 2);
    }
}
