//! ## Tree Entries
//!
//! A [`TreeEntry`] wraps one dataset object together with its cached
//! epsilon-inflated MBR, its origin side (A or B), and a stable per-side id.
//! Entries are created once at load time, never mutated, and owned by the
//! engine's arena; every other structure (tree nodes, grids, result pairs)
//! refers to them by [`EntryId`].

use crate::geometry::{Box3, Scalar};
use crate::objects::SpatialObject;

/// Index of an entry in the engine-owned arena.
pub type EntryId = usize;

/// Origin side of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl Side {
    /// Array index of this side (A = 0, B = 1).
    pub fn index(&self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// A leaf-level record: one object plus its inflated MBR and identity.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub object: SpatialObject,
    /// The object MBR inflated by `epsilon / 2`, cached at load time so the
    /// join predicate reduces to an MBR overlap test.
    pub mbr: Box3,
    pub side: Side,
    pub id: u32,
}

impl TreeEntry {
    pub fn new(object: SpatialObject, side: Side, id: u32, epsilon: f64) -> Self {
        let mut mbr = object.mbr();
        mbr.expand((epsilon / 2.0) as Scalar);
        TreeEntry {
            object,
            mbr,
            side,
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vertex;

    #[test]
    fn test_entry_caches_inflated_mbr() {
        let entry = TreeEntry::new(
            SpatialObject::Point(Vertex::new(1.0, 1.0, 1.0)),
            Side::A,
            0,
            1.0,
        );
        assert_eq!(entry.mbr.low, Vertex::new(0.5, 0.5, 0.5));
        assert_eq!(entry.mbr.high, Vertex::new(1.5, 1.5, 1.5));
    }

    #[test]
    fn test_zero_epsilon_keeps_degenerate_mbr() {
        let entry = TreeEntry::new(
            SpatialObject::Point(Vertex::new(2.0, 2.0, 2.0)),
            Side::B,
            3,
            0.0,
        );
        assert_eq!(entry.mbr.low, entry.mbr.high);
        assert!(!entry.mbr.is_empty);
    }

    #[test]
    fn test_side_indices() {
        assert_eq!(Side::A.index(), 0);
        assert_eq!(Side::B.index(), 1);
        assert_eq!(Side::A.opposite(), Side::B);
    }
}
