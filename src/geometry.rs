//! ## Geometry Primitives
//!
//! This module implements the fixed-dimension (3D) vertex and axis-aligned
//! box types that the join engine is built on. Coordinates are `Scalar`
//! (f32, matching the on-disk dataset format); volumes, squared distances
//! and statistics are accumulated in `BigScalar` (f64).
//!
//! Box overlap and containment use closed intervals on every axis, so two
//! boxes that merely share a face (or a degenerate box that coincides with a
//! corner) still overlap. An empty box never overlaps anything and is
//! absorbed by [`Box3::union_safe`].

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Index, IndexMut, Mul, Sub};

/// Coordinate scalar of the engine; uniform across geometry and datasets.
pub type Scalar = f32;

/// Wide scalar for volumes, squared distances, and statistics.
pub type BigScalar = f64;

/// Number of spatial dimensions.
pub const DIMENSION: usize = 3;

/// A point in 3D space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vertex(pub [Scalar; DIMENSION]);

impl Vertex {
    pub fn new(x: Scalar, y: Scalar, z: Scalar) -> Self {
        Vertex([x, y, z])
    }

    /// Componentwise absolute difference of two vertices.
    pub fn difference(a: &Vertex, b: &Vertex) -> Vertex {
        let mut out = Vertex::default();
        for i in 0..DIMENSION {
            out.0[i] = (a.0[i] - b.0[i]).abs();
        }
        out
    }

    /// Squared Euclidean distance between two points.
    pub fn distance_sq(a: &Vertex, b: &Vertex) -> BigScalar {
        let mut d = 0.0;
        for i in 0..DIMENSION {
            let diff = (a.0[i] - b.0[i]) as BigScalar;
            d += diff * diff;
        }
        d
    }

    /// Euclidean distance between two points.
    pub fn distance(a: &Vertex, b: &Vertex) -> BigScalar {
        Vertex::distance_sq(a, b).sqrt()
    }

    /// Dot product of two vectors.
    pub fn dot(a: &Vertex, b: &Vertex) -> BigScalar {
        let mut product = 0.0;
        for i in 0..DIMENSION {
            product += (a.0[i] as BigScalar) * (b.0[i] as BigScalar);
        }
        product
    }

    /// Midpoint of two vertices.
    pub fn midpoint(a: &Vertex, b: &Vertex) -> Vertex {
        let mut mid = Vertex::default();
        for i in 0..DIMENSION {
            mid.0[i] = (a.0[i] + b.0[i]) / 2.0;
        }
        mid
    }

    /// Samples a point uniformly inside `world` using the caller's RNG.
    pub fn random_in<R: Rng + ?Sized>(world: &Box3, rng: &mut R) -> Vertex {
        let mut point = Vertex::default();
        for i in 0..DIMENSION {
            point.0[i] = if world.low.0[i] < world.high.0[i] {
                rng.gen_range(world.low.0[i]..world.high.0[i])
            } else {
                world.low.0[i]
            };
        }
        point
    }
}

impl Index<usize> for Vertex {
    type Output = Scalar;

    fn index(&self, axis: usize) -> &Scalar {
        &self.0[axis]
    }
}

impl IndexMut<usize> for Vertex {
    fn index_mut(&mut self, axis: usize) -> &mut Scalar {
        &mut self.0[axis]
    }
}

impl Add for Vertex {
    type Output = Vertex;

    fn add(self, rhs: Vertex) -> Vertex {
        let mut out = Vertex::default();
        for i in 0..DIMENSION {
            out.0[i] = self.0[i] + rhs.0[i];
        }
        out
    }
}

impl Sub for Vertex {
    type Output = Vertex;

    fn sub(self, rhs: Vertex) -> Vertex {
        let mut out = Vertex::default();
        for i in 0..DIMENSION {
            out.0[i] = self.0[i] - rhs.0[i];
        }
        out
    }
}

impl Mul for Vertex {
    type Output = Vertex;

    fn mul(self, rhs: Vertex) -> Vertex {
        let mut out = Vertex::default();
        for i in 0..DIMENSION {
            out.0[i] = self.0[i] * rhs.0[i];
        }
        out
    }
}

impl Div for Vertex {
    type Output = Vertex;

    fn div(self, rhs: Vertex) -> Vertex {
        let mut out = Vertex::default();
        for i in 0..DIMENSION {
            out.0[i] = self.0[i] / rhs.0[i];
        }
        out
    }
}

impl Add<Scalar> for Vertex {
    type Output = Vertex;

    fn add(self, rhs: Scalar) -> Vertex {
        let mut out = Vertex::default();
        for i in 0..DIMENSION {
            out.0[i] = self.0[i] + rhs;
        }
        out
    }
}

impl Sub<Scalar> for Vertex {
    type Output = Vertex;

    fn sub(self, rhs: Scalar) -> Vertex {
        let mut out = Vertex::default();
        for i in 0..DIMENSION {
            out.0[i] = self.0[i] - rhs;
        }
        out
    }
}

impl Mul<Scalar> for Vertex {
    type Output = Vertex;

    fn mul(self, rhs: Scalar) -> Vertex {
        let mut out = Vertex::default();
        for i in 0..DIMENSION {
            out.0[i] = self.0[i] * rhs;
        }
        out
    }
}

impl Div<Scalar> for Vertex {
    type Output = Vertex;

    fn div(self, rhs: Scalar) -> Vertex {
        let mut out = Vertex::default();
        for i in 0..DIMENSION {
            out.0[i] = self.0[i] / rhs;
        }
        out
    }
}

/// An axis-aligned box, the minimum bounding rectangle of the engine.
///
/// The `is_empty` flag marks a box with no extent at all (no point belongs
/// to it); such a box is the identity of [`Box3::union_safe`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box3 {
    pub low: Vertex,
    pub high: Vertex,
    pub is_empty: bool,
}

impl Default for Box3 {
    fn default() -> Self {
        Box3::empty()
    }
}

impl Box3 {
    /// The empty box; absorbed by unions, overlaps nothing.
    pub fn empty() -> Self {
        Box3 {
            low: Vertex::default(),
            high: Vertex::default(),
            is_empty: true,
        }
    }

    pub fn new(low: Vertex, high: Vertex) -> Self {
        debug_assert!((0..DIMENSION).all(|i| low[i] <= high[i]));
        Box3 {
            low,
            high,
            is_empty: false,
        }
    }

    /// Closed-interval overlap test; empty boxes never overlap.
    pub fn overlap(a: &Box3, b: &Box3) -> bool {
        if a.is_empty || b.is_empty {
            return false;
        }
        for i in 0..DIMENSION {
            if a.low[i] > b.high[i] || b.low[i] > a.high[i] {
                return false;
            }
        }
        true
    }

    /// Closed containment of a point.
    pub fn contains_point(&self, v: &Vertex) -> bool {
        if self.is_empty {
            return false;
        }
        for i in 0..DIMENSION {
            if self.low[i] > v[i] || self.high[i] < v[i] {
                return false;
            }
        }
        true
    }

    /// Does this box enclose `other` completely?
    pub fn contains_box(&self, other: &Box3) -> bool {
        if self.is_empty || other.is_empty {
            return false;
        }
        self.contains_point(&other.low) && self.contains_point(&other.high)
    }

    /// Union of two non-empty boxes.
    pub fn combine(a: &Box3, b: &Box3) -> Box3 {
        let mut low = Vertex::default();
        let mut high = Vertex::default();
        for i in 0..DIMENSION {
            low[i] = a.low[i].min(b.low[i]);
            high[i] = a.high[i].max(b.high[i]);
        }
        Box3::new(low, high)
    }

    /// Union that tolerates empty operands.
    pub fn union_safe(a: &Box3, b: &Box3) -> Box3 {
        match (a.is_empty, b.is_empty) {
            (true, true) => Box3::empty(),
            (true, false) => *b,
            (false, true) => *a,
            (false, false) => Box3::combine(a, b),
        }
    }

    /// Extends this box in place to cover `other`.
    pub fn expand_to(&mut self, other: &Box3) {
        *self = Box3::union_safe(self, other);
    }

    /// Volume of the box; zero when empty.
    pub fn volume(&self) -> BigScalar {
        if self.is_empty {
            return 0.0;
        }
        let mut v = 1.0;
        for i in 0..DIMENSION {
            v *= (self.high[i] - self.low[i]) as BigScalar;
        }
        v
    }

    /// Edge length along one axis.
    pub fn length(&self, axis: usize) -> Scalar {
        if self.is_empty {
            return 0.0;
        }
        self.high[axis] - self.low[axis]
    }

    /// Center point of the box.
    pub fn center(&self) -> Vertex {
        Vertex::midpoint(&self.low, &self.high)
    }

    /// Grows every face outward by `radius`.
    pub fn expand(&mut self, radius: Scalar) {
        for i in 0..DIMENSION {
            self.low[i] -= radius;
            self.high[i] += radius;
        }
    }

    /// The eight corner vertices.
    pub fn corners(&self) -> [Vertex; 8] {
        let mut out = [Vertex::default(); 8];
        for (index, corner) in out.iter_mut().enumerate() {
            for axis in 0..DIMENSION {
                corner.0[axis] = if index >> axis & 1 == 0 {
                    self.low[axis]
                } else {
                    self.high[axis]
                };
            }
        }
        out
    }

    /// Bounding box over a set of vertices; empty for an empty set.
    pub fn bounding_box(vertices: &[Vertex]) -> Box3 {
        let mut iter = vertices.iter();
        let first = match iter.next() {
            Some(v) => *v,
            None => return Box3::empty(),
        };
        let mut bb = Box3::new(first, first);
        for v in iter {
            for i in 0..DIMENSION {
                bb.low[i] = bb.low[i].min(v[i]);
                bb.high[i] = bb.high[i].max(v[i]);
            }
        }
        bb
    }

    /// Squared distance from a point to this box (zero inside).
    pub fn point_distance_sq(&self, v: &Vertex) -> BigScalar {
        if self.is_empty {
            return BigScalar::INFINITY;
        }
        let mut d = 0.0;
        for i in 0..DIMENSION {
            let gap = if v[i] < self.low[i] {
                (self.low[i] - v[i]) as BigScalar
            } else if v[i] > self.high[i] {
                (v[i] - self.high[i]) as BigScalar
            } else {
                0.0
            };
            d += gap * gap;
        }
        d
    }
}
