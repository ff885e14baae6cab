//! ## Spatial Objects
//!
//! The geometric primitives the join engine treats opaquely: a tagged sum of
//! the dataset object kinds (point, box, segment, triangle, sphere, synapse)
//! with their MBR, center, sort key, point distance, and fixed binary
//! layouts.
//!
//! Serialization goes through bincode's little-endian fixed-int encoding,
//! which reproduces the raw record layouts of the dataset format: every
//! variant is a flat struct of f32/u32 fields, so the encoded size is the
//! constant [`ObjectKind::byte_size`].

use crate::errors::JoinError;
use crate::geometry::{BigScalar, Box3, Scalar, Vertex, DIMENSION};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Type tag of a spatial object, also the record tag of dataset files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Point,
    Box,
    Segment,
    Triangle,
    Sphere,
    Synapse,
}

impl ObjectKind {
    /// Serialized size in bytes of one record of this kind.
    pub fn byte_size(&self) -> u32 {
        let scalar = std::mem::size_of::<Scalar>() as u32;
        let id = std::mem::size_of::<u32>() as u32;
        let d = DIMENSION as u32;
        match self {
            ObjectKind::Point => d * scalar,
            ObjectKind::Box => 2 * d * scalar,
            ObjectKind::Segment => (2 * d + 2) * scalar + 3 * id,
            ObjectKind::Triangle => 3 * d * scalar,
            ObjectKind::Sphere => (d + 1) * scalar,
            ObjectKind::Synapse => (2 * d + 1) * scalar + 4 * id,
        }
    }

    /// Parses the numeric tag stored in dataset headers.
    pub fn from_tag(tag: u32) -> Option<ObjectKind> {
        match tag {
            0 => Some(ObjectKind::Point),
            1 => Some(ObjectKind::Box),
            2 => Some(ObjectKind::Segment),
            3 => Some(ObjectKind::Triangle),
            4 => Some(ObjectKind::Sphere),
            5 => Some(ObjectKind::Synapse),
            _ => None,
        }
    }

    pub fn tag(&self) -> u32 {
        *self as u32
    }

    pub fn name(&self) -> &'static str {
        match self {
            ObjectKind::Point => "point",
            ObjectKind::Box => "box",
            ObjectKind::Segment => "segment",
            ObjectKind::Triangle => "triangle",
            ObjectKind::Sphere => "sphere",
            ObjectKind::Synapse => "synapse",
        }
    }
}

/// A neuron-model segment: a truncated cone between two centers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub begin: Vertex,
    pub end: Vertex,
    pub radius_begin: Scalar,
    pub radius_end: Scalar,
    pub neuron_id: u32,
    pub section_id: u32,
    pub segment_id: u32,
}

/// A mesh triangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub vertices: [Vertex; 3],
}

/// A soma-style sphere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Vertex,
    pub radius: Scalar,
}

/// A synapse: pre- and post-synaptic positions plus identity fields.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Synapse {
    pub pre_position: Vertex,
    pub post_position: Vertex,
    pub spine_length: Scalar,
    pub global_id: u32,
    pub counter_id: u32,
    pub pre_id: u32,
    pub post_id: u32,
}

/// One dataset object. Dispatch is by match on the variant, never dynamic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpatialObject {
    Point(Vertex),
    Box(Box3),
    Segment(Segment),
    Triangle(Triangle),
    Sphere(Sphere),
    Synapse(Synapse),
}

/// On-disk body of a box record (the `is_empty` flag is not stored).
#[derive(Serialize, Deserialize)]
struct BoxRecord {
    low: Vertex,
    high: Vertex,
}

impl SpatialObject {
    pub fn kind(&self) -> ObjectKind {
        match self {
            SpatialObject::Point(_) => ObjectKind::Point,
            SpatialObject::Box(_) => ObjectKind::Box,
            SpatialObject::Segment(_) => ObjectKind::Segment,
            SpatialObject::Triangle(_) => ObjectKind::Triangle,
            SpatialObject::Sphere(_) => ObjectKind::Sphere,
            SpatialObject::Synapse(_) => ObjectKind::Synapse,
        }
    }

    /// Minimum bounding rectangle of the object, not inflated.
    pub fn mbr(&self) -> Box3 {
        match self {
            SpatialObject::Point(v) => Box3::new(*v, *v),
            SpatialObject::Box(b) => *b,
            SpatialObject::Segment(s) => s.bounding_box(),
            SpatialObject::Triangle(t) => Box3::bounding_box(&t.vertices),
            SpatialObject::Sphere(s) => {
                let mut b = Box3::new(s.center, s.center);
                b.expand(s.radius);
                b
            }
            SpatialObject::Synapse(s) => {
                Box3::bounding_box(&[s.pre_position, s.post_position])
            }
        }
    }

    pub fn center(&self) -> Vertex {
        match self {
            SpatialObject::Point(v) => *v,
            SpatialObject::Box(b) => b.center(),
            SpatialObject::Segment(s) => Vertex::midpoint(&s.begin, &s.end),
            SpatialObject::Triangle(t) => {
                let mut c = Vertex::default();
                for axis in 0..DIMENSION {
                    c[axis] =
                        (t.vertices[0][axis] + t.vertices[1][axis] + t.vertices[2][axis]) / 3.0;
                }
                c
            }
            SpatialObject::Sphere(s) => s.center,
            SpatialObject::Synapse(s) => Vertex::midpoint(&s.pre_position, &s.post_position),
        }
    }

    /// Sort key along one axis: the center coordinate.
    pub fn sort_key(&self, axis: usize) -> Scalar {
        self.center()[axis]
    }

    /// Squared distance from a point to the object. Compound shapes fall
    /// back to the MBR clamp distance.
    pub fn point_distance_sq(&self, p: &Vertex) -> BigScalar {
        match self {
            SpatialObject::Point(v) => Vertex::distance_sq(v, p),
            SpatialObject::Box(b) => b.point_distance_sq(p),
            SpatialObject::Sphere(s) => {
                let d = Vertex::distance(&s.center, p) - s.radius as BigScalar;
                if d <= 0.0 {
                    0.0
                } else {
                    d * d
                }
            }
            other => other.mbr().point_distance_sq(p),
        }
    }

    /// Serialized size of this object in bytes.
    pub fn byte_size(&self) -> u32 {
        self.kind().byte_size()
    }

    /// Writes the fixed binary record body.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), JoinError> {
        let result = match self {
            SpatialObject::Point(v) => bincode::serialize_into(writer, v),
            SpatialObject::Box(b) => bincode::serialize_into(
                writer,
                &BoxRecord {
                    low: b.low,
                    high: b.high,
                },
            ),
            SpatialObject::Segment(s) => bincode::serialize_into(writer, s),
            SpatialObject::Triangle(t) => bincode::serialize_into(writer, t),
            SpatialObject::Sphere(s) => bincode::serialize_into(writer, s),
            SpatialObject::Synapse(s) => bincode::serialize_into(writer, s),
        };
        result.map_err(|e| JoinError::Io(std::io::Error::other(e)))
    }

    /// Reads one fixed binary record body of the given kind.
    pub fn read_from<R: Read>(kind: ObjectKind, reader: &mut R) -> Result<Self, JoinError> {
        let object = match kind {
            ObjectKind::Point => bincode::deserialize_from(reader).map(SpatialObject::Point),
            ObjectKind::Box => bincode::deserialize_from(reader).map(|r: BoxRecord| {
                SpatialObject::Box(Box3::new(r.low, r.high))
            }),
            ObjectKind::Segment => bincode::deserialize_from(reader).map(SpatialObject::Segment),
            ObjectKind::Triangle => bincode::deserialize_from(reader).map(SpatialObject::Triangle),
            ObjectKind::Sphere => bincode::deserialize_from(reader).map(SpatialObject::Sphere),
            ObjectKind::Synapse => bincode::deserialize_from(reader).map(SpatialObject::Synapse),
        };
        object.map_err(|e| JoinError::Io(std::io::Error::other(e)))
    }
}

/// Bounding box over an object collection; empty for an empty collection.
pub fn bounding_box(objects: &[SpatialObject]) -> Box3 {
    let mut bb = Box3::empty();
    for object in objects {
        bb.expand_to(&object.mbr());
    }
    bb
}

impl Segment {
    /// Tight bounding box of the truncated cone: each end center is covered
    /// by the projection of its radius orthogonal to the segment axis, and
    /// the two covering boxes are combined.
    pub fn bounding_box(&self) -> Box3 {
        let distance = Vertex::distance(&self.begin, &self.end) as Scalar;
        let difference = Vertex::difference(&self.begin, &self.end);

        let mut projection_begin = Vertex::default();
        let mut projection_end = Vertex::default();
        if distance > 0.0 {
            for i in 0..DIMENSION {
                let ratio = (difference[i] / distance).clamp(-1.0, 1.0);
                let sine = (1.0 - ratio * ratio).max(0.0).sqrt();
                projection_begin[i] = sine * self.radius_begin;
                projection_end[i] = sine * self.radius_end;
            }
        } else {
            // Degenerate segment: fall back to the larger radius ball.
            let r = self.radius_begin.max(self.radius_end);
            projection_begin = Vertex::new(r, r, r);
            projection_end = projection_begin;
        }

        let box_begin = Box3::new(
            self.begin - projection_begin,
            self.begin + projection_begin,
        );
        let box_end = Box3::new(self.end - projection_end, self.end + projection_end);
        Box3::combine(&box_begin, &box_end)
    }

    /// Volume of the truncated cone.
    pub fn volume(&self) -> BigScalar {
        let length = Vertex::distance(&self.begin, &self.end);
        let rb = self.radius_begin as BigScalar;
        let re = self.radius_end as BigScalar;
        (std::f64::consts::PI / 12.0) * length * (rb * rb + rb * re + re * re)
    }
}
