//! ## Binary Datasets
//!
//! Reader and writer for the flat binary dataset format: `count` fixed-size
//! records followed by a trailing header. The header is 16 bytes of
//! metadata plus the dataset universe (low/high vertices):
//!
//! | field | bytes |
//! |---|---|
//! | object-type tag | 4 |
//! | object count | 8 |
//! | per-object byte size | 4 |
//! | universe low, high | 2 × 12 |
//!
//! Readers seek to the end of the file to parse the header, validate it
//! against the file length, then rewind and stream records.

use crate::errors::JoinError;
use crate::geometry::{Box3, Vertex};
use crate::objects::{ObjectKind, SpatialObject};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::info;

/// Size of the trailing header in bytes.
pub const HEADER_SIZE: u64 = 40;

#[derive(Serialize, Deserialize)]
struct RawHeader {
    tag: u32,
    count: u64,
    object_size: u32,
    low: Vertex,
    high: Vertex,
}

/// Parsed dataset header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatasetHeader {
    pub kind: ObjectKind,
    pub count: u64,
    pub object_size: u32,
    pub universe: Box3,
}

/// An in-memory dataset: its header and the loaded objects.
#[derive(Debug)]
pub struct Dataset {
    pub header: DatasetHeader,
    pub objects: Vec<SpatialObject>,
}

/// Writes `objects` in the flat binary format. All objects must share one
/// kind; the header universe is the bounding box of the raw object MBRs.
pub fn write_dataset(
    path: &Path,
    kind: ObjectKind,
    objects: &[SpatialObject],
) -> Result<(), JoinError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    for object in objects {
        if object.kind() != kind {
            return Err(JoinError::dataset(
                path,
                format!(
                    "mixed object kinds: expected {}, found {}",
                    kind.name(),
                    object.kind().name()
                ),
            ));
        }
        object.write_to(&mut writer)?;
    }
    let universe = crate::objects::bounding_box(objects);

    let header = RawHeader {
        tag: kind.tag(),
        count: objects.len() as u64,
        object_size: kind.byte_size(),
        low: universe.low,
        high: universe.high,
    };
    bincode::serialize_into(&mut writer, &header)
        .map_err(|e| JoinError::Io(std::io::Error::other(e)))?;
    writer.flush()?;
    info!(
        "Wrote dataset {} ({} {} records)",
        path.display(),
        objects.len(),
        kind.name()
    );
    Ok(())
}

/// Reads the trailing header of a dataset file and validates it against the
/// file length.
pub fn read_header(path: &Path) -> Result<DatasetHeader, JoinError> {
    let mut file =
        File::open(path).map_err(|e| JoinError::dataset(path, format!("cannot open: {e}")))?;
    let file_len = file.metadata()?.len();
    if file_len < HEADER_SIZE {
        return Err(JoinError::dataset(
            path,
            format!("file too short for a header: {file_len} bytes"),
        ));
    }

    file.seek(SeekFrom::End(-(HEADER_SIZE as i64)))?;
    let raw: RawHeader = bincode::deserialize_from(&mut file)
        .map_err(|e| JoinError::dataset(path, format!("unreadable header: {e}")))?;

    let kind = ObjectKind::from_tag(raw.tag)
        .ok_or_else(|| JoinError::dataset(path, format!("unknown object-type tag: {}", raw.tag)))?;
    if raw.object_size != kind.byte_size() {
        return Err(JoinError::dataset(
            path,
            format!(
                "header object size {} does not match {} records of {} bytes",
                raw.object_size,
                kind.name(),
                kind.byte_size()
            ),
        ));
    }
    let body_len = raw
        .count
        .checked_mul(raw.object_size as u64)
        .and_then(|b| b.checked_add(HEADER_SIZE));
    if body_len != Some(file_len) {
        return Err(JoinError::dataset(
            path,
            format!(
                "truncated record stream: {} records of {} bytes + header != {} bytes",
                raw.count, raw.object_size, file_len
            ),
        ));
    }

    Ok(DatasetHeader {
        kind,
        count: raw.count,
        object_size: raw.object_size,
        universe: Box3::new(raw.low, raw.high),
    })
}

/// Reads a dataset, loading at most `limit` records (0 = all).
pub fn read_dataset(path: &Path, limit: usize) -> Result<Dataset, JoinError> {
    let header = read_header(path)?;

    let to_load = if limit == 0 {
        header.count as usize
    } else {
        limit.min(header.count as usize)
    };

    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut objects = Vec::with_capacity(to_load);
    for _ in 0..to_load {
        objects.push(SpatialObject::read_from(header.kind, &mut reader)?);
    }
    info!(
        "Read {} of {} {} records from {}",
        to_load,
        header.count,
        header.kind.name(),
        path.display()
    );

    Ok(Dataset { header, objects })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn scratch_file(stem: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("sjoin-dataset-{}-{stem}-{n}.bin", std::process::id()))
    }

    fn sample_points() -> Vec<SpatialObject> {
        vec![
            SpatialObject::Point(Vertex::new(0.0, 0.0, 0.0)),
            SpatialObject::Point(Vertex::new(1.0, 2.0, 3.0)),
            SpatialObject::Point(Vertex::new(-1.0, 5.0, 0.5)),
        ]
    }

    #[test]
    fn test_write_read_round_trip() {
        let path = scratch_file("roundtrip");
        let objects = sample_points();
        write_dataset(&path, ObjectKind::Point, &objects).unwrap();

        let dataset = read_dataset(&path, 0).unwrap();
        assert_eq!(dataset.header.kind, ObjectKind::Point);
        assert_eq!(dataset.header.count, 3);
        assert_eq!(dataset.objects, objects);
        assert_eq!(dataset.header.universe.low, Vertex::new(-1.0, 0.0, 0.0));
        assert_eq!(dataset.header.universe.high, Vertex::new(1.0, 5.0, 3.0));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_limit_caps_loaded_records() {
        let path = scratch_file("limit");
        write_dataset(&path, ObjectKind::Point, &sample_points()).unwrap();
        let dataset = read_dataset(&path, 2).unwrap();
        assert_eq!(dataset.objects.len(), 2);
        assert_eq!(dataset.header.count, 3);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        let path = scratch_file("truncated");
        write_dataset(&path, ObjectKind::Point, &sample_points()).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[4..]).unwrap();
        assert!(matches!(
            read_dataset(&path, 0),
            Err(JoinError::Dataset { .. })
        ));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let path = scratch_file("missing");
        assert!(matches!(
            read_dataset(&path, 0),
            Err(JoinError::Dataset { .. })
        ));
    }

    #[test]
    fn test_empty_dataset_round_trips() {
        let path = scratch_file("empty");
        write_dataset(&path, ObjectKind::Segment, &[]).unwrap();
        let dataset = read_dataset(&path, 0).unwrap();
        assert_eq!(dataset.header.count, 0);
        assert!(dataset.objects.is_empty());
        assert_eq!(fs::metadata(&path).unwrap().len(), HEADER_SIZE);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_mixed_kinds_rejected_by_writer() {
        let path = scratch_file("mixed");
        let objects = vec![
            SpatialObject::Point(Vertex::new(0.0, 0.0, 0.0)),
            SpatialObject::Sphere(crate::objects::Sphere {
                center: Vertex::new(0.0, 0.0, 0.0),
                radius: 1.0,
            }),
        ];
        assert!(write_dataset(&path, ObjectKind::Point, &objects).is_err());
        let _ = fs::remove_file(&path);
    }
}
