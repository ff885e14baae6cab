//! ## External Sort
//!
//! Budgeted merge sort over streams of fixed-size records, keyed by one axis
//! of either the object center or the MBR lower corner (the remaining axes
//! break ties). Records are buffered in memory until the configured budget
//! is reached; after that, sorted runs spill to temporary files and the
//! output is a k-way merge over the runs. Below the budget everything stays
//! in memory.
//!
//! A [`RecordCodec`] decides what a record is: whole spatial objects
//! ([`ObjectCodec`]) for dataset streams, or bare entry ids keyed through
//! the entry arena ([`EntryIdCodec`]) for the join algorithms, which keep
//! the entries themselves in memory.
//!
//! The sorter performs blocking disk I/O during spill and merge; it is
//! invoked from the build phase of the non-hierarchical join algorithms when
//! a sort footprint exceeds the in-memory budget.

use crate::entry::{EntryId, TreeEntry};
use crate::errors::JoinError;
use crate::geometry::{Scalar, Vertex, DIMENSION};
use crate::objects::{ObjectKind, SpatialObject};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The key a sorter orders by; the remaining axes break ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Object center coordinate along the given axis.
    Center(usize),
    /// Lower MBR corner along the given axis.
    MbrLow(usize),
}

type KeyTuple = (
    OrderedFloat<Scalar>,
    OrderedFloat<Scalar>,
    OrderedFloat<Scalar>,
);

fn key_from_point(point: &Vertex, first: usize) -> KeyTuple {
    (
        OrderedFloat(point[first % DIMENSION]),
        OrderedFloat(point[(first + 1) % DIMENSION]),
        OrderedFloat(point[(first + 2) % DIMENSION]),
    )
}

/// Fixed-size record serialization plus sort-key extraction.
pub trait RecordCodec {
    type Item;

    /// Serialized size of one record, constant per sorter.
    fn record_size(&self) -> u32;

    fn write<W: Write>(&self, item: &Self::Item, writer: &mut W) -> Result<(), JoinError>;

    fn read<R: Read>(&self, reader: &mut R) -> Result<Self::Item, JoinError>;

    fn key(&self, item: &Self::Item) -> KeyTuple;
}

/// Records are whole spatial objects of one kind.
pub struct ObjectCodec {
    pub kind: ObjectKind,
    pub key: SortKey,
}

impl RecordCodec for ObjectCodec {
    type Item = SpatialObject;

    fn record_size(&self) -> u32 {
        self.kind.byte_size()
    }

    fn write<W: Write>(&self, item: &SpatialObject, writer: &mut W) -> Result<(), JoinError> {
        debug_assert_eq!(item.kind(), self.kind);
        item.write_to(writer)
    }

    fn read<R: Read>(&self, reader: &mut R) -> Result<SpatialObject, JoinError> {
        SpatialObject::read_from(self.kind, reader)
    }

    fn key(&self, item: &SpatialObject) -> KeyTuple {
        match self.key {
            SortKey::Center(axis) => key_from_point(&item.center(), axis),
            SortKey::MbrLow(axis) => key_from_point(&item.mbr().low, axis),
        }
    }
}

/// Records are entry ids; keys come from the arena, which stays in memory.
pub struct EntryIdCodec<'a> {
    pub entries: &'a [TreeEntry],
    pub key: SortKey,
}

impl RecordCodec for EntryIdCodec<'_> {
    type Item = EntryId;

    fn record_size(&self) -> u32 {
        std::mem::size_of::<u64>() as u32
    }

    fn write<W: Write>(&self, item: &EntryId, writer: &mut W) -> Result<(), JoinError> {
        writer.write_all(&(*item as u64).to_le_bytes())?;
        Ok(())
    }

    fn read<R: Read>(&self, reader: &mut R) -> Result<EntryId, JoinError> {
        let mut bytes = [0u8; 8];
        reader.read_exact(&mut bytes)?;
        Ok(u64::from_le_bytes(bytes) as EntryId)
    }

    fn key(&self, item: &EntryId) -> KeyTuple {
        let entry = &self.entries[*item];
        match self.key {
            SortKey::Center(axis) => key_from_point(&entry.object.center(), axis),
            SortKey::MbrLow(axis) => key_from_point(&entry.mbr.low, axis),
        }
    }
}

/// Owns the spilled run files; removes them when dropped.
struct RunSet {
    paths: Vec<PathBuf>,
}

impl RunSet {
    fn take(&mut self) -> Vec<PathBuf> {
        std::mem::take(&mut self.paths)
    }
}

impl Drop for RunSet {
    fn drop(&mut self) {
        for path in &self.paths {
            let _ = fs::remove_file(path);
        }
    }
}

/// Spill-to-disk merge sorter.
pub struct ExternalSort<C: RecordCodec> {
    codec: C,
    /// Maximum number of records held in memory; 0 disables spilling.
    max_in_memory: usize,
    buffer: Vec<C::Item>,
    runs: RunSet,
    count: u64,
}

impl<C: RecordCodec> ExternalSort<C> {
    pub fn new(codec: C, max_in_memory: usize) -> Self {
        ExternalSort {
            codec,
            max_in_memory,
            buffer: Vec::new(),
            runs: RunSet { paths: Vec::new() },
            count: 0,
        }
    }

    /// Number of records inserted so far.
    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// True once at least one run has spilled to disk.
    pub fn out_of_core(&self) -> bool {
        !self.runs.paths.is_empty()
    }

    pub fn insert(&mut self, item: C::Item) -> Result<(), JoinError> {
        self.count += 1;
        self.buffer.push(item);
        if self.max_in_memory > 0 && self.buffer.len() >= self.max_in_memory {
            self.spill_run()?;
        }
        Ok(())
    }

    fn run_path() -> PathBuf {
        let n = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("sjoin-sort-{}-{n}.run", std::process::id()))
    }

    fn sort_buffer(&mut self) {
        let codec = &self.codec;
        self.buffer.sort_by_key(|item| codec.key(item));
    }

    fn spill_run(&mut self) -> Result<(), JoinError> {
        self.sort_buffer();
        let path = Self::run_path();
        let mut writer = BufWriter::new(File::create(&path)?);
        for item in self.buffer.drain(..) {
            self.codec.write(&item, &mut writer)?;
        }
        writer.flush()?;
        debug!("Spilled sorted run to {}", path.display());
        self.runs.paths.push(path);
        Ok(())
    }

    /// Sorts everything inserted so far and returns the output stream.
    pub fn finish(mut self) -> Result<SortedRecords<C>, JoinError> {
        if self.runs.paths.is_empty() {
            self.sort_buffer();
            let buffer = std::mem::take(&mut self.buffer);
            return Ok(SortedRecords::InMemory(buffer.into_iter()));
        }

        if !self.buffer.is_empty() {
            self.spill_run()?;
        }
        info!("Merging {} spilled runs", self.runs.paths.len());

        let record_size = self.codec.record_size() as u64;
        let mut readers = Vec::with_capacity(self.runs.paths.len());
        let mut heap = BinaryHeap::new();
        for (run, path) in self.runs.paths.iter().enumerate() {
            let mut reader = RunReader {
                reader: BufReader::new(File::open(path)?),
                remaining: fs::metadata(path)?.len() / record_size,
            };
            if let Some(item) = reader.next_record(&self.codec)? {
                heap.push(Reverse((self.codec.key(&item), run, Unordered(item))));
            }
            readers.push(reader);
        }

        let paths = self.runs.take();
        Ok(SortedRecords::Merged(MergeState {
            codec: self.codec,
            readers,
            heap,
            paths,
        }))
    }
}

struct RunReader {
    reader: BufReader<File>,
    remaining: u64,
}

impl RunReader {
    fn next_record<C: RecordCodec>(&mut self, codec: &C) -> Result<Option<C::Item>, JoinError> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        codec.read(&mut self.reader).map(Some)
    }
}

/// Wrapper giving heap entries a total order on the key alone.
struct Unordered<T>(T);

impl<T> PartialEq for Unordered<T> {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}
impl<T> Eq for Unordered<T> {}
impl<T> PartialOrd for Unordered<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Unordered<T> {
    fn cmp(&self, _: &Self) -> std::cmp::Ordering {
        std::cmp::Ordering::Equal
    }
}

/// K-way merge state over the spilled runs.
pub struct MergeState<C: RecordCodec> {
    codec: C,
    readers: Vec<RunReader>,
    heap: BinaryHeap<Reverse<(KeyTuple, usize, Unordered<C::Item>)>>,
    paths: Vec<PathBuf>,
}

impl<C: RecordCodec> Drop for MergeState<C> {
    fn drop(&mut self) {
        for path in &self.paths {
            let _ = fs::remove_file(path);
        }
    }
}

/// Sorted output stream of [`ExternalSort::finish`].
pub enum SortedRecords<C: RecordCodec> {
    InMemory(std::vec::IntoIter<C::Item>),
    Merged(MergeState<C>),
}

impl<C: RecordCodec> Iterator for SortedRecords<C> {
    type Item = Result<C::Item, JoinError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            SortedRecords::InMemory(iter) => iter.next().map(Ok),
            SortedRecords::Merged(state) => {
                let Reverse((_, run, Unordered(item))) = state.heap.pop()?;
                match state.readers[run].next_record(&state.codec) {
                    Ok(Some(next)) => {
                        let key = state.codec.key(&next);
                        state.heap.push(Reverse((key, run, Unordered(next))));
                    }
                    Ok(None) => {}
                    Err(err) => return Some(Err(err)),
                }
                Some(Ok(item))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Side;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_points(n: usize, seed: u64) -> Vec<SpatialObject> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                SpatialObject::Point(Vertex::new(
                    rng.gen_range(-100.0..100.0),
                    rng.gen_range(-100.0..100.0),
                    rng.gen_range(-100.0..100.0),
                ))
            })
            .collect()
    }

    fn sort_objects(
        objects: &[SpatialObject],
        key: SortKey,
        budget: usize,
    ) -> Vec<SpatialObject> {
        let codec = ObjectCodec {
            kind: ObjectKind::Point,
            key,
        };
        let mut sorter = ExternalSort::new(codec, budget);
        for object in objects {
            sorter.insert(*object).unwrap();
        }
        sorter
            .finish()
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_in_memory_sort_orders_by_key() {
        let objects = random_points(200, 1);
        let sorted = sort_objects(&objects, SortKey::Center(0), 0);
        assert_eq!(sorted.len(), objects.len());
        for pair in sorted.windows(2) {
            assert!(pair[0].center()[0] <= pair[1].center()[0]);
        }
    }

    #[test]
    fn test_spilled_sort_matches_in_memory() {
        let objects = random_points(500, 2);
        let reference = sort_objects(&objects, SortKey::Center(1), 0);
        let spilled = sort_objects(&objects, SortKey::Center(1), 32);
        assert_eq!(reference, spilled);
    }

    #[test]
    fn test_spill_is_triggered_by_budget() {
        let codec = ObjectCodec {
            kind: ObjectKind::Point,
            key: SortKey::Center(0),
        };
        let mut sorter = ExternalSort::new(codec, 8);
        for object in random_points(20, 3) {
            sorter.insert(object).unwrap();
        }
        assert!(sorter.out_of_core());
        let sorted: Vec<_> = sorter
            .finish()
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(sorted.len(), 20);
    }

    #[test]
    fn test_entry_id_codec_sorts_ids_by_mbr_low() {
        let entries: Vec<TreeEntry> = random_points(100, 4)
            .into_iter()
            .enumerate()
            .map(|(i, object)| TreeEntry::new(object, Side::A, i as u32, 0.5))
            .collect();
        let ids: Vec<EntryId> = (0..entries.len()).collect();

        let codec = EntryIdCodec {
            entries: &entries,
            key: SortKey::MbrLow(0),
        };
        let mut sorter = ExternalSort::new(codec, 16);
        for &id in &ids {
            sorter.insert(id).unwrap();
        }
        assert!(sorter.out_of_core());
        let sorted: Vec<EntryId> = sorter
            .finish()
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(sorted.len(), entries.len());
        for pair in sorted.windows(2) {
            assert!(entries[pair[0]].mbr.low[0] <= entries[pair[1]].mbr.low[0]);
        }
    }

    #[test]
    fn test_empty_sorter_yields_nothing() {
        let codec = ObjectCodec {
            kind: ObjectKind::Point,
            key: SortKey::Center(2),
        };
        let sorter = ExternalSort::new(codec, 4);
        let sorted: Vec<_> = sorter
            .finish()
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert!(sorted.is_empty());
    }
}
