//! ## Result Pairs
//!
//! Append-only buffer for the pairs produced by a join. Pairs are stored in
//! canonical order (A-side entry first); adding does not check uniqueness,
//! and replication-based algorithms rely on [`ResultPairs::deduplicate`] to
//! collapse repeats once at the end of the run.

use crate::entry::{EntryId, Side, TreeEntry};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::debug;

/// The set of intersecting pairs found by a join.
#[derive(Debug, Default)]
pub struct ResultPairs {
    pairs: Vec<(EntryId, EntryId)>,
    /// Number of pairs collapsed by the last de-duplication pass.
    pub duplicates: u64,
    /// Time spent de-duplicating.
    pub dedup_time: Duration,
}

impl ResultPairs {
    pub fn new() -> Self {
        ResultPairs::default()
    }

    /// Appends a pair, swapping so the A-side entry comes first.
    pub fn add_pair(&mut self, a: EntryId, b: EntryId, entries: &[TreeEntry]) {
        if entries[a].side == Side::A {
            self.pairs.push((a, b));
        } else {
            self.pairs.push((b, a));
        }
    }

    /// Number of pairs currently buffered.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(EntryId, EntryId)] {
        &self.pairs
    }

    /// Discards everything, including the duplicate counter.
    pub fn clear(&mut self) {
        self.pairs.clear();
        self.duplicates = 0;
    }

    /// Collapses duplicate pairs via a hash set and rewrites the buffer in
    /// ascending id order, so the final ordering is deterministic for a
    /// given input. Idempotent.
    pub fn deduplicate(&mut self) {
        let start = Instant::now();
        let unique: HashSet<(EntryId, EntryId)> = self.pairs.iter().copied().collect();
        self.duplicates = (self.pairs.len() - unique.len()) as u64;
        let mut sorted: Vec<(EntryId, EntryId)> = unique.into_iter().collect();
        sorted.sort_unstable();
        debug!(
            "De-duplicated {} pairs down to {}",
            self.pairs.len(),
            sorted.len()
        );
        self.pairs = sorted;
        self.dedup_time += start.elapsed();
    }
}
