//! Multi-way merge iterator for compaction.
//!
//! This module provides an iterator that merges multiple SSTable iterators
//! into a single stream in internal-key order.
//!
//! The internal-key ordering breaks user-key ties by descending sequence,
//! so the merged stream yields the newest version of each user key first.
//! Compaction's dedup rule depends on that: it keeps the first record it
//! sees per user key and drops the rest.

use crate::memtable::InternalKey;
use crate::sstable::SSTableIterator;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Entry in the merge heap
struct MergeEntry {
    key: InternalKey,
    iterator_index: usize,
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.iterator_index == other.iterator_index
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for a min-heap (smallest internal key first).
        // Equal keys break ties by iterator index for determinism.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.iterator_index.cmp(&self.iterator_index))
    }
}

/// N-way merge over SSTable iterators in internal-key order.
///
/// Each input must itself be sorted in ascending internal-key order,
/// which table iterators guarantee.
pub struct MergingIterator {
    iterators: Vec<SSTableIterator>,
    heap: BinaryHeap<MergeEntry>,
    current: Option<InternalKey>,
}

impl MergingIterator {
    /// Creates a merging iterator over the given inputs. Call
    /// [`seek_to_first`](MergingIterator::seek_to_first) before reading.
    pub fn new(iterators: Vec<SSTableIterator>) -> Self {
        Self { iterators, heap: BinaryHeap::new(), current: None }
    }

    /// Positions the stream on the smallest key across all inputs.
    pub fn seek_to_first(&mut self) {
        self.heap.clear();
        for (index, iter) in self.iterators.iter_mut().enumerate() {
            iter.seek_to_first();
            if let Some(key) = iter.internal_key() {
                self.heap.push(MergeEntry { key: key.clone(), iterator_index: index });
            }
        }
        self.pull_next();
    }

    /// Advances to the next key in merged order. No-op once exhausted.
    pub fn next(&mut self) {
        if self.current.is_some() {
            self.pull_next();
        }
    }

    /// Returns `true` while the stream is positioned on a key.
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// The key the stream is positioned on, or `None` when exhausted.
    pub fn internal_key(&self) -> Option<&InternalKey> {
        self.current.as_ref()
    }

    fn pull_next(&mut self) {
        match self.heap.pop() {
            Some(entry) => {
                let iter = &mut self.iterators[entry.iterator_index];
                iter.next();
                if let Some(key) = iter.internal_key() {
                    self.heap
                        .push(MergeEntry { key: key.clone(), iterator_index: entry.iterator_index });
                }
                self.current = Some(entry.key);
            }
            None => self.current = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memtable::ValueType;
    use crate::sstable::{SSTableBuilder, SSTableReader};
    use tempfile::TempDir;

    fn key(user_key: &[u8], seq: u64, value: &[u8]) -> InternalKey {
        InternalKey::new(user_key.to_vec(), seq, ValueType::Value).with_value(value.to_vec())
    }

    fn table_iter(dir: &TempDir, name: &str, keys: &[InternalKey]) -> SSTableIterator {
        let path = dir.path().join(name);
        let mut builder = SSTableBuilder::new(&path).unwrap();
        for k in keys {
            builder.add(k).unwrap();
        }
        builder.finish().unwrap();
        SSTableReader::open(&path).unwrap().new_iterator().unwrap()
    }

    fn collect(mut iter: MergingIterator) -> Vec<InternalKey> {
        let mut out = Vec::new();
        iter.seek_to_first();
        while let Some(k) = iter.internal_key() {
            out.push(k.clone());
            iter.next();
        }
        out
    }

    #[test]
    fn test_merge_interleaved_tables() {
        let dir = TempDir::new().unwrap();
        let t1 = table_iter(
            &dir,
            "1.sst",
            &[key(b"a", 1, b"1"), key(b"c", 3, b"3"), key(b"e", 5, b"5")],
        );
        let t2 = table_iter(
            &dir,
            "2.sst",
            &[key(b"b", 2, b"2"), key(b"d", 4, b"4"), key(b"f", 6, b"6")],
        );

        let merged = collect(MergingIterator::new(vec![t1, t2]));

        let user_keys: Vec<Vec<u8>> = merged.iter().map(|k| k.user_key().to_vec()).collect();
        assert_eq!(
            user_keys,
            vec![
                b"a".to_vec(),
                b"b".to_vec(),
                b"c".to_vec(),
                b"d".to_vec(),
                b"e".to_vec(),
                b"f".to_vec()
            ]
        );
        assert_eq!(merged[2].user_value(), b"3");
    }

    #[test]
    fn test_merge_newest_version_comes_first() {
        let dir = TempDir::new().unwrap();
        let newer = table_iter(&dir, "1.sst", &[key(b"k", 20, b"v2")]);
        let older = table_iter(&dir, "2.sst", &[key(b"k", 10, b"v1")]);

        // Input order must not matter: the sequence tiebreak decides.
        let merged = collect(MergingIterator::new(vec![older, newer]));

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].sequence(), 20);
        assert_eq!(merged[0].user_value(), b"v2");
        assert_eq!(merged[1].sequence(), 10);
    }

    #[test]
    fn test_merge_many_tables_globally_sorted() {
        let dir = TempDir::new().unwrap();
        let mut iters = Vec::new();
        for i in 0..5u64 {
            let keys: Vec<InternalKey> = (0..20u64)
                .map(|j| key(format!("key{:04}", j * 5 + i).as_bytes(), j * 5 + i + 1, b"v"))
                .collect();
            iters.push(table_iter(&dir, &format!("{}.sst", i), &keys));
        }

        let merged = collect(MergingIterator::new(iters));
        assert_eq!(merged.len(), 100);
        for pair in merged.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_merge_with_empty_table() {
        let dir = TempDir::new().unwrap();
        let t1 = table_iter(&dir, "1.sst", &[key(b"a", 1, b"1")]);
        let t2 = table_iter(&dir, "2.sst", &[]);

        let merged = collect(MergingIterator::new(vec![t1, t2]));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].user_key(), b"a");
    }

    #[test]
    fn test_merge_no_inputs() {
        let mut iter = MergingIterator::new(Vec::new());
        iter.seek_to_first();
        assert!(!iter.valid());
        assert!(iter.internal_key().is_none());
    }
}
