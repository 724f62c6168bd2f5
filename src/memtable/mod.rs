//! # MemTable - In-Memory Sorted Table
//!
//! The MemTable is an in-memory data structure that stores recent writes
//! until they are flushed to a level-0 SSTable. It is a collaborator of
//! the version/compaction core: the flush path only needs its in-order
//! iterator.
//!
//! ## Design
//!
//! - Based on crossbeam-skiplist for lock-free concurrent access
//! - Supports Put, Get, and Delete (via tombstone) operations
//! - Tracks size to determine when to flush to disk
//! - The iterator yields full internal keys (payload included) in
//!   internal-key order, which is exactly what the table builder wants

pub(crate) mod internal_key;

pub use internal_key::{InternalKey, ValueType};

use crossbeam_skiplist::SkipMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// MemTable stores recent writes in memory using a skiplist keyed by
/// internal key.
///
/// Sequence numbers come from the caller (`Version::next_seq`); the
/// memtable itself assigns nothing.
pub struct MemTable {
    /// The underlying skiplist storing InternalKey -> value
    data: Arc<SkipMap<InternalKey, Vec<u8>>>,

    /// Approximate size in bytes (keys + values)
    size: AtomicUsize,
}

impl MemTable {
    /// Creates a new empty MemTable.
    pub fn new() -> Self {
        Self { data: Arc::new(SkipMap::new()), size: AtomicUsize::new(0) }
    }

    /// Inserts a key-value pair.
    pub fn put(&self, key: &[u8], value: &[u8], sequence: u64) {
        let internal_key = InternalKey::new(key.to_vec(), sequence, ValueType::Value);
        let value_vec = value.to_vec();

        let entry_size = internal_key.user_key().len() + value_vec.len() + 16;

        self.data.insert(internal_key, value_vec);
        self.size.fetch_add(entry_size, Ordering::Relaxed);
    }

    /// Marks a key as deleted by inserting a tombstone.
    pub fn delete(&self, key: &[u8], sequence: u64) {
        let internal_key = InternalKey::new(key.to_vec(), sequence, ValueType::Deletion);

        let entry_size = internal_key.user_key().len() + 16;

        self.data.insert(internal_key, Vec::new());
        self.size.fetch_add(entry_size, Ordering::Relaxed);
    }

    /// Retrieves the value for a key.
    ///
    /// The lookup finds the entry with the highest sequence number
    /// `<= max_sequence` for the user key. Returns `None` if the key is
    /// absent or its newest visible entry is a tombstone.
    pub fn get(&self, key: &[u8], max_sequence: u64) -> Option<Vec<u8>> {
        // Entries for one user key sort newest-first, so a range scan from
        // (key, u64::MAX) up to the next user key visits versions in
        // descending sequence order.
        let lower_bound = InternalKey::new(key.to_vec(), u64::MAX, ValueType::Value);

        let mut upper_key = key.to_vec();
        upper_key.push(0);
        let upper_bound = InternalKey::new(upper_key, u64::MAX, ValueType::Value);

        let range = self.data.range(lower_bound..upper_bound);

        for entry in range {
            let internal_key = entry.key();
            if internal_key.user_key() == key && internal_key.sequence() <= max_sequence {
                match internal_key.value_type() {
                    ValueType::Value => return Some(entry.value().clone()),
                    ValueType::Deletion => return None,
                }
            }
        }

        None
    }

    /// Returns the approximate size of the MemTable in bytes.
    pub fn approximate_size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Returns the number of entries in the MemTable.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the MemTable contains no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns an iterator yielding internal keys (payload attached) in
    /// ascending internal-key order.
    pub fn iter(&self) -> MemTableIterator {
        MemTableIterator::new(self.data.clone())
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over MemTable entries in internal-key order.
pub struct MemTableIterator {
    _data: Arc<SkipMap<InternalKey, Vec<u8>>>,
    iter: crossbeam_skiplist::map::Iter<'static, InternalKey, Vec<u8>>,
}

impl MemTableIterator {
    fn new(data: Arc<SkipMap<InternalKey, Vec<u8>>>) -> Self {
        // SAFETY: the Arc held alongside the iterator keeps the SkipMap
        // alive for the iterator's lifetime.
        let iter = unsafe {
            std::mem::transmute::<
                crossbeam_skiplist::map::Iter<'_, InternalKey, Vec<u8>>,
                crossbeam_skiplist::map::Iter<'static, InternalKey, Vec<u8>>,
            >(data.iter())
        };

        Self { _data: data, iter }
    }
}

impl Iterator for MemTableIterator {
    type Item = InternalKey;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|entry| entry.key().clone().with_value(entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let memtable = MemTable::new();
        memtable.put(b"key1", b"value1", 1);

        assert_eq!(memtable.get(b"key1", 100), Some(b"value1".to_vec()));
        assert_eq!(memtable.get(b"missing", 100), None);
    }

    #[test]
    fn test_get_respects_max_sequence() {
        let memtable = MemTable::new();
        memtable.put(b"key", b"old", 5);
        memtable.put(b"key", b"new", 10);

        assert_eq!(memtable.get(b"key", 100), Some(b"new".to_vec()));
        assert_eq!(memtable.get(b"key", 7), Some(b"old".to_vec()));
        assert_eq!(memtable.get(b"key", 4), None);
    }

    #[test]
    fn test_delete_shadows_value() {
        let memtable = MemTable::new();
        memtable.put(b"key", b"value", 1);
        memtable.delete(b"key", 2);

        assert_eq!(memtable.get(b"key", 100), None);
        // The old version is still visible below the tombstone's sequence.
        assert_eq!(memtable.get(b"key", 1), Some(b"value".to_vec()));
    }

    #[test]
    fn test_iterator_order_and_payload() {
        let memtable = MemTable::new();
        memtable.put(b"b", b"2", 2);
        memtable.put(b"a", b"1", 1);
        memtable.put(b"c", b"3", 3);

        let keys: Vec<InternalKey> = memtable.iter().collect();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[0].user_key(), b"a");
        assert_eq!(keys[0].user_value(), b"1");
        assert_eq!(keys[1].user_key(), b"b");
        assert_eq!(keys[2].user_key(), b"c");
    }

    #[test]
    fn test_iterator_newest_version_first() {
        let memtable = MemTable::new();
        memtable.put(b"k", b"v1", 1);
        memtable.put(b"k", b"v2", 2);

        let keys: Vec<InternalKey> = memtable.iter().collect();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].sequence(), 2);
        assert_eq!(keys[0].user_value(), b"v2");
        assert_eq!(keys[1].sequence(), 1);
    }

    #[test]
    fn test_size_tracking() {
        let memtable = MemTable::new();
        assert!(memtable.is_empty());
        assert_eq!(memtable.approximate_size(), 0);

        memtable.put(b"key", b"value", 1);
        assert_eq!(memtable.len(), 1);
        assert!(memtable.approximate_size() > 0);
    }
}
