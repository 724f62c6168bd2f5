//! LRU cache of open SSTable readers.
//!
//! Every table read in the engine goes through this cache, which bounds
//! the number of open table files to `MAX_OPEN_FILES` minus the handles
//! reserved for non-table use.

use crate::config;
use crate::error::Result;
use crate::filename::table_file_name;
use crate::sstable::{SSTableIterator, SSTableReader};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Statistics for cache performance monitoring.
#[derive(Debug, Clone, Default)]
pub struct TableCacheStats {
    /// Total number of cache lookups
    pub lookups: u64,
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of tables opened and inserted
    pub insertions: u64,
    /// Number of evictions
    pub evictions: u64,
}

impl TableCacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

struct CacheInner {
    /// Open readers keyed by file number
    tables: HashMap<u64, Arc<SSTableReader>>,
    /// LRU queue (most recently used at the back)
    lru_queue: VecDeque<u64>,
}

/// Thread-safe bounded LRU mapping file number to an open table reader.
///
/// The mutex covers lookup and insertion, including the open itself:
/// concurrent misses for the same file serialize instead of both opening
/// it. Table reads happen outside the mutex on the shared
/// `Arc<SSTableReader>`, and eviction only drops the cache's reference,
/// so a reader (or an iterator taken from it) held by a caller stays
/// usable.
pub struct TableCache {
    db_path: PathBuf,
    capacity: usize,
    inner: Mutex<CacheInner>,
    stats: Mutex<TableCacheStats>,
}

impl TableCache {
    /// Creates a cache for tables under `db_path` with the default
    /// capacity.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(db_path, config::table_cache_capacity())
    }

    /// Creates a cache with an explicit capacity.
    pub fn with_capacity(db_path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            db_path: db_path.into(),
            capacity,
            inner: Mutex::new(CacheInner { tables: HashMap::new(), lru_queue: VecDeque::new() }),
            stats: Mutex::new(TableCacheStats::default()),
        }
    }

    /// The database directory this cache opens tables from.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Returns the open reader for `number`, opening and caching it on a
    /// miss.
    ///
    /// # Errors
    ///
    /// An open failure is returned to the caller and nothing is inserted.
    pub fn find_table(&self, number: u64) -> Result<Arc<SSTableReader>> {
        let mut inner = self.inner.lock();

        if let Some(table) = inner.tables.get(&number) {
            let table = table.clone();
            if let Some(pos) = inner.lru_queue.iter().position(|n| *n == number) {
                inner.lru_queue.remove(pos);
            }
            inner.lru_queue.push_back(number);

            let mut stats = self.stats.lock();
            stats.lookups += 1;
            stats.hits += 1;
            return Ok(table);
        }

        let table = match SSTableReader::open(table_file_name(&self.db_path, number)) {
            Ok(t) => Arc::new(t),
            Err(e) => {
                log::warn!("failed to open table {}: {}", number, e);
                let mut stats = self.stats.lock();
                stats.lookups += 1;
                stats.misses += 1;
                return Err(e);
            }
        };

        inner.tables.insert(number, table.clone());
        inner.lru_queue.push_back(number);

        let mut evictions = 0;
        while inner.tables.len() > self.capacity {
            if let Some(oldest) = inner.lru_queue.pop_front() {
                inner.tables.remove(&oldest);
                evictions += 1;
            } else {
                break;
            }
        }

        let mut stats = self.stats.lock();
        stats.lookups += 1;
        stats.misses += 1;
        stats.insertions += 1;
        stats.evictions += evictions;

        Ok(table)
    }

    /// Point lookup through the cached reader for `number`.
    pub fn get(&self, number: u64, user_key: &[u8]) -> Result<Option<Vec<u8>>> {
        let table = self.find_table(number)?;
        table.get(user_key)
    }

    /// Returns a fresh iterator over the table with the given number.
    pub fn new_iterator(&self, number: u64) -> Result<SSTableIterator> {
        let table = self.find_table(number)?;
        table.new_iterator()
    }

    /// Removes the entry for `number`, if present. Outstanding references
    /// keep the reader alive until dropped.
    pub fn evict(&self, number: u64) {
        let mut inner = self.inner.lock();
        if inner.tables.remove(&number).is_some() {
            if let Some(pos) = inner.lru_queue.iter().position(|n| *n == number) {
                inner.lru_queue.remove(pos);
            }
            self.stats.lock().evictions += 1;
        }
    }

    /// Number of open tables currently cached.
    pub fn len(&self) -> usize {
        self.inner.lock().tables.len()
    }

    /// Returns `true` if no tables are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current cache statistics.
    pub fn stats(&self) -> TableCacheStats {
        self.stats.lock().clone()
    }
}
