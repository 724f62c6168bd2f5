//! Version and descriptor management.
//!
//! A `Version` is a snapshot of the level-organized table catalog: which
//! table files exist, at which level, and which key range each spans.
//! Point lookups, flush placement, and compaction selection all run
//! against a Version. Descriptor files (`MANIFEST-<number>`) persist a
//! Version so the layout survives a restart.
//!
//! ## Level invariants
//!
//! - Level 0 files may overlap; they are ordered by file number, and a
//!   higher number holds newer data.
//! - Levels 1 and deeper are sorted by smallest user key with no
//!   user-key overlap between neighbors.
//! - For a key present in several levels, the shallower copy is newer.
//!
//! Mutation happens on a private copy (`Version::copy` shares the
//! per-level `Arc` lists), which `VersionSet` swaps in atomically once
//! the change is complete. Readers capture the current `Arc<Version>` at
//! call entry and keep reading their snapshot even while a flush or
//! compaction installs a successor.

use crate::cache::TableCache;
use crate::config::{INITIAL_ALLOW_SEEKS, MAX_MEM_COMPACT_LEVEL, NUM_LEVELS};
use crate::error::{Error, Result};
use crate::filename::{descriptor_file_name, table_file_name};
use crate::memtable::internal_key::{read_i32_le, read_u64_le};
use crate::memtable::{InternalKey, MemTable};
use crate::sstable::SSTableBuilder;
use parking_lot::{Mutex, RwLock};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metadata for one table file in the catalog.
///
/// The bound keys are stored without their payload: only identity
/// (user key, sequence, type) is retained.
#[derive(Debug)]
pub struct FileMetaData {
    number: u64,
    file_size: u64,
    allow_seeks: AtomicU64,
    smallest: InternalKey,
    largest: InternalKey,
}

impl FileMetaData {
    /// Creates metadata for a table spanning `[smallest, largest]`.
    ///
    /// Payloads on the bound keys are dropped; the seek budget starts at
    /// `INITIAL_ALLOW_SEEKS`.
    pub fn new(number: u64, file_size: u64, mut smallest: InternalKey, mut largest: InternalKey) -> Self {
        smallest.clear_user_value();
        largest.clear_user_value();
        Self { number, file_size, allow_seeks: AtomicU64::new(INITIAL_ALLOW_SEEKS), smallest, largest }
    }

    /// The file number.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Size of the table file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Smallest internal key in the table (inclusive).
    pub fn smallest(&self) -> &InternalKey {
        &self.smallest
    }

    /// Largest internal key in the table (inclusive).
    pub fn largest(&self) -> &InternalKey {
        &self.largest
    }

    /// Remaining seek budget.
    pub fn seeks_remaining(&self) -> u64 {
        self.allow_seeks.load(Ordering::Relaxed)
    }

    /// Charges one seek against the budget. Saturates at zero.
    ///
    /// The budget is charged when a lookup probes this table and misses.
    /// Wiring an exhausted budget into compaction selection is left to a
    /// future revision; today the counter is informational.
    pub fn note_seek_miss(&self) {
        let _ = self
            .allow_seeks
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    /// Encodes the metadata to a writer.
    pub fn encode_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.allow_seeks.load(Ordering::Relaxed).to_le_bytes())?;
        w.write_all(&self.file_size.to_le_bytes())?;
        w.write_all(&self.number.to_le_bytes())?;
        self.smallest.encode_to(w)?;
        self.largest.encode_to(w)?;
        Ok(())
    }

    /// Decodes metadata from a reader.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` on short reads or inverted bounds.
    pub fn decode_from<R: Read>(r: &mut R) -> Result<Self> {
        let allow_seeks = read_u64_le(r)?;
        let file_size = read_u64_le(r)?;
        let number = read_u64_le(r)?;
        let smallest = InternalKey::decode_from(r)?;
        let largest = InternalKey::decode_from(r)?;

        if smallest > largest {
            return Err(Error::corruption(format!("file {} has inverted key bounds", number)));
        }

        Ok(Self { number, file_size, allow_seeks: AtomicU64::new(allow_seeks), smallest, largest })
    }
}

impl Clone for FileMetaData {
    fn clone(&self) -> Self {
        Self {
            number: self.number,
            file_size: self.file_size,
            allow_seeks: AtomicU64::new(self.allow_seeks.load(Ordering::Relaxed)),
            smallest: self.smallest.clone(),
            largest: self.largest.clone(),
        }
    }
}

impl PartialEq for FileMetaData {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
            && self.file_size == other.file_size
            && self.seeks_remaining() == other.seeks_remaining()
            && self.smallest == other.smallest
            && self.largest == other.largest
    }
}

impl Eq for FileMetaData {}

/// Binary search for the first file whose largest user key is at or past
/// `user_key`. Returns `files.len()` when every file ends before it.
///
/// `files` must be a sorted, non-overlapping level.
pub fn find_file(files: &[Arc<FileMetaData>], user_key: &[u8]) -> usize {
    let mut left = 0usize;
    let mut right = files.len();
    while left < right {
        let mid = (left + right) / 2;
        if files[mid].largest().user_key() < user_key {
            // Everything at or before mid ends before the key.
            left = mid + 1;
        } else {
            right = mid;
        }
    }
    right
}

/// A snapshot of the table catalog.
pub struct Version {
    table_cache: Arc<TableCache>,
    next_file_number: u64,
    seq: u64,
    pub(crate) files: Vec<Vec<Arc<FileMetaData>>>,
    /// Per-level key at which the next compaction at that level should
    /// start. Not persisted; a restart resets the round-robin.
    pub(crate) compact_pointer: Vec<Option<InternalKey>>,
}

impl Version {
    /// Creates an empty version for the database at `db_path`.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self::with_cache(Arc::new(TableCache::new(db_path)))
    }

    pub(crate) fn with_cache(table_cache: Arc<TableCache>) -> Self {
        Self {
            table_cache,
            next_file_number: 1,
            seq: 0,
            files: vec![Vec::new(); NUM_LEVELS],
            compact_pointer: vec![None; NUM_LEVELS],
        }
    }

    /// Loads a version from descriptor `MANIFEST-<number>` under `db_path`.
    pub fn load(db_path: impl Into<PathBuf>, number: u64) -> Result<Self> {
        let db_path = db_path.into();
        let file = File::open(descriptor_file_name(&db_path, number))?;
        let mut version = Version::new(db_path);
        version.decode_from(&mut BufReader::new(file))?;
        Ok(version)
    }

    /// Serializes this version to a new descriptor file and returns its
    /// number, so the caller can point `CURRENT` at it.
    ///
    /// Durability ordering (fsync) is the manifest collaborator's job.
    pub fn save(&mut self) -> Result<u64> {
        let number = self.allocate_file_number();
        let file = File::create(descriptor_file_name(self.table_cache.db_path(), number))?;
        let mut writer = BufWriter::new(file);
        self.encode_to(&mut writer)?;
        writer.flush()?;
        log::info!("saved descriptor MANIFEST-{:06}", number);
        Ok(number)
    }

    /// Encodes the version to a writer.
    ///
    /// `compact_pointer` and the cache handle are not written.
    pub fn encode_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.next_file_number.to_le_bytes())?;
        w.write_all(&self.seq.to_le_bytes())?;
        for level in 0..NUM_LEVELS {
            w.write_all(&(self.files[level].len() as i32).to_le_bytes())?;
            for meta in &self.files[level] {
                meta.encode_to(w)?;
            }
        }
        Ok(())
    }

    /// Decodes a version from a reader, replacing this version's catalog.
    ///
    /// `compact_pointer` is reset: the round-robin restarts after a load.
    pub fn decode_from<R: Read>(&mut self, r: &mut R) -> Result<()> {
        self.next_file_number = read_u64_le(r)?;
        self.seq = read_u64_le(r)?;
        for level in 0..NUM_LEVELS {
            let count = read_i32_le(r)?;
            if count < 0 {
                return Err(Error::corruption("negative file count in descriptor"));
            }
            let mut files = Vec::with_capacity(count as usize);
            for _ in 0..count {
                files.push(Arc::new(FileMetaData::decode_from(r)?));
            }
            self.files[level] = files;
            self.compact_pointer[level] = None;
        }
        Ok(())
    }

    /// Returns a snapshot sharing the cache handle and file metadata.
    pub fn copy(&self) -> Version {
        Version {
            table_cache: self.table_cache.clone(),
            next_file_number: self.next_file_number,
            seq: self.seq,
            files: self.files.clone(),
            compact_pointer: self.compact_pointer.clone(),
        }
    }

    /// The shared table cache.
    pub fn table_cache(&self) -> &Arc<TableCache> {
        &self.table_cache
    }

    /// Allocates the next file number.
    pub fn allocate_file_number(&mut self) -> u64 {
        let number = self.next_file_number;
        self.next_file_number += 1;
        number
    }

    /// The next file number that will be allocated.
    pub fn next_file_number(&self) -> u64 {
        self.next_file_number
    }

    /// The last sequence number assigned.
    pub fn last_seq(&self) -> u64 {
        self.seq
    }

    /// Assigns and returns the next sequence number.
    pub fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Number of files at `level`.
    pub fn num_level_files(&self, level: usize) -> usize {
        self.files[level].len()
    }

    /// The files at `level`.
    pub fn level_files(&self, level: usize) -> &[Arc<FileMetaData>] {
        &self.files[level]
    }

    /// Whether any file at `level` overlaps the user-key range
    /// `[smallest_key, largest_key]` (inclusive on both ends).
    pub fn overlap_in_level(&self, level: usize, smallest_key: &[u8], largest_key: &[u8]) -> bool {
        let files = &self.files[level];
        if files.is_empty() {
            return false;
        }
        if level == 0 {
            // Level-0 files overlap each other, so check them all.
            files.iter().any(|f| {
                !(smallest_key > f.largest().user_key() || f.smallest().user_key() > largest_key)
            })
        } else {
            let index = find_file(files, smallest_key);
            index < files.len() && largest_key >= files[index].smallest().user_key()
        }
    }

    /// Adds a file to `level`.
    ///
    /// Level 0 appends; deeper levels insert at the sorted position.
    pub fn add_file(&mut self, level: usize, meta: Arc<FileMetaData>) {
        log::debug!(
            "add file {} to level {} [{}..{}]",
            meta.number(),
            level,
            String::from_utf8_lossy(meta.smallest().user_key()),
            String::from_utf8_lossy(meta.largest().user_key()),
        );
        if level == 0 {
            self.files[level].push(meta);
        } else {
            let index = find_file(&self.files[level], meta.smallest().user_key());
            self.files[level].insert(index, meta);
        }
    }

    /// Removes the file with `number` from `level`. No-op when absent.
    pub fn delete_file(&mut self, level: usize, number: u64) {
        if let Some(pos) = self.files[level].iter().position(|f| f.number() == number) {
            self.files[level].remove(pos);
            log::debug!("delete file {} from level {}", number, level);
        }
    }

    /// Point lookup across the catalog.
    ///
    /// Levels are searched shallowest first; entries never hop across
    /// levels, so the first table that knows the key answers for good.
    /// `Ok(Some(value))` is a live value, `Ok(None)` means absent or
    /// deleted (a tombstone in a shallow level shadows older values
    /// below it).
    pub fn get(&self, user_key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut level0 = Vec::new();
        for level in 0..NUM_LEVELS {
            let files = &self.files[level];
            if files.is_empty() {
                continue;
            }

            let candidates: &[Arc<FileMetaData>] = if level == 0 {
                // Level-0 files may overlap each other. Collect all files
                // containing the key and probe newest first.
                level0.clear();
                level0.extend(
                    files
                        .iter()
                        .filter(|f| {
                            user_key >= f.smallest().user_key()
                                && user_key <= f.largest().user_key()
                        })
                        .cloned(),
                );
                level0.sort_by(|a, b| b.number().cmp(&a.number()));
                &level0
            } else {
                let index = find_file(files, user_key);
                if index >= files.len() || user_key < files[index].smallest().user_key() {
                    continue;
                }
                std::slice::from_ref(&files[index])
            };

            for f in candidates {
                match self.table_cache.get(f.number(), user_key) {
                    Ok(value) => return Ok(value),
                    Err(e) if e.is_not_found() => f.note_seek_miss(),
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(None)
    }

    /// Flushes an immutable memtable into a new table file and installs
    /// it in the catalog.
    ///
    /// An empty memtable is a no-op: no file number is allocated and the
    /// version is unchanged. The destination starts at level 0; when the
    /// new table overlaps nothing there, it is pushed down as far as
    /// `MAX_MEM_COMPACT_LEVEL`, stopping above the first level whose
    /// child would overlap.
    pub fn write_level0_table(&mut self, imm: &MemTable) -> Result<()> {
        let mut iter = imm.iter();
        let first = match iter.next() {
            Some(key) => key,
            None => return Ok(()),
        };

        let number = self.allocate_file_number();
        let mut builder =
            SSTableBuilder::new(table_file_name(self.table_cache.db_path(), number))?;

        builder.add(&first)?;
        let mut last = first.clone();
        for key in iter {
            builder.add(&key)?;
            last = key;
        }
        let file_size = builder.finish()?;
        let meta = Arc::new(FileMetaData::new(number, file_size, first, last));

        let mut level = 0;
        if !self.overlap_in_level(0, meta.smallest().user_key(), meta.largest().user_key()) {
            while level < MAX_MEM_COMPACT_LEVEL
                && !self.overlap_in_level(
                    level + 1,
                    meta.smallest().user_key(),
                    meta.largest().user_key(),
                )
            {
                level += 1;
            }
        }

        log::info!("flushed memtable to table {} at level {} ({} bytes)", number, level, file_size);
        self.add_file(level, meta);
        Ok(())
    }
}

/// Copy-on-write holder of the current version.
///
/// Each flush or compaction copies the current version, mutates the copy,
/// and installs it atomically; at most one mutation runs at a time.
/// Readers take an `Arc` snapshot and are never blocked by mutators.
pub struct VersionSet {
    current: RwLock<Arc<Version>>,
    mutation: Mutex<()>,
}

impl VersionSet {
    /// Creates a version set over an empty catalog.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self::from_version(Version::new(db_path))
    }

    /// Creates a version set from descriptor `MANIFEST-<number>`.
    pub fn load(db_path: impl Into<PathBuf>, number: u64) -> Result<Self> {
        Ok(Self::from_version(Version::load(db_path, number)?))
    }

    fn from_version(version: Version) -> Self {
        Self { current: RwLock::new(Arc::new(version)), mutation: Mutex::new(()) }
    }

    /// Snapshot of the current version.
    pub fn current(&self) -> Arc<Version> {
        self.current.read().clone()
    }

    /// Point lookup against the current version.
    pub fn get(&self, user_key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.current().get(user_key)
    }

    /// Flushes a memtable and installs the resulting version.
    pub fn flush_memtable(&self, imm: &MemTable) -> Result<()> {
        let _guard = self.mutation.lock();
        let mut next = self.current().copy();
        next.write_level0_table(imm)?;
        self.install(next);
        Ok(())
    }

    /// Runs one round of compaction if any level is over budget.
    ///
    /// Returns `true` when a compaction ran and its result was installed.
    pub fn compact(&self) -> Result<bool> {
        let _guard = self.mutation.lock();
        let mut next = self.current().copy();
        if next.do_compaction_work()? {
            self.install(next);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Persists the current version to a new descriptor and returns its
    /// number.
    pub fn save(&self) -> Result<u64> {
        let _guard = self.mutation.lock();
        let mut next = self.current().copy();
        let number = next.save()?;
        self.install(next);
        Ok(number)
    }

    fn install(&self, version: Version) {
        *self.current.write() = Arc::new(version);
    }
}
