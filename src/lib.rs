//! # RiftKV - Version and Compaction Core of an LSM-Tree Storage Engine
//!
//! RiftKV is the heart of a log-structured merge-tree key-value engine:
//! the immutable, level-organized catalog of SSTable files, point lookups
//! over that catalog, and the background compaction that reshapes it.
//!
//! ## Architecture
//!
//! - **Version**: A snapshot of the level-to-files mapping. Flushes and
//!   compactions produce a new version; readers keep their snapshot.
//! - **VersionSet**: Copy-on-write holder of the current version.
//! - **Compaction**: Scores the levels, merges the chosen input tables
//!   through a multi-way merge, and swaps outputs for inputs.
//! - **TableCache**: Bounded LRU of open table readers, protecting the
//!   process's open-file budget.
//! - **MemTable**: In-memory sorted table of recent writes, flushed into
//!   level-0 tables (collaborator of the core).
//! - **SSTable**: Immutable sorted file of internal keys (collaborator).
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use riftkv::{MemTable, VersionSet};
//!
//! # fn main() -> Result<(), riftkv::Error> {
//! let versions = VersionSet::new("./data");
//!
//! let memtable = MemTable::new();
//! memtable.put(b"key1", b"value1", 1);
//! memtable.put(b"key2", b"value2", 2);
//!
//! // Flush recent writes into a level-0 table.
//! versions.flush_memtable(&memtable)?;
//!
//! // Point lookup across the whole catalog.
//! if let Some(value) = versions.get(b"key1")? {
//!     println!("Found: {:?}", value);
//! }
//!
//! // Reshape the catalog when a level is over budget.
//! versions.compact()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod cache;
pub mod compaction;
pub mod config;
pub mod error;
pub mod filename;
pub mod memtable;
pub mod sstable;

pub use cache::{TableCache, TableCacheStats};
pub use compaction::{find_file, Compaction, FileMetaData, MergingIterator, Version, VersionSet};
pub use error::{Error, Result};
pub use memtable::{InternalKey, MemTable, ValueType};
pub use sstable::{SSTableBuilder, SSTableIterator, SSTableReader};
