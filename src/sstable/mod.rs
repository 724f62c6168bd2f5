//! SSTable (Sorted String Table) implementation.
//!
//! SSTable is an immutable, sorted file of internal keys. The version and
//! compaction core treats tables as opaque; this module supplies the
//! builder, reader, and iterator the core needs.
//!
//! ## File Format
//!
//! ```text
//! [Record 0]
//! [Record 1]
//! ...
//! [Record N-1]       // each record is one encoded InternalKey
//! [Index]            // N x u64: file offset of each record
//! [Footer: 32B]      // index offset, entry count, checksums, magic
//! ```
//!
//! Records are sorted by internal key, so the first record for a user key
//! is its newest version. The index makes point lookups a binary search
//! over record offsets; iteration reads the data region sequentially once
//! and verifies its checksum up front.

pub mod builder;
pub mod reader;

pub use builder::SSTableBuilder;
pub use reader::{SSTableIterator, SSTableReader};

/// Footer size in bytes (fixed).
pub const FOOTER_SIZE: usize = 32;

/// Magic number identifying RiftKV table files.
pub const MAGIC_NUMBER: u64 = 0x524946544b565354; // "RIFTKVST"
