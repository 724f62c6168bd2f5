//! SSTable builder implementation.
//!
//! Builds an SSTable file from a sequence of internal keys in ascending
//! internal-key order.

use crate::error::{Error, Result};
use crate::memtable::InternalKey;
use crate::sstable::{FOOTER_SIZE, MAGIC_NUMBER};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// SSTableBuilder writes a table file record by record.
///
/// Keys must be added in strictly ascending internal-key order. The size
/// reported by [`file_size`](SSTableBuilder::file_size) grows as records
/// are added, which is what compaction checks for output rollover.
pub struct SSTableBuilder {
    writer: BufWriter<File>,
    offsets: Vec<u64>,
    offset: u64,
    data_hasher: crc32fast::Hasher,
    last_key: Option<InternalKey>,
}

impl SSTableBuilder {
    /// Creates a builder writing to `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            offsets: Vec::new(),
            offset: 0,
            data_hasher: crc32fast::Hasher::new(),
            last_key: None,
        })
    }

    /// Appends a record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `key` does not sort strictly after the
    /// previously added key.
    pub fn add(&mut self, key: &InternalKey) -> Result<()> {
        if let Some(last) = &self.last_key {
            if key <= last {
                return Err(Error::invalid_argument(
                    "keys must be added in ascending internal-key order",
                ));
            }
        }

        let mut record = Vec::with_capacity(key.encoded_len() as usize);
        key.encode_to(&mut record)?;

        self.offsets.push(self.offset);
        self.writer.write_all(&record)?;
        self.data_hasher.update(&record);
        self.offset += record.len() as u64;
        self.last_key = Some(key.clone());

        Ok(())
    }

    /// Bytes of record data written so far.
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    /// Number of records added so far.
    pub fn num_entries(&self) -> usize {
        self.offsets.len()
    }

    /// Writes the index and footer, flushes, and returns the total file
    /// size in bytes.
    pub fn finish(mut self) -> Result<u64> {
        let index_offset = self.offset;

        let mut index = Vec::with_capacity(self.offsets.len() * 8);
        for off in &self.offsets {
            index.extend_from_slice(&off.to_le_bytes());
        }
        self.writer.write_all(&index)?;

        let data_crc = std::mem::take(&mut self.data_hasher).finalize();
        let index_crc = crc32fast::hash(&index);

        self.writer.write_all(&index_offset.to_le_bytes())?;
        self.writer.write_all(&(self.offsets.len() as u64).to_le_bytes())?;
        self.writer.write_all(&data_crc.to_le_bytes())?;
        self.writer.write_all(&index_crc.to_le_bytes())?;
        self.writer.write_all(&MAGIC_NUMBER.to_le_bytes())?;
        self.writer.flush()?;

        Ok(index_offset + index.len() as u64 + FOOTER_SIZE as u64)
    }
}
