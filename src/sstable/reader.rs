//! SSTable reader implementation.
//!
//! Opens a table file, keeps its record index in memory, and serves point
//! lookups and sequential iteration.

use crate::error::{Error, Result};
use crate::memtable::{InternalKey, ValueType};
use crate::sstable::{FOOTER_SIZE, MAGIC_NUMBER};
use bytes::Bytes;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

/// SSTableReader provides read access to one table file.
///
/// The reader is shared behind an `Arc` by the table cache; point lookups
/// read individual records through a cloned file handle, so concurrent
/// readers do not serialize on the reader itself.
#[derive(Debug)]
pub struct SSTableReader {
    file: Arc<File>,
    offsets: Arc<Vec<u64>>,
    index_offset: u64,
    data_crc: u32,
    file_size: u64,
}

impl SSTableReader {
    /// Opens a table file for reading.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if the file is too small, carries the wrong
    /// magic number, or its index fails the checksum.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;

        let file_size = file.metadata()?.len();
        if file_size < FOOTER_SIZE as u64 {
            return Err(Error::corruption("file too small to be a valid table"));
        }

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE];
        file.read_exact(&mut footer)?;

        let index_offset = u64::from_le_bytes(footer[0..8].try_into().unwrap());
        let entry_count = u64::from_le_bytes(footer[8..16].try_into().unwrap());
        let data_crc = u32::from_le_bytes(footer[16..20].try_into().unwrap());
        let index_crc = u32::from_le_bytes(footer[20..24].try_into().unwrap());
        let magic = u64::from_le_bytes(footer[24..32].try_into().unwrap());

        if magic != MAGIC_NUMBER {
            return Err(Error::corruption("bad table magic number"));
        }
        if index_offset + entry_count * 8 + FOOTER_SIZE as u64 != file_size {
            return Err(Error::corruption("table index does not match file size"));
        }

        file.seek(SeekFrom::Start(index_offset))?;
        let mut index = vec![0u8; (entry_count * 8) as usize];
        file.read_exact(&mut index)?;

        if crc32fast::hash(&index) != index_crc {
            return Err(Error::corruption("table index checksum mismatch"));
        }

        let mut offsets = Vec::with_capacity(entry_count as usize);
        let mut prev = None;
        for chunk in index.chunks_exact(8) {
            let off = u64::from_le_bytes(chunk.try_into().unwrap());
            if off >= index_offset || prev.is_some_and(|p| off <= p) {
                return Err(Error::corruption("table index offsets out of order"));
            }
            prev = Some(off);
            offsets.push(off);
        }

        Ok(Self { file: Arc::new(file), offsets: Arc::new(offsets), index_offset, data_crc, file_size })
    }

    /// Looks up the newest version of a user key.
    ///
    /// Returns `Ok(Some(value))` for a live value and `Ok(None)` for a
    /// tombstone. A key with no record in this table is `NotFound`, which
    /// lets the version's level scan continue downward.
    pub fn get(&self, user_key: &[u8]) -> Result<Option<Vec<u8>>> {
        // Records sort by user key ascending then sequence descending, so
        // the first record for a user key is its newest version.
        let mut left = 0usize;
        let mut right = self.offsets.len();
        while left < right {
            let mid = (left + right) / 2;
            let record = self.read_record(mid)?;
            if record.user_key() < user_key {
                left = mid + 1;
            } else {
                right = mid;
            }
        }

        if left == self.offsets.len() {
            return Err(Error::not_found("key not present in table"));
        }

        let record = self.read_record(left)?;
        if record.user_key() != user_key {
            return Err(Error::not_found("key not present in table"));
        }

        match record.value_type() {
            ValueType::Value => Ok(Some(record.user_value().to_vec())),
            ValueType::Deletion => Ok(None),
        }
    }

    /// Returns an iterator over the table's records in internal-key order.
    ///
    /// The data region is read once and checksum-verified; the iterator
    /// owns the bytes, so it stays usable after the reader is evicted from
    /// the table cache.
    pub fn new_iterator(&self) -> Result<SSTableIterator> {
        let mut file = self.file.try_clone().map_err(Error::Io)?;
        file.seek(SeekFrom::Start(0))?;
        let mut data = vec![0u8; self.index_offset as usize];
        file.read_exact(&mut data)?;

        if crc32fast::hash(&data) != self.data_crc {
            return Err(Error::corruption("table data checksum mismatch"));
        }

        Ok(SSTableIterator {
            data: Bytes::from(data),
            offsets: self.offsets.clone(),
            pos: 0,
            current: None,
        })
    }

    /// Total size of the table file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Number of records in the table.
    pub fn num_entries(&self) -> usize {
        self.offsets.len()
    }

    fn read_record(&self, index: usize) -> Result<InternalKey> {
        let start = self.offsets[index];
        let end = self.offsets.get(index + 1).copied().unwrap_or(self.index_offset);

        let mut file = self.file.try_clone().map_err(Error::Io)?;
        file.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; (end - start) as usize];
        file.read_exact(&mut buf)?;

        InternalKey::decode_from(&mut buf.as_slice())
    }
}

/// Iterator over one table's records in ascending internal-key order.
pub struct SSTableIterator {
    data: Bytes,
    offsets: Arc<Vec<u64>>,
    pos: usize,
    current: Option<InternalKey>,
}

impl SSTableIterator {
    /// Positions the iterator on the first record.
    pub fn seek_to_first(&mut self) {
        self.pos = 0;
        self.current = self.decode_pos();
    }

    /// Advances to the next record. No-op once exhausted.
    pub fn next(&mut self) {
        if self.current.is_some() {
            self.pos += 1;
            self.current = self.decode_pos();
        }
    }

    /// Returns `true` while the iterator is positioned on a record.
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// The record the iterator is positioned on, or `None` when exhausted.
    pub fn internal_key(&self) -> Option<&InternalKey> {
        self.current.as_ref()
    }

    fn decode_pos(&self) -> Option<InternalKey> {
        if self.pos >= self.offsets.len() {
            return None;
        }
        let start = self.offsets[self.pos] as usize;
        let end =
            self.offsets.get(self.pos + 1).map(|o| *o as usize).unwrap_or(self.data.len());
        match InternalKey::decode_from(&mut &self.data[start..end]) {
            Ok(key) => Some(key),
            Err(e) => {
                // The data region was checksum-verified at creation, so a
                // decode failure here means in-memory corruption.
                log::error!("table record decode failed: {}", e);
                None
            }
        }
    }
}
