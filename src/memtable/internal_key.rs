//! # Internal Key Format
//!
//! This module defines the internal key format used in the MemTable,
//! SSTables, and file metadata.
//!
//! ## Wire Format
//!
//! ```text
//! InternalKey:
//!   [user_key_len: u32] [user_key] [sequence: u64] [type: u8]
//!   [user_value_len: u32] [user_value]
//! ```
//!
//! All integers are little-endian. Keys stored as file metadata carry an
//! empty `user_value`.
//!
//! ## Ordering
//!
//! InternalKeys are ordered by:
//! 1. user_key (ascending)
//! 2. sequence (descending - newer first)
//! 3. type (descending - Value before Deletion)
//!
//! The user value is payload, not identity: it takes no part in ordering
//! or equality. The descending-sequence tiebreak is load-bearing for
//! compaction, which keeps the first record it sees for each user key.

use crate::error::{Error, Result};
use std::cmp::Ordering;
use std::io::{self, Read, Write};

/// The type of a value in the database.
///
/// - `Value`: A normal key-value pair
/// - `Deletion`: A tombstone marking that a key has been deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueType {
    /// A tombstone indicating the key has been deleted
    Deletion = 0,

    /// A normal value
    Value = 1,
}

impl ValueType {
    /// Converts a u8 to a ValueType.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ValueType::Deletion),
            1 => Some(ValueType::Value),
            _ => None,
        }
    }

    /// Converts the ValueType to a u8.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Internal key used in the MemTable, SSTables, and file metadata.
///
/// An internal key consists of:
/// - User key: The key provided by the user
/// - Sequence number: A monotonically increasing number assigned per write
/// - Value type: Either Value or Deletion (tombstone)
/// - User value: The payload carried alongside the key
///
/// Two internal keys are equal when their user key, sequence, and type
/// match; the user value is ignored. File metadata stores bound keys with
/// the value stripped.
#[derive(Debug, Clone)]
pub struct InternalKey {
    user_key: Vec<u8>,
    sequence: u64,
    value_type: ValueType,
    user_value: Vec<u8>,
}

impl InternalKey {
    /// Creates a new InternalKey with an empty user value.
    pub fn new(user_key: Vec<u8>, sequence: u64, value_type: ValueType) -> Self {
        Self { user_key, sequence, value_type, user_value: Vec::new() }
    }

    /// Attaches a user value to this key.
    pub fn with_value(mut self, user_value: impl Into<Vec<u8>>) -> Self {
        self.user_value = user_value.into();
        self
    }

    /// Returns the user key.
    pub fn user_key(&self) -> &[u8] {
        &self.user_key
    }

    /// Returns the sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the value type.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Returns the user value.
    pub fn user_value(&self) -> &[u8] {
        &self.user_value
    }

    /// Drops the user value, keeping identity only.
    pub fn clear_user_value(&mut self) {
        self.user_value.clear();
    }

    /// Encodes the key to a writer in the wire format.
    pub fn encode_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&(self.user_key.len() as u32).to_le_bytes())?;
        w.write_all(&self.user_key)?;
        w.write_all(&self.sequence.to_le_bytes())?;
        w.write_all(&[self.value_type.as_u8()])?;
        w.write_all(&(self.user_value.len() as u32).to_le_bytes())?;
        w.write_all(&self.user_value)?;
        Ok(())
    }

    /// Decodes a key from a reader.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` on a short read or an invalid value type.
    pub fn decode_from<R: Read>(r: &mut R) -> Result<Self> {
        let user_key_len = read_u32_le(r)? as usize;
        let mut user_key = vec![0u8; user_key_len];
        read_full(r, &mut user_key)?;

        let sequence = read_u64_le(r)?;

        let mut type_byte = [0u8; 1];
        read_full(r, &mut type_byte)?;
        let value_type = ValueType::from_u8(type_byte[0])
            .ok_or_else(|| Error::corruption(format!("invalid value type {}", type_byte[0])))?;

        let user_value_len = read_u32_le(r)? as usize;
        let mut user_value = vec![0u8; user_value_len];
        read_full(r, &mut user_value)?;

        Ok(Self { user_key, sequence, value_type, user_value })
    }

    /// Returns the total encoded size of this key in bytes.
    pub fn encoded_len(&self) -> u64 {
        4 + self.user_key.len() as u64 + 8 + 1 + 4 + self.user_value.len() as u64
    }
}

impl PartialEq for InternalKey {
    fn eq(&self, other: &Self) -> bool {
        self.user_key == other.user_key
            && self.sequence == other.sequence
            && self.value_type == other.value_type
    }
}

impl Eq for InternalKey {}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // User keys ascending; ties by sequence descending so the newest
        // version of a user key sorts first; then type descending.
        self.user_key
            .cmp(&other.user_key)
            .then_with(|| other.sequence.cmp(&self.sequence))
            .then_with(|| other.value_type.cmp(&self.value_type))
    }
}

fn map_short_read(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::corruption("unexpected end of input")
    } else {
        Error::Io(e)
    }
}

pub(crate) fn read_full<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    r.read_exact(buf).map_err(map_short_read)
}

pub(crate) fn read_u32_le<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_full(r, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_i32_le<R: Read>(r: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    read_full(r, &mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

pub(crate) fn read_u64_le<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    read_full(r, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
