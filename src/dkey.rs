//! Direct and sequential key codecs
//!
//! In direct mode clients address a value by where it lives: a 6-byte key
//! `dataFileId:u16 | offset:u32` (little-endian). Direct keys are wire values
//! only; they never appear in index files.
//!
//! Both keyless modes index entries under the generated sequence id, stored
//! as an 8-byte little-endian key.

use bytes::{Buf, BufMut};

use crate::entry::Location;

/// Size of an encoded direct key
pub const DIRECT_KEY_SIZE: usize = 6;

/// Size of an encoded sequence key
pub const SEQUENCE_KEY_SIZE: usize = 8;

/// Decoded direct key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectKey {
    pub data_file_id: u16,
    pub offset: u32,
}

impl DirectKey {
    pub fn new(data_file_id: u16, offset: u32) -> Self {
        Self {
            data_file_id,
            offset,
        }
    }

    pub fn to_bytes(self) -> [u8; DIRECT_KEY_SIZE] {
        encode(self.data_file_id, self.offset)
    }

    pub fn from_bytes(bytes: [u8; DIRECT_KEY_SIZE]) -> Self {
        let (data_file_id, offset) = decode(bytes);
        Self::new(data_file_id, offset)
    }

    /// Direct key addressing `location`; `None` if the offset needs more than 32 bits
    pub fn for_location(location: Location) -> Option<Self> {
        let offset = u32::try_from(location.offset).ok()?;
        Some(Self::new(location.data_file_id, offset))
    }

    /// Whether `location` is the value this key addresses
    pub fn addresses(self, location: Location) -> bool {
        location.data_file_id == self.data_file_id && location.offset == u64::from(self.offset)
    }

    /// Parse from an arbitrary slice; `None` unless exactly 6 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; DIRECT_KEY_SIZE] = bytes.try_into().ok()?;
        Some(Self::from_bytes(raw))
    }
}

/// Encode a direct key
pub fn encode(data_file_id: u16, offset: u32) -> [u8; DIRECT_KEY_SIZE] {
    let mut out = [0u8; DIRECT_KEY_SIZE];
    let mut buf = &mut out[..];
    buf.put_u16_le(data_file_id);
    buf.put_u32_le(offset);
    out
}

/// Decode a direct key; every 6-byte input is valid
pub fn decode(bytes: [u8; DIRECT_KEY_SIZE]) -> (u16, u32) {
    let mut buf = &bytes[..];
    (buf.get_u16_le(), buf.get_u32_le())
}

/// Index key for sequence id `id`
pub fn sequence_key(id: u64) -> [u8; SEQUENCE_KEY_SIZE] {
    id.to_le_bytes()
}

/// Sequence id stored in an index key, if the key has the sequence shape
pub fn decode_sequence_key(key: &[u8]) -> Option<u64> {
    let raw: [u8; SEQUENCE_KEY_SIZE] = key.try_into().ok()?;
    Some(u64::from_le_bytes(raw))
}
