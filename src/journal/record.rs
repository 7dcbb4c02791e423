//! Item record definitions
//!
//! The durable, replayable form of one index entry. Branch membership is not
//! stored; it is derived from the id on replay.

use bytes::{Buf, BufMut};

use crate::entry::{EntryFlags, Location, MAX_KEY_LENGTH};
use crate::error::{IndexError, Result};

/// Fixed part: IdLen (1) + Offset (8) + Length (8) + Flags (1) + DataFileId (2)
pub const RECORD_FIXED_SIZE: usize = 20;

/// A single record in an index file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecord {
    pub id: Vec<u8>,
    pub location: Location,
    pub flags: EntryFlags,
}

impl ItemRecord {
    /// Build a record, rejecting ids longer than 255 bytes
    pub fn new(id: &[u8], location: Location, flags: EntryFlags) -> Result<Self> {
        if id.len() > MAX_KEY_LENGTH {
            return Err(IndexError::KeyTooLong { len: id.len() });
        }
        Ok(Self {
            id: id.to_vec(),
            location,
            flags,
        })
    }

    /// Tombstone for `id`: same id, zeroed location, `DELETED` set
    pub fn tombstone(id: &[u8]) -> Result<Self> {
        Self::new(id, Location::default(), EntryFlags::DELETED)
    }

    pub fn is_tombstone(&self) -> bool {
        self.flags.is_deleted()
    }

    /// Size of this record on disk
    pub fn encoded_len(&self) -> usize {
        RECORD_FIXED_SIZE + self.id.len()
    }

    /// Append the on-disk form to `buf`
    pub fn encode_into(&self, buf: &mut impl BufMut) {
        debug_assert!(self.id.len() <= MAX_KEY_LENGTH);
        buf.put_u8(self.id.len() as u8);
        buf.put_u64_le(self.location.offset);
        buf.put_u64_le(self.location.length);
        buf.put_u8(self.flags.bits());
        buf.put_u16_le(self.location.data_file_id);
        buf.put_slice(&self.id);
    }

    /// Encode to a fresh buffer
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    /// Decode one record from the front of `bytes`
    ///
    /// Returns the record and the number of bytes consumed. Input that stops
    /// before the record does is `TruncatedRecord`.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < RECORD_FIXED_SIZE {
            return Err(IndexError::TruncatedRecord {
                needed: RECORD_FIXED_SIZE,
                available: bytes.len(),
            });
        }

        let total = RECORD_FIXED_SIZE + bytes[0] as usize;
        if bytes.len() < total {
            return Err(IndexError::TruncatedRecord {
                needed: total,
                available: bytes.len(),
            });
        }

        let mut buf = &bytes[..total];
        let id_len = buf.get_u8() as usize;
        let offset = buf.get_u64_le();
        let length = buf.get_u64_le();
        let flags = EntryFlags::from_bits(buf.get_u8());
        let data_file_id = buf.get_u16_le();
        let id = buf[..id_len].to_vec();

        let record = Self {
            id,
            location: Location {
                data_file_id,
                offset,
                length,
            },
            flags,
        };
        Ok((record, total))
    }
}
