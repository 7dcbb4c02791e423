//! Index file header
//!
//! Written once when a file is created. Only `opened` is rewritten later,
//! when the file is reopened for appends.

use bytes::{Buf, BufMut};

use crate::config::RunMode;
use crate::error::{IndexError, Result};

/// Magic bytes identifying an AtlasKV index file
pub const MAGIC: &[u8; 4] = b"IDX0";

/// Current index file format version
pub const VERSION: u32 = 1;

/// Header size: Magic (4) + Version (4) + Created (8) + Opened (8) + FileId (2) + Mode (1)
pub const HEADER_SIZE: usize = 27;

/// Byte offset of the `opened` timestamp inside the header
pub(crate) const OPENED_OFFSET: u64 = 16;

/// Header at offset 0 of every index file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub version: u32,
    /// Unix seconds when the file was created
    pub created: u64,
    /// Unix seconds when the file was last opened for appends
    pub opened: u64,
    pub file_id: u16,
    /// Raw run-mode byte recorded at creation
    pub mode: u8,
}

impl IndexHeader {
    /// Fresh header for a new file, stamped with the current time
    pub fn new(file_id: u16, mode: RunMode) -> Self {
        let now = super::unix_now();
        Self {
            version: VERSION,
            created: now,
            opened: now,
            file_id,
            mode: mode.as_byte(),
        }
    }

    /// Run mode recorded in the header, if it is a known value
    pub fn run_mode(&self) -> Option<RunMode> {
        RunMode::from_byte(self.mode)
    }

    /// Encode to the fixed 27-byte layout
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_slice(MAGIC);
        buf.put_u32_le(self.version);
        buf.put_u64_le(self.created);
        buf.put_u64_le(self.opened);
        buf.put_u16_le(self.file_id);
        buf.put_u8(self.mode);
        out
    }

    /// Decode and validate a header read from index file `file_id`
    ///
    /// Magic or version mismatches, and short input, are `CorruptHeader`.
    pub fn decode(bytes: &[u8], file_id: u16) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(IndexError::CorruptHeader {
                file_id,
                reason: format!("header needs {} bytes, file has {}", HEADER_SIZE, bytes.len()),
            });
        }

        let mut buf = &bytes[..HEADER_SIZE];
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(IndexError::CorruptHeader {
                file_id,
                reason: format!("invalid magic {:?}", magic),
            });
        }

        let version = buf.get_u32_le();
        if version != VERSION {
            return Err(IndexError::CorruptHeader {
                file_id,
                reason: format!("unsupported version {}", version),
            });
        }

        Ok(Self {
            version,
            created: buf.get_u64_le(),
            opened: buf.get_u64_le(),
            file_id: buf.get_u16_le(),
            mode: buf.get_u8(),
        })
    }
}
