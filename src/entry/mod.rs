//! Entry Module
//!
//! In-memory records mapping one key to the location of its value.
//!
//! ## Responsibilities
//! - Hold the id bytes and data-file location of one key
//! - Carry the `DELETED` tombstone flag
//! - Recycle freed entries through the `EntryStore`

mod store;

pub use store::EntryStore;

/// Keys are length-prefixed with a single byte
pub const MAX_KEY_LENGTH: usize = 255;

/// Where a value lives in the data files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    /// Data file holding the payload
    pub data_file_id: u16,

    /// Byte offset of the payload in that file
    pub offset: u64,

    /// Payload length in bytes
    pub length: u64,
}

impl Location {
    pub fn new(data_file_id: u16, offset: u64, length: u64) -> Self {
        Self {
            data_file_id,
            offset,
            length,
        }
    }
}

/// Entry flag bits, as stored in the item record `flags` byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EntryFlags(u8);

impl EntryFlags {
    /// Entry is a tombstone
    pub const DELETED: EntryFlags = EntryFlags(0x01);

    pub const fn empty() -> Self {
        EntryFlags(0)
    }

    /// Keep unknown bits so they survive a replay/rewrite unchanged
    pub const fn from_bits(bits: u8) -> Self {
        EntryFlags(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: EntryFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: EntryFlags) {
        self.0 |= other.0;
    }

    pub const fn is_deleted(self) -> bool {
        self.contains(Self::DELETED)
    }
}

/// One key in the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    id: Vec<u8>,
    location: Location,
    flags: EntryFlags,
}

impl Entry {
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn flags(&self) -> EntryFlags {
        self.flags
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.is_deleted()
    }

    /// Exact id comparison (length first, then bytes)
    pub fn matches(&self, id: &[u8]) -> bool {
        self.id.len() == id.len() && self.id == id
    }

    /// Bytes the id buffer can hold without reallocating
    pub(crate) fn id_capacity(&self) -> usize {
        self.id.capacity()
    }
}
