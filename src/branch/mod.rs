//! Branch Module
//!
//! Hash-sharded in-memory index from key to entry.
//!
//! ## Responsibilities
//! - Map every id to one branch with a fixed hash
//! - Keep each branch as an ordered list with O(1) tail append
//! - Concurrent lookups, one writer per branch at a time
//!
//! ## Data Structure Choice
//! A fixed boxed slice of `RwLock<Branch>`:
//! - Branch count is chosen at startup and never resized
//! - Each branch owns its entries in a `Vec` (insertion order kept)
//! - Lookups only contend with writers on the same branch

mod table;

pub use table::BranchTable;

use crate::entry::Entry;

/// Branch for `id` in a table of `branch_count` branches
///
/// CRC-32 of the id bytes, reduced modulo the branch count.
pub fn branch_index(id: &[u8], branch_count: usize) -> usize {
    crc32fast::hash(id) as usize % branch_count
}

/// One hash bucket: the entries whose ids hash to this slot
#[derive(Debug, Default)]
pub struct Branch {
    entries: Vec<Entry>,
}

impl Branch {
    /// Number of entries in this branch
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recently appended entry
    pub fn last(&self) -> Option<&Entry> {
        self.entries.last()
    }

    /// First entry whose id matches exactly
    pub fn find(&self, id: &[u8]) -> Option<&Entry> {
        self.entries.iter().find(|e| e.matches(id))
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub(crate) fn position(&self, id: &[u8]) -> Option<usize> {
        self.entries.iter().position(|e| e.matches(id))
    }

    pub(crate) fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Unlink the entry at `index`, keeping the order of the rest
    pub(crate) fn remove(&mut self, index: usize) -> Entry {
        self.entries.remove(index)
    }
}
