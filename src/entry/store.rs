//! Entry store
//!
//! Allocates entries and keeps a single freed entry around for reuse, so
//! overwrite-heavy workloads recycle id buffers instead of reallocating.

use super::{Entry, EntryFlags, Location};

/// Owner of the entry allocation lifecycle
///
/// Only one freed entry is retained at a time: this is a reuse slot for the
/// delete-then-insert pattern of an overwrite, not a general free list.
#[derive(Debug, Default)]
pub struct EntryStore {
    /// The most recently freed entry
    reusable: Option<Entry>,
    allocations: u64,
    reuses: u64,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh entry with an id buffer sized to `id`
    pub fn allocate(&mut self, id: &[u8], location: Location, flags: EntryFlags) -> Entry {
        self.allocations += 1;
        Entry {
            id: id.to_vec(),
            location,
            flags,
        }
    }

    /// Rebuild `freed` in place when `id` fits its buffer, else release it
    /// and allocate fresh
    pub fn reuse(
        &mut self,
        mut freed: Entry,
        id: &[u8],
        location: Location,
        flags: EntryFlags,
    ) -> Entry {
        if id.len() > freed.id_capacity() {
            drop(freed);
            return self.allocate(id, location, flags);
        }

        self.reuses += 1;
        freed.id.clear();
        freed.id.extend_from_slice(id);
        freed.location = location;
        freed.flags = flags;
        freed
    }

    /// Entry for `id`, recycled from the reuse slot when possible
    pub fn obtain(&mut self, id: &[u8], location: Location, flags: EntryFlags) -> Entry {
        match self.reusable.take() {
            Some(freed) => self.reuse(freed, id, location, flags),
            None => self.allocate(id, location, flags),
        }
    }

    /// Tombstone an entry that was already unlinked from its branch
    ///
    /// It becomes the reuse slot; a previously retained entry is released.
    pub fn mark_deleted(&mut self, mut entry: Entry) {
        entry.flags.insert(EntryFlags::DELETED);
        self.reusable = Some(entry);
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// The retained freed entry, if any
    pub fn reusable(&self) -> Option<&Entry> {
        self.reusable.as_ref()
    }

    /// Fresh allocations made so far
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    /// Entries recycled in place so far
    pub fn reuses(&self) -> u64 {
        self.reuses
    }
}
