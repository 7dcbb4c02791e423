//! Branch table implementation
//!
//! Fixed array of RwLock-guarded branches. Callers serialize mutations and
//! pass in the `EntryStore`; lookups need nothing but `&self`.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::entry::{Entry, EntryFlags, EntryStore, Location};

use super::{branch_index, Branch};

/// Key → entry index sharded over a fixed number of branches
pub struct BranchTable {
    branches: Box<[RwLock<Branch>]>,
    /// Live entries across all branches
    live: AtomicUsize,
}

impl BranchTable {
    /// Create a table with `branch_count` empty branches
    pub fn new(branch_count: usize) -> Self {
        let branches = (0..branch_count.max(1))
            .map(|_| RwLock::new(Branch::default()))
            .collect();
        Self {
            branches,
            live: AtomicUsize::new(0),
        }
    }

    /// Branch `id` hashes to
    pub fn branch_of(&self, id: &[u8]) -> usize {
        branch_index(id, self.branches.len())
    }

    /// Location of `id` (read lock on one branch)
    pub fn lookup(&self, id: &[u8]) -> Option<Location> {
        self.branch(id).read().find(id).map(Entry::location)
    }

    /// Copy of the entry for `id`
    pub fn get_entry(&self, id: &[u8]) -> Option<Entry> {
        self.branch(id).read().find(id).cloned()
    }

    pub fn contains(&self, id: &[u8]) -> bool {
        self.branch(id).read().find(id).is_some()
    }

    /// Insert or supersede the entry for `id`
    ///
    /// A superseded entry is unlinked and handed to the store, then the new
    /// entry is appended at the tail, all under the branch write lock.
    /// Returns the previous location, if any.
    pub fn insert(&self, store: &mut EntryStore, id: &[u8], location: Location) -> Option<Location> {
        let mut branch = self.branch(id).write();

        let previous = branch.position(id).map(|index| {
            let old = branch.remove(index);
            let location = old.location();
            store.mark_deleted(old);
            location
        });

        branch.push(store.obtain(id, location, EntryFlags::empty()));

        if previous.is_none() {
            self.live.fetch_add(1, Ordering::Relaxed);
        }
        previous
    }

    /// Unlink the entry for `id` and hand it to the store as deleted
    ///
    /// Returns the removed location, or `None` if `id` was absent.
    pub fn delete(&self, store: &mut EntryStore, id: &[u8]) -> Option<Location> {
        let mut branch = self.branch(id).write();

        let index = branch.position(id)?;
        let old = branch.remove(index);
        let location = old.location();
        store.mark_deleted(old);

        self.live.fetch_sub(1, Ordering::Relaxed);
        Some(location)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of branches (fixed at creation)
    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// Entries in one branch
    pub fn branch_len(&self, index: usize) -> usize {
        self.branches.get(index).map_or(0, |b| b.read().len())
    }

    /// Copy of every live entry, branch by branch in insertion order
    pub fn entries(&self) -> Vec<Entry> {
        let mut out = Vec::with_capacity(self.len());
        for branch in self.branches.iter() {
            out.extend(branch.read().iter().cloned());
        }
        out
    }

    fn branch(&self, id: &[u8]) -> &RwLock<Branch> {
        &self.branches[self.branch_of(id)]
    }
}
