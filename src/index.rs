//! Index Module
//!
//! The index root that coordinates all components.
//!
//! ## Responsibilities
//! - Replay every index file into the branch table on startup
//! - Persist each mutation before it becomes visible to lookups
//! - Rotate index files and hand out sequence ids
//! - Track health and refuse writes once read-only

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::branch::BranchTable;
use crate::config::{RunMode, Settings};
use crate::dkey::{decode_sequence_key, sequence_key, DirectKey};
use crate::entry::{Entry, EntryFlags, EntryStore, Location, MAX_KEY_LENGTH};
use crate::error::{IndexError, Result};
use crate::health::{Health, HealthState};
use crate::journal::{IndexRecovery, IndexWriter, ItemRecord, ReplayReport, WriterOptions};

/// State only touched while holding the mutation lock
struct WriteState {
    /// Current index file; `None` when the filesystem refused writes at open
    journal: Option<IndexWriter>,

    /// Entry allocation and the single reuse slot
    store: EntryStore,
}

/// The index root
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Mutations** (insert/delete/rotate): Serialized by `writer`
///   - Only ONE mutation at a time
///   - Order: writer lock → append record → link in branch (write lock)
///
/// - **Lookups** (get): Concurrent
///   - No writer lock needed
///   - Each branch has its own RwLock, so a lookup only waits for a
///     mutation of the same branch and never sees a half-linked entry
pub struct Index {
    /// Index settings
    settings: Settings,

    /// In-memory key → entry map
    branches: BranchTable,

    /// Serializes mutations; owns the current file and the entry store
    writer: Mutex<WriteState>,

    /// Id of the file currently accepting appends
    current_file_id: AtomicU16,

    /// Next sequence id (sequential/direct modes)
    next_sequence_id: AtomicU64,

    health: HealthState,

    /// What startup replay found
    report: ReplayReport,
}

impl Index {
    /// Open or create the index described by `settings`
    ///
    /// On startup:
    /// 1. Create the index directory if it doesn't exist
    /// 2. Replay every index file in id order into the branch table
    /// 3. Reopen the highest file for appends (or create file 0)
    /// 4. Settle health: Healthy, Degraded (damaged file) or ReadOnly
    pub fn open(settings: Settings) -> Result<Self> {
        settings.validate()?;

        // Step 1: Directory
        fs::create_dir_all(&settings.index_dir)?;
        let dir = settings.index_dir.as_path();

        // Step 2: Replay
        let branches = BranchTable::new(settings.branch_count);
        let mut store = EntryStore::new();
        let health = HealthState::new();
        let track_sequence = settings.mode.uses_sequence_ids();
        let mut max_sequence: Option<u64> = None;

        let mut replay = IndexRecovery::replay(dir)?;
        for replayed in replay.by_ref() {
            let record = replayed.record;
            if track_sequence {
                if let Some(seq) = decode_sequence_key(&record.id) {
                    max_sequence = Some(max_sequence.map_or(seq, |max| max.max(seq)));
                }
            }
            apply(&branches, &mut store, &record.id, record.location, record.flags);
        }
        let report = replay.finish();

        for file in &report.files {
            if let Some(mode) = file.mode.filter(|m| *m != settings.mode) {
                tracing::warn!(
                    file_id = file.file_id,
                    file_mode = %mode,
                    mode = %settings.mode,
                    "Index file was created in a different run mode"
                );
            }
        }

        // Step 3: Writable file
        let options = WriterOptions::from(&settings);
        let opened = match report.last_file() {
            None => IndexWriter::create(dir, 0, options),
            Some(last) if last.is_damaged() => match last.file_id.checked_add(1) {
                Some(next) => IndexWriter::create(dir, next, options),
                None => Err(IndexError::FileIdExhausted(last.file_id)),
            },
            Some(last) => {
                IndexWriter::resume(dir, last.file_id, last.valid_len, last.records, options)
            }
        };

        // Step 4: Health
        let (journal, outcome) = match opened {
            Ok(journal) if report.is_degraded() => (Some(journal), Health::Degraded),
            Ok(journal) => (Some(journal), Health::Healthy),
            Err(IndexError::ReadOnlyDetected(path)) => {
                tracing::warn!(%path, "Filesystem refuses writes, index is read-only");
                (None, Health::ReadOnly)
            }
            Err(e) => return Err(e),
        };
        health.loaded(outcome);

        let current_file_id = journal
            .as_ref()
            .map(IndexWriter::file_id)
            .or_else(|| report.last_file().map(|f| f.file_id))
            .unwrap_or(0);
        // u64::MAX is never handed out, so a replayed u64::MAX - 1 leaves the counter exhausted
        let next_sequence_id = max_sequence.map_or(0, |max| max.saturating_add(1));

        tracing::info!(
            dir = %dir.display(),
            files = report.files.len(),
            records = report.records(),
            entries = branches.len(),
            current_file_id,
            health = %outcome,
            "Index loaded"
        );

        Ok(Self {
            settings,
            branches,
            writer: Mutex::new(WriteState { journal, store }),
            current_file_id: AtomicU16::new(current_file_id),
            next_sequence_id: AtomicU64::new(next_sequence_id),
            health,
            report,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default settings with the specified index directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let settings = Settings {
            index_dir: path.to_path_buf(),
            ..Settings::default()
        };
        Self::open(settings)
    }

    /// Location of `id`, if it is live
    ///
    /// Served from memory in every health state.
    pub fn get(&self, id: &[u8]) -> Option<Location> {
        if id.len() > MAX_KEY_LENGTH {
            return None;
        }
        self.branches.lookup(id)
    }

    /// Map `id` to `location`, superseding any previous location
    ///
    /// The item record is appended (and synced per the sync strategy)
    /// before the entry becomes visible to lookups.
    pub fn insert(&self, id: &[u8], location: Location) -> Result<Location> {
        let record = ItemRecord::new(id, location, EntryFlags::empty())?;
        let mut state = self.writer.lock();
        self.commit(&mut state, &record)?;
        Ok(location)
    }

    /// Apply a record to memory only, as replay does
    ///
    /// A `DELETED` flag removes any live entry for `id`.
    pub fn insert_raw(&self, id: &[u8], location: Location, flags: EntryFlags) -> Result<()> {
        if id.len() > MAX_KEY_LENGTH {
            return Err(IndexError::KeyTooLong { len: id.len() });
        }
        let mut state = self.writer.lock();
        apply(&self.branches, &mut state.store, id, location, flags);
        Ok(())
    }

    /// Remove `id`, logging a tombstone
    ///
    /// Returns `false` (and writes nothing) when `id` is not live.
    pub fn delete(&self, id: &[u8]) -> Result<bool> {
        let record = ItemRecord::tombstone(id)?;
        let mut state = self.writer.lock();

        if !self.branches.contains(id) {
            return Ok(false);
        }

        self.commit(&mut state, &record)?;
        Ok(true)
    }

    /// Close the current index file and continue in the next file id
    pub fn rotate(&self) -> Result<u16> {
        let mut state = self.writer.lock();
        let journal = self.writable(&mut state)?;

        match journal.rotate() {
            Ok(file_id) => {
                self.current_file_id.store(file_id, Ordering::Release);
                Ok(file_id)
            }
            Err(e) => Err(self.write_failed(e)),
        }
    }

    /// Emergency switch: refuse every further mutation
    ///
    /// Lookups keep working from memory. Recovery requires a restart.
    pub fn force_read_only(&self) {
        self.health.force_read_only();
        tracing::error!(dir = %self.settings.index_dir.display(), "Index forced read-only");

        let mut state = self.writer.lock();
        if let Some(journal) = state.journal.as_mut() {
            if let Err(e) = journal.sync() {
                tracing::error!(error = %e, "Final sync before read-only failed");
            }
        }
    }

    /// Hand out the next sequence id
    ///
    /// Only available in sequential and direct modes.
    pub fn allocate_next_sequence_id(&self) -> Result<u64> {
        if !self.settings.mode.uses_sequence_ids() {
            return Err(IndexError::WrongMode(self.settings.mode));
        }
        self.take_sequence_id()
    }

    /// Allocate a sequence id and insert `location` under it
    pub fn insert_next(&self, location: Location) -> Result<u64> {
        if !self.settings.mode.uses_sequence_ids() {
            return Err(IndexError::WrongMode(self.settings.mode));
        }

        let mut state = self.writer.lock();
        let id = self.take_sequence_id()?;
        let record = ItemRecord::new(&sequence_key(id), location, EntryFlags::empty())?;
        self.commit(&mut state, &record)?;
        Ok(id)
    }

    /// Location stored under sequence id `id`
    pub fn get_sequence(&self, id: u64) -> Option<Location> {
        self.get(&sequence_key(id))
    }

    /// Direct key a client uses for the value stored under sequence id `id`
    ///
    /// `None` outside direct mode or for an unknown id. Values past the
    /// 32-bit offset range have no direct key either.
    pub fn direct_key(&self, id: u64) -> Option<DirectKey> {
        if self.settings.mode != RunMode::Direct {
            return None;
        }
        self.get_sequence(id).and_then(DirectKey::for_location)
    }

    /// Force the current index file to disk
    pub fn sync(&self) -> Result<()> {
        let mut state = self.writer.lock();
        let Some(journal) = state.journal.as_mut() else {
            return Ok(());
        };
        journal.sync().map_err(|e| self.write_failed(e))
    }

    /// Close the index gracefully
    ///
    /// Syncs the current index file to disk
    pub fn close(self) -> Result<()> {
        let mut state = self.writer.into_inner();
        if let Some(journal) = state.journal.as_mut() {
            journal.sync()?;
        }
        tracing::info!(
            entries = self.branches.len(),
            health = %self.health.get(),
            "Index closed"
        );
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Current health
    pub fn health(&self) -> Health {
        self.health.get()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Id of the index file accepting appends
    pub fn current_file_id(&self) -> u16 {
        self.current_file_id.load(Ordering::Acquire)
    }

    /// Sequence id the next allocation will return
    pub fn next_sequence_id(&self) -> u64 {
        self.next_sequence_id.load(Ordering::SeqCst)
    }

    /// Index directory
    pub fn index_dir(&self) -> &Path {
        &self.settings.index_dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// What startup replay found
    pub fn replay_report(&self) -> &ReplayReport {
        &self.report
    }

    /// Copy of the live entry for `id`
    pub fn entry(&self, id: &[u8]) -> Option<Entry> {
        self.branches.get_entry(id)
    }

    /// Copy of every live entry
    pub fn entries(&self) -> Vec<Entry> {
        self.branches.entries()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Persist `record`, then make it visible (called with the writer lock held)
    fn commit(&self, state: &mut WriteState, record: &ItemRecord) -> Result<()> {
        let journal = self.writable(state)?;

        if journal.is_full() {
            let file_id = journal.rotate().map_err(|e| self.write_failed(e))?;
            self.current_file_id.store(file_id, Ordering::Release);
        }
        journal.append(record).map_err(|e| self.write_failed(e))?;

        apply(
            &self.branches,
            &mut state.store,
            &record.id,
            record.location,
            record.flags,
        );
        Ok(())
    }

    fn take_sequence_id(&self) -> Result<u64> {
        self.next_sequence_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| next.checked_add(1))
            .map_err(|_| IndexError::SequenceExhausted)
    }

    /// Current journal, unless the index refuses writes
    fn writable<'a>(&self, state: &'a mut WriteState) -> Result<&'a mut IndexWriter> {
        if self.health.get() == Health::ReadOnly {
            return Err(IndexError::ReadOnly);
        }
        state.journal.as_mut().ok_or(IndexError::ReadOnly)
    }

    fn write_failed(&self, err: IndexError) -> IndexError {
        let health = self.health.degrade();
        tracing::error!(error = %err, %health, "Index write failed");
        err
    }
}

/// Apply one record to memory: tombstones unlink, everything else upserts
fn apply(
    branches: &BranchTable,
    store: &mut EntryStore,
    id: &[u8],
    location: Location,
    flags: EntryFlags,
) {
    if flags.is_deleted() {
        branches.delete(store, id);
    } else {
        branches.insert(store, id, location);
    }
}
