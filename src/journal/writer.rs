//! Index file writer
//!
//! Appends records to the current index file, applies the sync strategy and
//! rotates to the next file id.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{RunMode, Settings, SyncStrategy};
use crate::error::{IndexError, Result};

use super::header::OPENED_OFFSET;
use super::{index_file_path, unix_now, IndexHeader, ItemRecord, HEADER_SIZE};

/// The part of `Settings` the writer cares about
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    pub mode: RunMode,
    pub sync: SyncStrategy,
    pub max_file_size: u64,
    pub max_file_records: Option<u64>,
}

impl From<&Settings> for WriterOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            mode: settings.mode,
            sync: settings.sync,
            max_file_size: settings.max_file_size,
            max_file_records: settings.max_file_records,
        }
    }
}

/// Writes records to the current index file
pub struct IndexWriter {
    dir: PathBuf,
    path: PathBuf,
    file: File,
    file_id: u16,
    /// Bytes of valid data in the file (header included)
    size: u64,
    /// Records appended to this file so far
    records: u64,
    options: WriterOptions,
    last_sync: Instant,
    #[cfg(test)]
    fail_sync: bool,
}

impl IndexWriter {
    /// Create a brand new index file with a fresh header
    pub fn create(dir: &Path, file_id: u16, options: WriterOptions) -> Result<Self> {
        let path = index_file_path(dir, file_id);
        let mut file = open_writable(&path, true)?;

        let header = IndexHeader::new(file_id, options.mode);
        file.write_all(&header.encode())?;
        file.sync_all()?;

        tracing::info!(file_id, path = %path.display(), "Created index file");

        Ok(Self {
            dir: dir.to_path_buf(),
            path,
            file,
            file_id,
            size: HEADER_SIZE as u64,
            records: 0,
            options,
            last_sync: Instant::now(),
            #[cfg(test)]
            fail_sync: false,
        })
    }

    /// Reopen an existing index file for appends
    ///
    /// `valid_len` is where replay stopped; anything after it (a torn
    /// record) is cut off. A file that never got its header gets one now.
    /// Otherwise the header's `opened` timestamp is refreshed.
    pub fn resume(
        dir: &Path,
        file_id: u16,
        valid_len: u64,
        records: u64,
        options: WriterOptions,
    ) -> Result<Self> {
        let path = index_file_path(dir, file_id);
        let mut file = open_writable(&path, false)?;

        let size = if valid_len < HEADER_SIZE as u64 {
            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&IndexHeader::new(file_id, options.mode).encode())?;
            HEADER_SIZE as u64
        } else {
            if file.metadata()?.len() > valid_len {
                tracing::warn!(file_id, valid_len, "Cutting torn tail off index file");
                file.set_len(valid_len)?;
            }
            file.seek(SeekFrom::Start(OPENED_OFFSET))?;
            file.write_all(&unix_now().to_le_bytes())?;
            valid_len
        };
        file.sync_all()?;
        file.seek(SeekFrom::Start(size))?;

        tracing::info!(file_id, size, records, "Resumed index file");

        Ok(Self {
            dir: dir.to_path_buf(),
            path,
            file,
            file_id,
            size,
            records,
            options,
            last_sync: Instant::now(),
            #[cfg(test)]
            fail_sync: false,
        })
    }

    /// Append a record to the current file
    ///
    /// Returns the file offset the record was written at. On failure,
    /// including a failed sync, the file is cut back to its last valid length:
    /// a record that was reported as failed must not come back on replay.
    pub fn append(&mut self, record: &ItemRecord) -> Result<u64> {
        let bytes = record.to_bytes();
        let at = self.size;

        if let Err(e) = self.file.write_all(&bytes) {
            self.roll_back();
            return Err(e.into());
        }
        if let Err(e) = self.maybe_sync() {
            self.roll_back();
            return Err(e);
        }

        self.size += bytes.len() as u64;
        self.records += 1;

        Ok(at)
    }

    /// Whether the current file has reached a rotation threshold
    pub fn is_full(&self) -> bool {
        self.size >= self.options.max_file_size
            || self
                .options
                .max_file_records
                .is_some_and(|max| self.records >= max)
    }

    /// Close the current file and start the next file id
    pub fn rotate(&mut self) -> Result<u16> {
        let next_id = self
            .file_id
            .checked_add(1)
            .ok_or(IndexError::FileIdExhausted(self.file_id))?;

        self.sync()?;
        let next = Self::create(&self.dir, next_id, self.options)?;
        let previous = std::mem::replace(self, next);

        tracing::info!(
            from = previous.file_id,
            to = next_id,
            records = previous.records,
            "Rotated index file"
        );
        Ok(next_id)
    }

    /// Force written records to stable storage
    pub fn sync(&mut self) -> Result<()> {
        self.sync_file()?;
        self.last_sync = Instant::now();
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn file_id(&self) -> u16 {
        self.file_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Valid bytes in the current file, header included
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Records appended to the current file
    pub fn records(&self) -> u64 {
        self.records
    }

    /// When the file was last forced to disk
    pub fn last_sync(&self) -> Instant {
        self.last_sync
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn maybe_sync(&mut self) -> Result<()> {
        match self.options.sync {
            SyncStrategy::Off => Ok(()),
            SyncStrategy::EveryWrite => self.sync(),
            SyncStrategy::Interval(every) => {
                if self.last_sync.elapsed() >= every {
                    self.sync()
                } else {
                    Ok(())
                }
            }
        }
    }

    #[cfg(not(test))]
    fn sync_file(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }

    #[cfg(test)]
    fn sync_file(&mut self) -> io::Result<()> {
        if self.fail_sync {
            return Err(io::Error::new(io::ErrorKind::Other, "sync failed"));
        }
        self.file.sync_data()
    }

    fn roll_back(&mut self) {
        let restored = self
            .file
            .set_len(self.size)
            .and_then(|_| self.file.seek(SeekFrom::Start(self.size)).map(|_| ()));
        if let Err(e) = restored {
            tracing::error!(file_id = self.file_id, error = %e, "Failed to roll back torn append");
        }
    }
}

/// Open an index file for writing, reporting refused writes distinctly
fn open_writable(path: &Path, create: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true);
    if create {
        options.create_new(true);
    }
    options.open(path).map_err(|e| refusal_or_io(e, path))
}

fn refusal_or_io(err: io::Error, path: &Path) -> IndexError {
    if IndexError::is_write_refusal(&err) {
        IndexError::ReadOnlyDetected(path.display().to_string())
    } else {
        IndexError::Io(err)
    }
}
