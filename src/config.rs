//! Configuration for the AtlasKV index
//!
//! The host engine hands the index an already-built `Settings` value; loading
//! it from files or the environment happens elsewhere.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{IndexError, Result};
use crate::journal::HEADER_SIZE;

/// Settings consumed by `Index::open`
#[derive(Debug, Clone)]
pub struct Settings {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the index files
    /// Internal structure:
    ///   {index_dir}/
    ///     ├── index_00000.idx
    ///     ├── index_00001.idx
    ///     └── ...
    pub index_dir: PathBuf,

    /// Addressing discipline, recorded in every new file header
    pub mode: RunMode,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: how often to fsync the current index file
    pub sync: SyncStrategy,

    // -------------------------------------------------------------------------
    // Layout Configuration
    // -------------------------------------------------------------------------
    /// Number of hash branches (fixed for the lifetime of the index)
    pub branch_count: usize,

    /// Rotate to a new index file once the current one reaches this size (bytes)
    pub max_file_size: u64,

    /// Optional record-count threshold for rotation
    pub max_file_records: Option<u64>,
}

/// Addressing discipline of the host engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunMode {
    /// Caller-supplied keys, looked up by hash
    User,

    /// Keys are sequence ids generated by the index
    Sequential,

    /// Like sequential, but clients address values by a direct key
    Direct,
}

impl RunMode {
    /// Byte stored in the index file header
    pub fn as_byte(self) -> u8 {
        match self {
            RunMode::User => 0,
            RunMode::Sequential => 1,
            RunMode::Direct => 2,
        }
    }

    /// Parse a header mode byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(RunMode::User),
            1 => Some(RunMode::Sequential),
            2 => Some(RunMode::Direct),
            _ => None,
        }
    }

    /// True for the modes that key entries by generated sequence ids
    pub fn uses_sequence_ids(self) -> bool {
        !matches!(self, RunMode::User)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunMode::User => "user",
            RunMode::Sequential => "sequential",
            RunMode::Direct => "direct",
        };
        f.write_str(name)
    }
}

/// Index file sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Never fsync implicitly; rely on the OS and explicit `sync()` calls
    Off,

    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync on a write once this much time has passed since the last sync
    Interval(Duration),
}

impl SyncStrategy {
    /// Map the engine's raw "sync flag + sync interval (seconds)" settings
    ///
    /// The flag wins over the interval; an interval of zero means off.
    pub fn from_flags(sync: bool, interval_secs: u64) -> Self {
        if sync {
            SyncStrategy::EveryWrite
        } else if interval_secs > 0 {
            SyncStrategy::Interval(Duration::from_secs(interval_secs))
        } else {
            SyncStrategy::Off
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("./atlaskv_data/index"),
            mode: RunMode::User,
            sync: SyncStrategy::Interval(Duration::from_secs(10)),
            branch_count: 1 << 16,
            max_file_size: 256 * 1024 * 1024, // 256 MB
            max_file_records: None,
        }
    }
}

impl Settings {
    /// Create a new settings builder
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.branch_count == 0 {
            return Err(IndexError::Config("branch_count must be at least 1".to_string()));
        }
        if self.max_file_size <= HEADER_SIZE as u64 {
            return Err(IndexError::Config(format!(
                "max_file_size must exceed the {} byte header",
                HEADER_SIZE
            )));
        }
        if self.max_file_records == Some(0) {
            return Err(IndexError::Config("max_file_records must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Builder for Settings
#[derive(Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Set the index directory
    pub fn index_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.index_dir = path.into();
        self
    }

    /// Set the run mode
    pub fn mode(mut self, mode: RunMode) -> Self {
        self.settings.mode = mode;
        self
    }

    /// Set the sync strategy
    pub fn sync(mut self, strategy: SyncStrategy) -> Self {
        self.settings.sync = strategy;
        self
    }

    /// Set the number of hash branches
    pub fn branch_count(mut self, count: usize) -> Self {
        self.settings.branch_count = count;
        self
    }

    /// Set the rotation size threshold (in bytes)
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.settings.max_file_size = size;
        self
    }

    /// Set the rotation record-count threshold
    pub fn max_file_records(mut self, count: u64) -> Self {
        self.settings.max_file_records = Some(count);
        self
    }

    pub fn build(self) -> Result<Settings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}
