//! Index Journal Module
//!
//! Durable, append-only log of item records, split into numbered index files.
//!
//! ## Responsibilities
//! - Append one record per index mutation before it becomes visible
//! - Rotate to a new file id when the current file is full
//! - Replay every file in id order on startup
//! - Treat a torn trailing record as the end of valid data
//!
//! ## File Format (little-endian, no padding)
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ Header (27 bytes)                                             │
//! │ ┌─────────┬─────────┬─────────┬────────┬─────────┬─────────┐  │
//! │ │Magic (4)│ Ver (4) │Created 8│Opened 8│FileId(2)│ Mode (1)│  │
//! │ └─────────┴─────────┴─────────┴────────┴─────────┴─────────┘  │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Item Record 1                                                 │
//! │ ┌──────┬────────────┬────────────┬───────┬────────┬────────┐  │
//! │ │IdLen1│ Offset (8) │ Length (8) │Flags 1│DataId 2│ Id ... │  │
//! │ └──────┴────────────┴────────────┴───────┴────────┴────────┘  │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Item Record 2 ...                                             │
//! └───────────────────────────────────────────────────────────────┘
//! ```

mod header;
mod reader;
mod record;
mod recovery;
mod writer;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub use header::{IndexHeader, HEADER_SIZE, MAGIC, VERSION};
pub use reader::IndexReader;
pub use record::{ItemRecord, RECORD_FIXED_SIZE};
pub use recovery::{FileReport, FileStatus, IndexRecovery, Replay, ReplayReport, ReplayedRecord};
pub use writer::{IndexWriter, WriterOptions};

/// Width of the zero-padded file id in index filenames
const FILE_ID_DIGITS: usize = 5;

/// Path of the index file with the given id
pub fn index_file_path(dir: &Path, file_id: u16) -> PathBuf {
    dir.join(format!("index_{:0width$}.idx", file_id, width = FILE_ID_DIGITS))
}

/// Parse a file id from an index filename
/// "index_00042.idx" → Some(42)
///
/// Only the exact name `index_file_path` produces is accepted, so every
/// discovered id maps back to the file it came from.
pub fn parse_file_id(path: &Path) -> Option<u16> {
    if path.extension()?.to_str()? != "idx" {
        return None;
    }
    let name = path.file_stem()?.to_str()?;
    let id_str = name.strip_prefix("index_")?;
    if id_str.len() != FILE_ID_DIGITS || !id_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id_str.parse().ok()
}

/// Seconds since the unix epoch (0 if the clock is before it)
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
