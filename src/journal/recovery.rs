//! Index recovery
//!
//! Discovers index files and replays them in file id order.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::RunMode;
use crate::error::{IndexError, Result};

use super::{index_file_path, parse_file_id, IndexReader, ItemRecord};

/// Entry point for startup replay and offline verification
pub struct IndexRecovery;

/// How replay of one file went
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// Every byte after the header decoded into records
    Clean,

    /// Zero-length file (crash between create and header write)
    Empty,

    /// A torn record was dropped from the tail
    Truncated,

    /// Magic/version mismatch or short header; the file was skipped
    Corrupt(String),

    /// An I/O error stopped replay of this file part way
    Unreadable(String),
}

/// Per-file replay statistics
#[derive(Debug, Clone)]
pub struct FileReport {
    pub file_id: u16,
    pub path: PathBuf,
    pub status: FileStatus,

    /// Records replayed from this file (tombstones included)
    pub records: u64,

    /// Tombstone records among them
    pub tombstones: u64,

    /// Offset just past the last complete record (the valid append point)
    pub valid_len: u64,

    /// Run mode the file was created in, when known
    pub mode: Option<RunMode>,
}

impl FileReport {
    /// True when the file was skipped or only partially read because of an error
    pub fn is_damaged(&self) -> bool {
        matches!(self.status, FileStatus::Corrupt(_) | FileStatus::Unreadable(_))
    }
}

/// Result of replaying a whole index directory
#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    pub files: Vec<FileReport>,
}

impl ReplayReport {
    /// Any file was corrupt or unreadable
    pub fn is_degraded(&self) -> bool {
        self.files.iter().any(FileReport::is_damaged)
    }

    /// Total records replayed across all files
    pub fn records(&self) -> u64 {
        self.files.iter().map(|f| f.records).sum()
    }

    /// Total tombstones replayed across all files
    pub fn tombstones(&self) -> u64 {
        self.files.iter().map(|f| f.tombstones).sum()
    }

    /// Report of the highest file id, if any file exists
    pub fn last_file(&self) -> Option<&FileReport> {
        self.files.last()
    }

    /// Files that were skipped or cut short by errors
    pub fn damaged_files(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.is_damaged())
    }
}

/// A replayed record tagged with the file it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedRecord {
    pub file_id: u16,
    pub record: ItemRecord,
}

/// Lazy replay over every index file in ascending id order
///
/// Damaged files never stop the iteration; they are recorded in the
/// report and replay moves on to the next file.
pub struct Replay {
    dir: PathBuf,
    pending: VecDeque<u16>,
    current: Option<(IndexReader, FileReport)>,
    report: ReplayReport,
}

impl Replay {
    /// Report for the files finished so far
    pub fn report(&self) -> &ReplayReport {
        &self.report
    }

    /// Drain any remaining records and return the full report
    pub fn finish(mut self) -> ReplayReport {
        for _ in self.by_ref() {}
        self.report
    }

    /// Open the next pending file; damaged or empty files are reported directly
    fn open_next(&mut self) -> bool {
        while let Some(file_id) = self.pending.pop_front() {
            let path = index_file_path(&self.dir, file_id);
            let mut report = FileReport {
                file_id,
                path: path.clone(),
                status: FileStatus::Clean,
                records: 0,
                tombstones: 0,
                valid_len: 0,
                mode: None,
            };

            match fs::metadata(&path) {
                Ok(meta) if meta.len() == 0 => {
                    tracing::warn!(file_id, "Index file is empty, no header");
                    report.status = FileStatus::Empty;
                    self.report.files.push(report);
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(file_id, error = %e, "Cannot stat index file, skipping");
                    report.status = FileStatus::Unreadable(e.to_string());
                    self.report.files.push(report);
                    continue;
                }
            }

            match IndexReader::open(&path, file_id) {
                Ok(reader) => {
                    report.valid_len = reader.position();
                    report.mode = reader.header().run_mode();
                    if reader.header().file_id != file_id {
                        tracing::warn!(
                            file_id,
                            header_file_id = reader.header().file_id,
                            "Index file name and header disagree on file id"
                        );
                    }
                    tracing::debug!(file_id, mode = ?report.mode, "Replaying index file");
                    self.current = Some((reader, report));
                    return true;
                }
                Err(IndexError::CorruptHeader { reason, .. }) => {
                    tracing::warn!(file_id, %reason, "Corrupt index header, excluding file from replay");
                    report.status = FileStatus::Corrupt(reason);
                    self.report.files.push(report);
                }
                Err(e) => {
                    tracing::warn!(file_id, error = %e, "Cannot open index file, skipping");
                    report.status = FileStatus::Unreadable(e.to_string());
                    self.report.files.push(report);
                }
            }
        }
        false
    }

    fn close_current(&mut self, status: Option<FileStatus>) {
        if let Some((reader, mut report)) = self.current.take() {
            report.valid_len = reader.position();
            report.status = match status {
                Some(status) => status,
                None if reader.was_truncated() => FileStatus::Truncated,
                None => FileStatus::Clean,
            };
            tracing::debug!(
                file_id = report.file_id,
                records = report.records,
                status = ?report.status,
                "Finished index file"
            );
            self.report.files.push(report);
        }
    }
}

impl Iterator for Replay {
    type Item = ReplayedRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current.is_none() && !self.open_next() {
                return None;
            }

            let (reader, report) = self.current.as_mut()?;
            match reader.next_record() {
                Ok(Some(record)) => {
                    report.records += 1;
                    if record.is_tombstone() {
                        report.tombstones += 1;
                    }
                    return Some(ReplayedRecord {
                        file_id: report.file_id,
                        record,
                    });
                }
                Ok(None) => self.close_current(None),
                Err(e) => {
                    tracing::warn!(file_id = report.file_id, error = %e, "Read error during replay");
                    self.close_current(Some(FileStatus::Unreadable(e.to_string())));
                }
            }
        }
    }
}

impl IndexRecovery {
    /// Index file ids present in `dir`, ascending
    pub fn discover(dir: &Path) -> Result<Vec<u16>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match parse_file_id(&path) {
                Some(id) => ids.push(id),
                None => tracing::debug!(path = %path.display(), "Ignoring non-index file"),
            }
        }
        ids.sort_unstable();
        ids.dedup();

        for pair in ids.windows(2) {
            if pair[0].checked_add(1) != Some(pair[1]) {
                tracing::warn!(after = pair[0], next = pair[1], "Gap in index file ids");
            }
        }
        Ok(ids)
    }

    /// Start a lazy replay of every index file in `dir`
    pub fn replay(dir: &Path) -> Result<Replay> {
        let ids = Self::discover(dir)?;
        Ok(Replay {
            dir: dir.to_path_buf(),
            pending: ids.into(),
            current: None,
            report: ReplayReport::default(),
        })
    }

    /// Scan every index file without building an index
    pub fn verify(dir: &Path) -> Result<ReplayReport> {
        Ok(Self::replay(dir)?.finish())
    }
}
