//! Index file reader
//!
//! Streams item records out of one index file, lazily and in on-disk order.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::{IndexHeader, ItemRecord, HEADER_SIZE, RECORD_FIXED_SIZE};

/// Reads records from a single index file
pub struct IndexReader {
    path: PathBuf,
    header: IndexHeader,
    reader: BufReader<File>,
    /// End of the last complete record
    position: u64,
    /// A partial record was found at the tail
    truncated: bool,
    /// Iteration has ended (EOF, torn tail or I/O error)
    finished: bool,
}

impl IndexReader {
    /// Open an index file and validate its header
    pub fn open(path: &Path, file_id: u16) -> Result<Self> {
        let mut file = File::open(path)?;

        let mut raw = [0u8; HEADER_SIZE];
        let read = read_full(&mut file, &mut raw)?;
        let header = IndexHeader::decode(&raw[..read], file_id)?;

        Ok(Self {
            path: path.to_path_buf(),
            header,
            reader: BufReader::new(file),
            position: HEADER_SIZE as u64,
            truncated: false,
            finished: false,
        })
    }

    /// Read the next record
    ///
    /// Returns `Ok(None)` at the end of valid data: either a clean end of
    /// file, or a torn record left by a crash mid-write (see `was_truncated`).
    pub fn next_record(&mut self) -> Result<Option<ItemRecord>> {
        if self.finished {
            return Ok(None);
        }

        let mut raw = vec![0u8; RECORD_FIXED_SIZE];
        let read = self.fill(&mut raw)?;
        if read == 0 {
            self.finished = true;
            return Ok(None);
        }
        if read < RECORD_FIXED_SIZE {
            return Ok(self.stop_truncated());
        }

        let total = RECORD_FIXED_SIZE + raw[0] as usize;
        raw.resize(total, 0);
        let read = self.fill(&mut raw[RECORD_FIXED_SIZE..])?;
        if read < total - RECORD_FIXED_SIZE {
            return Ok(self.stop_truncated());
        }

        let (record, used) = ItemRecord::decode(&raw)?;
        self.position += used as u64;
        Ok(Some(record))
    }

    /// Restart from the first record of the file
    pub fn rewind(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        self.position = HEADER_SIZE as u64;
        self.truncated = false;
        self.finished = false;
        Ok(())
    }

    /// Header of this file
    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    /// Path of this file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset just past the last complete record read so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether a torn record was found at the tail
    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    fn stop_truncated(&mut self) -> Option<ItemRecord> {
        tracing::warn!(
            path = %self.path.display(),
            valid_len = self.position,
            "Torn record at end of index file, treating as end of data"
        );
        self.truncated = true;
        self.finished = true;
        None
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        match read_full(&mut self.reader, buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.finished = true;
                Err(e.into())
            }
        }
    }
}

impl Iterator for IndexReader {
    type Item = Result<ItemRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Read until `buf` is full or EOF; returns the number of bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
