// src/queue/log.rs
// =============================================================================
// The durable item log: an append-only file of newline-delimited JSON records.
//
// Every enqueued item is appended once. The byte offset where its record
// starts is the only handle the fairness index keeps. Offsets are never
// reused and the file never shrinks.
//
// serde_json escapes control characters inside strings, so a raw '\n' can
// only appear as a record delimiter.
// =============================================================================

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::error::{QueueError, Result};
use super::item::Item;

const DELIMITER: u8 = b'\n';

#[derive(Debug)]
pub struct ItemLog {
    file: File,
    path: PathBuf,
    end: u64,
}

impl ItemLog {
    /// Opens (or creates) the log at `path`.
    ///
    /// If a previous process died mid-append the file may end in a partial
    /// record; a delimiter is written so the next record starts on its own line.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| QueueError::io("failed to open item log", e))?;
        let end = file
            .metadata()
            .map_err(|e| QueueError::io("failed to stat item log", e))?
            .len();

        let mut log = Self { file, path, end };
        log.repair_tail()?;
        debug!(path = %log.path.display(), bytes = log.end, "opened item log");
        Ok(log)
    }

    /// Size of the log in bytes. Every valid offset is below this.
    pub fn len(&self) -> u64 {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    /// Appends one record and returns the offset it starts at.
    pub fn append(&mut self, item: &Item) -> Result<u64> {
        let mut record = serde_json::to_vec(item).map_err(QueueError::Encode)?;
        record.push(DELIMITER);

        let offset = self.end;
        if let Err(e) = self.file.write_all(&record).and_then(|_| self.file.flush()) {
            // Part of the record may have landed; resync with the file
            if let Ok(meta) = self.file.metadata() {
                self.end = meta.len();
            }
            if let Err(repair) = self.repair_tail() {
                warn!(path = %self.path.display(), error = %repair, "failed to repair item log tail");
            }
            return Err(QueueError::io("failed to append to item log", e));
        }

        self.end += record.len() as u64;
        Ok(offset)
    }

    /// Seeks to `offset` and decodes exactly one record.
    pub fn read_at(&mut self, offset: u64) -> Result<Item> {
        if offset >= self.end {
            return Err(QueueError::io(
                "item offset is past the end of the log",
                io::Error::from(io::ErrorKind::UnexpectedEof),
            ));
        }

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| QueueError::io("failed to seek to item position", e))?;

        let mut line = Vec::new();
        let read = BufReader::new(&mut self.file)
            .read_until(DELIMITER, &mut line)
            .map_err(|e| QueueError::io("failed to read item record", e))?;
        if read == 0 {
            return Err(QueueError::io(
                "failed to read item record",
                io::Error::from(io::ErrorKind::UnexpectedEof),
            ));
        }
        if line.last() == Some(&DELIMITER) {
            line.pop();
        }

        serde_json::from_slice(&line).map_err(|source| QueueError::Decode { offset, source })
    }

    fn repair_tail(&mut self) -> Result<()> {
        if self.end == 0 {
            return Ok(());
        }

        let mut last = [0u8; 1];
        self.file
            .seek(SeekFrom::Start(self.end - 1))
            .and_then(|_| self.file.read_exact(&mut last))
            .map_err(|e| QueueError::io("failed to read item log tail", e))?;

        if last[0] != DELIMITER {
            warn!(path = %self.path.display(), bytes = self.end, "item log ends in a partial record, sealing it");
            self.file
                .write_all(&[DELIMITER])
                .map_err(|e| QueueError::io("failed to seal item log tail", e))?;
            self.end += 1;
        }
        Ok(())
    }
}
