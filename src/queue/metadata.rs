// src/queue/metadata.rs
// =============================================================================
// Checkpoints of the fairness index and stats.
//
// The item log holds payloads; this snapshot says which of them are still
// pending and in what order. It is rewritten in full after every mutation:
// written to a sibling temp file, then renamed over the old snapshot so a
// crash leaves either the old or the new version, never half of one.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::error::{QueueError, Result};
use super::index::HostIndex;
use super::stats::QueueStats;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMetadata {
    pub index: HostIndex,
    pub stats: QueueStats,
}

impl QueueMetadata {
    /// Reads the snapshot at `path`, or None if none was ever written.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(QueueError::io("failed to read queue metadata", e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(QueueError::Metadata)
    }

    #[cfg(test)]
    pub(crate) fn save(&self, path: &Path) -> Result<()> {
        save_parts(&self.index, &self.stats, path)
    }
}

/// Writes a snapshot from borrowed parts, so the queue does not have to
/// clone its index on every checkpoint.
pub(crate) fn save_parts(index: &HostIndex, stats: &QueueStats, path: &Path) -> Result<()> {
    #[derive(Serialize)]
    struct Snapshot<'a> {
        index: &'a HostIndex,
        stats: &'a QueueStats,
    }

    let bytes = serde_json::to_vec(&Snapshot { index, stats }).map_err(QueueError::Encode)?;
    let tmp = temp_path(path);

    let mut file = fs::File::create(&tmp)
        .map_err(|e| QueueError::io("failed to create queue metadata", e))?;
    file.write_all(&bytes)
        .and_then(|_| file.sync_data())
        .map_err(|e| QueueError::io("failed to write queue metadata", e))?;
    fs::rename(&tmp, path).map_err(|e| QueueError::io("failed to replace queue metadata", e))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
