// src/queue/error.rs
// =============================================================================
// Errors returned by the persistent grouped queue.
//
// Callers care about three families:
// - Closed: the queue is shutting down, stop asking
// - Timeout: nothing to do right now, ask again
// - everything else: an I/O or encoding failure for that one operation
// =============================================================================

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,

    #[error("no item became available before the dequeue timeout")]
    Timeout,

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode item: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode item at offset {offset}: {source}")]
    Decode {
        offset: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read queue metadata: {0}")]
    Metadata(#[source] serde_json::Error),

    #[error("URL has no host to group by: {0}")]
    MissingHost(String),

    #[error("queue directory {} is already open in another process", .0.display())]
    Locked(PathBuf),
}

impl QueueError {
    pub(crate) fn io(context: &'static str, source: io::Error) -> Self {
        QueueError::Io { context, source }
    }

    /// Only a timeout means "try again later"; a closed queue never reopens.
    pub fn is_retriable(&self) -> bool {
        matches!(self, QueueError::Timeout)
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
