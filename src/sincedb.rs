//! Sincedb: crash-safe persistence of the read cursor.
//!
//! The sincedb is a single small JSON file recording the next byte to read
//! as a `(segment id, offset)` pair. Updates use the atomic write pattern:
//!
//! 1. Write to a temp file: `{sincedb}.tmp`
//! 2. Rename onto the final path
//!
//! so a crash mid-write never leaves a partially written cursor readable by
//! the next load. A missing or empty file means "start of log"; a file with
//! an unexpected version is rejected rather than guessed at.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tracing::debug;

use crate::error::{SinceDbError, SinceDbIoSnafu, SinceDbParseSnafu};

/// Current sincedb file format version.
pub const SINCEDB_VERSION: u32 = 1;

/// Next-read position: the first byte not yet delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Segment the next read starts in.
    pub segment_id: u64,
    /// Byte offset within that segment.
    pub offset: u64,
}

impl Cursor {
    /// Cursor at the start of the given segment.
    pub fn start_of(segment_id: u64) -> Self {
        Self {
            segment_id,
            offset: 0,
        }
    }
}

/// On-disk representation of the cursor.
#[derive(Debug, Serialize, Deserialize)]
struct SinceDbState {
    version: u32,
    segment_id: u64,
    offset: u64,
}

/// Loads and atomically rewrites the sincedb file.
#[derive(Debug, Clone)]
pub struct SinceDb {
    path: PathBuf,
}

impl SinceDb {
    /// Create a store backed by the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The sincedb file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Load the persisted cursor.
    ///
    /// Returns `None` when the file does not exist or is empty (start of
    /// log). Fails on unreadable content or a version mismatch.
    pub async fn load(&self) -> Result<Option<Cursor>, SinceDbError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No sincedb found, starting from beginning");
                return Ok(None);
            }
            Err(e) => {
                return Err(SinceDbError::SinceDbIo {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        // An empty sincedb is one that was created but never assigned a
        // position; treat it like a missing one.
        if bytes.is_empty() {
            return Ok(None);
        }

        let state: SinceDbState = serde_json::from_slice(&bytes).context(SinceDbParseSnafu {
            path: self.path.clone(),
        })?;

        ensure!(
            state.version == SINCEDB_VERSION,
            crate::error::VersionMismatchSnafu {
                found: state.version,
                expected: SINCEDB_VERSION,
            }
        );

        debug!(
            path = %self.path.display(),
            segment_id = state.segment_id,
            offset = state.offset,
            "Loaded sincedb"
        );

        Ok(Some(Cursor {
            segment_id: state.segment_id,
            offset: state.offset,
        }))
    }

    /// Atomically persist the cursor.
    pub async fn save(&self, cursor: Cursor) -> Result<(), SinceDbError> {
        let state = SinceDbState {
            version: SINCEDB_VERSION,
            segment_id: cursor.segment_id,
            offset: cursor.offset,
        };

        let json = serde_json::to_vec(&state).context(SinceDbParseSnafu {
            path: self.path.clone(),
        })?;

        let temp = self.temp_path();
        tokio::fs::write(&temp, &json)
            .await
            .context(SinceDbIoSnafu { path: temp.clone() })?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .context(SinceDbIoSnafu {
                path: self.path.clone(),
            })?;

        debug!(
            segment_id = cursor.segment_id,
            offset = cursor.offset,
            "Flushed sincedb"
        );

        Ok(())
    }
}
