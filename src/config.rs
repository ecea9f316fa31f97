//! Configuration for the dead letter queue tailer.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use snafu::prelude::*;

use crate::error::{ConfigError, DataDirSnafu, InvalidStartTimestampSnafu};

/// Environment variable overriding the default data directory.
pub const DATA_DIR_ENV: &str = "DLQTAIL_DATA_DIR";

/// Fallback data directory when neither config nor environment set one.
const DEFAULT_DATA_DIR: &str = "./data";

/// Subdirectory of the data dir holding derived sincedb files.
const SINCEDB_SUBDIR: &str = "dead_letter_queue";

fn default_commit_offsets() -> bool {
    true
}

/// User-facing tailer configuration.
///
/// Validated and resolved at `register()` time; invalid combinations never
/// reach the consumption loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailerConfig {
    /// Directory containing the dead letter queue segments.
    pub path: PathBuf,
    /// Cursor file location. Defaults to a path derived from a hash of
    /// `path` under the data directory, so distinct queues never collide.
    #[serde(default)]
    pub sincedb_path: Option<PathBuf>,
    /// Data root for derived sincedb paths. Defaults from the
    /// `DLQTAIL_DATA_DIR` environment variable.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Persist the cursor after every delivered entry. When false the
    /// cursor is persisted only at segment rollover and on close.
    #[serde(default = "default_commit_offsets")]
    pub commit_offsets: bool,
    /// RFC 3339 timestamp; entries older than this are skipped on the
    /// first pass through the queue.
    #[serde(default)]
    pub start_timestamp: Option<String>,
    /// Delete sealed segments once fully delivered. Requires
    /// `commit_offsets`.
    #[serde(default)]
    pub clean_consumed: bool,
}

impl TailerConfig {
    /// Configuration for the given queue directory with default options.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sincedb_path: None,
            data_dir: None,
            commit_offsets: default_commit_offsets(),
            start_timestamp: None,
            clean_consumed: false,
        }
    }

    /// Validate and resolve into the form the tailer runs with.
    pub(crate) fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let metadata = std::fs::metadata(&self.path).map_err(|_| ConfigError::QueuePathMissing {
            path: self.path.clone(),
        })?;
        ensure!(
            metadata.is_dir(),
            crate::error::QueuePathNotDirectorySnafu {
                path: self.path.clone(),
            }
        );

        ensure!(
            !(self.clean_consumed && !self.commit_offsets),
            crate::error::ConfigurationConflictSnafu
        );

        let start_timestamp = match &self.start_timestamp {
            Some(value) => Some(
                DateTime::parse_from_rfc3339(value)
                    .context(InvalidStartTimestampSnafu {
                        value: value.clone(),
                    })?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        let sincedb_path = match &self.sincedb_path {
            Some(path) => {
                ensure!(
                    !path.is_dir(),
                    crate::error::InvalidLocationSnafu { path: path.clone() }
                );
                path.clone()
            }
            None => self.derive_sincedb_path()?,
        };

        Ok(ResolvedConfig {
            path: self.path.clone(),
            sincedb_path,
            commit_offsets: self.commit_offsets,
            start_timestamp,
            clean_consumed: self.clean_consumed,
        })
    }

    /// Default sincedb path: `{data_dir}/dead_letter_queue/.sincedb_{hash}`.
    ///
    /// The hash is over the queue path so multiple tailers on different
    /// queues sharing one data dir keep separate cursors.
    fn derive_sincedb_path(&self) -> Result<PathBuf, ConfigError> {
        let data_dir = self
            .data_dir
            .clone()
            .or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let dir = data_dir.join(SINCEDB_SUBDIR);
        std::fs::create_dir_all(&dir).context(DataDirSnafu { path: dir.clone() })?;

        Ok(dir.join(format!(".sincedb_{}", queue_path_hash(&self.path))))
    }
}

/// Validated configuration the tailer runs with.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedConfig {
    pub path: PathBuf,
    pub sincedb_path: PathBuf,
    pub commit_offsets: bool,
    pub start_timestamp: Option<DateTime<Utc>>,
    pub clean_consumed: bool,
}

/// First 8 bytes of SHA-256 over the queue path, hex-encoded.
fn queue_path_hash(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    digest
        .iter()
        .take(8)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}
