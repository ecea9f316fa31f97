//! Error types for the dead letter queue tailer.

use std::path::PathBuf;

use snafu::prelude::*;

use crate::tailer::TailerState;

/// Errors raised while resolving and validating configuration.
///
/// All of these surface synchronously from `register()`, before any
/// consumption starts.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Queue directory does not exist.
    #[snafu(display("Dead letter queue path {} does not exist", path.display()))]
    QueuePathMissing { path: PathBuf },

    /// Queue path exists but is not a directory.
    #[snafu(display("Dead letter queue path {} is not a directory", path.display()))]
    QueuePathNotDirectory { path: PathBuf },

    /// Sincedb path points at a directory instead of a file.
    #[snafu(display(
        "The sincedb path must point to a file, received a directory: {}",
        path.display()
    ))]
    InvalidLocation { path: PathBuf },

    /// Segment reclamation without per-entry cursor persistence.
    #[snafu(display(
        "clean_consumed requires commit_offsets=true: deleting a segment before \
         its cursor is durable would make the position unrecoverable on restart"
    ))]
    ConfigurationConflict,

    /// start_timestamp did not parse as RFC 3339.
    #[snafu(display("Invalid start_timestamp '{value}': {source}"))]
    InvalidStartTimestamp {
        value: String,
        source: chrono::ParseError,
    },

    /// Failed to create the data directory for the derived sincedb path.
    #[snafu(display("Failed to create data directory {}: {source}", path.display()))]
    DataDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors from the segment store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SegmentError {
    /// Segment file vanished between listing and opening.
    #[snafu(display("Segment {segment_id} not found at {}", path.display()))]
    NotFound { segment_id: u64, path: PathBuf },

    /// IO error while listing or reading segments.
    #[snafu(display("Segment store IO error: {source}"))]
    Io { source: std::io::Error },
}

impl SegmentError {
    /// Check if this error represents a missing segment.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SegmentError::NotFound { .. })
    }
}

/// Errors from decoding a record frame.
///
/// `Truncated` means fewer bytes than declared were available; at the tail
/// of the current segment this is the normal "caught up, wait for more"
/// signal, not corruption. Every other variant is fatal for the segment at
/// that offset.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DecodeError {
    /// Fewer bytes available than the frame declares.
    #[snafu(display("Record truncated at offset {offset}: have {have} bytes, need {needed}"))]
    Truncated {
        offset: u64,
        have: usize,
        needed: usize,
    },

    /// Declared length is zero or above the sanity cap.
    #[snafu(display("Invalid record length {length} at offset {offset}"))]
    InvalidLength { length: u32, offset: u64 },

    /// Integrity check failed.
    #[snafu(display(
        "CRC mismatch at offset {offset}: expected {expected:08x}, computed {computed:08x}"
    ))]
    CrcMismatch {
        offset: u64,
        expected: u32,
        computed: u32,
    },

    /// Frame was intact but the payload did not deserialize.
    #[snafu(display("Failed to decode entry payload at offset {offset}: {source}"))]
    Payload {
        offset: u64,
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Check if this is the benign wait-for-more-data signal.
    pub fn is_truncated(&self) -> bool {
        matches!(self, DecodeError::Truncated { .. })
    }
}

/// Errors from the sincedb cursor store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinceDbError {
    /// IO error reading or writing the sincedb file.
    #[snafu(display("Sincedb IO error at {}: {source}", path.display()))]
    SinceDbIo {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Sincedb file exists but does not parse.
    #[snafu(display("Failed to parse sincedb {}: {source}", path.display()))]
    SinceDbParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Sincedb file was written by an incompatible version.
    #[snafu(display("Sincedb version {found} does not match expected version {expected}"))]
    VersionMismatch { found: u32, expected: u32 },
}

/// Errors from the filesystem watch subsystem.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WatchError {
    /// Failed to create or register the filesystem watcher.
    #[snafu(display("Filesystem watch error: {source}"))]
    Notify { source: notify::Error },
}

/// The consumer callback refused an entry.
///
/// Delivery stops without advancing the cursor past the rejected entry, so
/// a later run redelivers it (at-least-once).
#[derive(Debug, Snafu)]
#[snafu(display("Consumer rejected entry: {message}"))]
pub struct ConsumerRejected {
    pub message: String,
}

/// Top-level tailer errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum TailerError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Segment store error.
    #[snafu(display("Segment store error: {source}"))]
    Segment { source: SegmentError },

    /// Corrupt record encountered; the tailer does not skip past it.
    #[snafu(display("Corrupt record in segment {segment_id}: {source}"))]
    Decode { segment_id: u64, source: DecodeError },

    /// Sealed segment ends in a partial record that can no longer complete.
    #[snafu(display("Sealed segment {segment_id} is torn at offset {offset}"))]
    TornSegment { segment_id: u64, offset: u64 },

    /// Sincedb error.
    #[snafu(display("Sincedb error: {source}"))]
    SinceDb { source: SinceDbError },

    /// Filesystem watch error.
    #[snafu(display("Filesystem watch error: {source}"))]
    Watch { source: WatchError },

    /// Consumer rejected an entry.
    #[snafu(display("Delivery failed: {source}"))]
    Deliver { source: ConsumerRejected },

    /// Lifecycle call out of order.
    #[snafu(display("Tailer is not runnable in state {state:?}"))]
    NotRegistered { state: TailerState },
}

impl From<ConfigError> for TailerError {
    fn from(source: ConfigError) -> Self {
        TailerError::Config { source }
    }
}

impl From<SegmentError> for TailerError {
    fn from(source: SegmentError) -> Self {
        TailerError::Segment { source }
    }
}

impl From<SinceDbError> for TailerError {
    fn from(source: SinceDbError) -> Self {
        TailerError::SinceDb { source }
    }
}

impl From<WatchError> for TailerError {
    fn from(source: WatchError) -> Self {
        TailerError::Watch { source }
    }
}

impl From<ConsumerRejected> for TailerError {
    fn from(source: ConsumerRejected) -> Self {
        TailerError::Deliver { source }
    }
}
