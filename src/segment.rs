//! Segment store: enumeration and positioned reads of segment files.
//!
//! A dead letter queue directory holds segments named `{id}.log` where `id`
//! is a monotonically increasing integer assigned by the writer. The
//! highest id is the "current" segment and may still be growing; every
//! lower id is sealed. Files that do not match the naming scheme (temp
//! files, lock files) are ignored.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use snafu::prelude::*;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::trace;

use crate::error::{IoSnafu, SegmentError};

/// File extension for segment files.
pub const SEGMENT_EXTENSION: &str = "log";

/// One segment file as seen at listing time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Monotonically increasing segment id.
    pub id: u64,
    /// Absolute path to the segment file.
    pub path: PathBuf,
    /// File size at listing time. Grows while the segment is current.
    pub size: u64,
}

/// Lists and reads the ordered segment files of one queue directory.
#[derive(Debug, Clone)]
pub struct SegmentStore {
    dir: PathBuf,
}

impl SegmentStore {
    /// Create a store over the given queue directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The queue directory this store reads from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a segment with the given id would live at.
    pub fn segment_path(&self, segment_id: u64) -> PathBuf {
        self.dir.join(format!("{segment_id}.{SEGMENT_EXTENSION}"))
    }

    /// List segments in ascending id order, re-reading the directory.
    pub async fn list_segments(&self) -> Result<Vec<Segment>, SegmentError> {
        let mut segments = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await.context(IoSnafu)?;

        while let Some(dir_entry) = entries.next_entry().await.context(IoSnafu)? {
            let path = dir_entry.path();
            let Some(id) = parse_segment_id(&path) else {
                continue;
            };
            let metadata = dir_entry.metadata().await.context(IoSnafu)?;
            segments.push(Segment {
                id,
                path,
                size: metadata.len(),
            });
        }

        segments.sort_by_key(|segment| segment.id);
        trace!(count = segments.len(), "Listed segments");
        Ok(segments)
    }

    /// Read all flushed bytes of a segment starting at `offset`.
    ///
    /// Returns an empty buffer when `offset` is at or past the flushed end
    /// of the file ("no data yet", not an error). Fails with
    /// [`SegmentError::NotFound`] if the segment was deleted between
    /// listing and opening.
    pub async fn read_from(&self, segment_id: u64, offset: u64) -> Result<Bytes, SegmentError> {
        let path = self.segment_path(segment_id);

        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SegmentError::NotFound { segment_id, path });
            }
            Err(e) => return Err(SegmentError::Io { source: e }),
        };

        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .context(IoSnafu)?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.context(IoSnafu)?;

        trace!(segment_id, offset, bytes = buf.len(), "Read segment bytes");
        Ok(Bytes::from(buf))
    }
}

/// Parse a segment id out of a `{id}.log` file name.
fn parse_segment_id(path: &Path) -> Option<u64> {
    if path.extension()?.to_str()? != SEGMENT_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_segment_id() {
        assert_eq!(parse_segment_id(Path::new("/q/1.log")), Some(1));
        assert_eq!(parse_segment_id(Path::new("/q/42.log")), Some(42));
        assert_eq!(parse_segment_id(Path::new("/q/42.log.tmp")), None);
        assert_eq!(parse_segment_id(Path::new("/q/current.log")), None);
        assert_eq!(parse_segment_id(Path::new("/q/7.json")), None);
        assert_eq!(parse_segment_id(Path::new("/q/.lock")), None);
    }

    #[tokio::test]
    async fn test_list_segments_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["10.log", "2.log", "1.log", "notes.txt", "3.log.tmp"] {
            std::fs::write(temp_dir.path().join(name), b"x").unwrap();
        }

        let store = SegmentStore::new(temp_dir.path());
        let segments = store.list_segments().await.unwrap();

        let ids: Vec<u64> = segments.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 10]);
        assert!(segments.iter().all(|s| s.size == 1));
    }

    #[tokio::test]
    async fn test_read_from_offset() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("1.log"), b"hello world").unwrap();

        let store = SegmentStore::new(temp_dir.path());
        let bytes = store.read_from(1, 6).await.unwrap();
        assert_eq!(&bytes[..], b"world");
    }

    #[tokio::test]
    async fn test_read_past_eof_returns_empty() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("1.log"), b"abc").unwrap();

        let store = SegmentStore::new(temp_dir.path());
        let bytes = store.read_from(1, 100).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_segment_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = SegmentStore::new(temp_dir.path());

        let err = store.read_from(5, 0).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
