//! Deletion of fully consumed sealed segments.

use snafu::prelude::*;
use tracing::{info, warn};

use crate::error::{IoSnafu, SegmentError};
use crate::segment::SegmentStore;

/// Deletes sealed segments once the cursor has rolled past them.
///
/// Only constructed when `clean_consumed` is enabled, which registration
/// only allows together with per-entry cursor persistence: the segment
/// backing a cursor must never be deleted before that cursor is durable.
#[derive(Debug)]
pub struct Reclaimer {
    store: SegmentStore,
}

impl Reclaimer {
    /// Create a reclaimer over the same directory as the store.
    pub fn new(store: SegmentStore) -> Self {
        Self { store }
    }

    /// Delete the segment file for `segment_id`.
    ///
    /// A segment that is already gone is logged and ignored; the goal of
    /// bounding disk usage is met either way.
    pub async fn reclaim(&self, segment_id: u64) -> Result<(), SegmentError> {
        let path = self.store.segment_path(segment_id);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(segment_id, path = %path.display(), "Reclaimed consumed segment");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(segment_id, "Consumed segment already removed");
                Ok(())
            }
            Err(e) => Err(e).context(IoSnafu),
        }
    }
}
