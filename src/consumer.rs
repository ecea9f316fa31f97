//! Consumer seam between the tailer and the host pipeline.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::entry::DlqEntry;
use crate::error::ConsumerRejected;

/// Receives decoded entries, one at a time, in queue order.
///
/// `accept` may block on backpressure; the tailer intentionally does not
/// race ahead of what the consumer absorbs. Returning an error stops the
/// run without advancing the cursor past the rejected entry, so a later
/// run redelivers it. `accept` is never invoked again for an entry it has
/// already accepted.
#[async_trait]
pub trait EntryConsumer: Send {
    /// Accept one entry.
    async fn accept(&mut self, entry: DlqEntry) -> Result<(), ConsumerRejected>;
}

/// A bounded channel sender is a consumer: sends apply backpressure, and a
/// dropped receiver rejects delivery.
#[async_trait]
impl EntryConsumer for mpsc::Sender<DlqEntry> {
    async fn accept(&mut self, entry: DlqEntry) -> Result<(), ConsumerRejected> {
        self.send(entry).await.map_err(|_| ConsumerRejected {
            message: "entry channel closed".to_string(),
        })
    }
}
