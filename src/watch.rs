//! Filesystem change subscription for the live tail.
//!
//! Wraps a platform watcher (`notify`) on the queue directory and bridges
//! its events into an unbounded tokio channel, so the consumption loop can
//! block on "something changed" without busy polling. On Linux a watch on
//! the directory reports both new segment files and appends to existing
//! ones.
//!
//! The wait races against a [`CancellationToken`]: `stop()` during a wait
//! is cooperative cancellation, not an error. Events arriving while the
//! loop is busy reading are retained by the channel, so no wakeup between
//! a read and the next wait can be lost.

use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use snafu::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{NotifySnafu, WatchError};

/// Why a wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The watched directory changed; re-read the queue.
    Changed,
    /// Shutdown was requested (or the watch subsystem closed).
    Cancelled,
}

/// Blocking subscription to changes in one queue directory.
pub struct DirWatcher {
    // Held to keep the platform watcher registered.
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<()>,
}

impl DirWatcher {
    /// Start watching the given directory.
    pub fn watch(path: &Path) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher =
            notify::recommended_watcher(move |result: Result<Event, notify::Error>| {
                match result {
                    Ok(event) if is_relevant(&event.kind) => {
                        // Receiver gone means the tailer is shutting down.
                        let _ = tx.send(());
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Filesystem watch event error: {e}"),
                }
            })
            .context(NotifySnafu)?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .context(NotifySnafu)?;

        debug!(path = %path.display(), "Watching queue directory");
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Suspend until the directory changes or shutdown is requested.
    ///
    /// Coalesces bursts of pending events into a single wakeup.
    pub async fn wait(&mut self, shutdown: &CancellationToken) -> WaitOutcome {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => WaitOutcome::Cancelled,

            received = self.rx.recv() => match received {
                Some(()) => {
                    while self.rx.try_recv().is_ok() {}
                    WaitOutcome::Changed
                }
                None => {
                    debug!("Watch channel closed, treating as cancellation");
                    WaitOutcome::Cancelled
                }
            },
        }
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
