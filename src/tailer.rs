//! The segment tailer: ordered, resumable consumption of a dead letter
//! queue with live-tail semantics.
//!
//! Lifecycle: `Idle → Registered → Running → Stopping → Closed`.
//!
//! - [`DlqTailer::register`] validates configuration and primes the cursor:
//!   a persisted sincedb position wins; with no sincedb state and a
//!   configured `start_timestamp` the queue is scanned once to fast-forward
//!   past older entries.
//! - [`DlqTailer::run`] consumes entries in strict (segment id, offset)
//!   order and blocks until [`DlqTailer::stop`] (or a [`StopHandle`]) is
//!   invoked. At end-of-log it suspends on filesystem change notifications
//!   rather than polling.
//! - Delivery is at-least-once: the cursor is advanced, and under
//!   `commit_offsets` persisted, only after the consumer accepted the
//!   entry. A crash between delivery and persistence redelivers that entry
//!   on restart; it never skips one.

use chrono::{DateTime, Utc};
use metrics::counter;
use snafu::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::codec;
use crate::config::{ResolvedConfig, TailerConfig};
use crate::consumer::EntryConsumer;
use crate::error::{NotRegisteredSnafu, TailerError, TornSegmentSnafu};
use crate::filter::StartTimestampFilter;
use crate::reclaim::Reclaimer;
use crate::segment::SegmentStore;
use crate::sincedb::{Cursor, SinceDb};
use crate::watch::{DirWatcher, WaitOutcome};

/// Lifecycle state of a tailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailerState {
    /// Constructed, not yet validated.
    Idle,
    /// Configuration validated, cursor primed.
    Registered,
    /// Consumption loop active.
    Running,
    /// Stop requested, final cursor being flushed.
    Stopping,
    /// Loop exited, final cursor flushed.
    Closed,
}

/// Handle for requesting a stop from outside the running loop.
///
/// Cloneable and idempotent; safe to invoke while the tailer is blocked
/// waiting for filesystem changes or mid-delivery. The loop exits after
/// the in-flight delivery, if any, completes.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    /// Request the tailer to stop.
    pub fn stop(&self) {
        self.token.cancel();
    }
}

/// State populated by `register()`.
struct Registered {
    config: ResolvedConfig,
    store: SegmentStore,
    sincedb: SinceDb,
    reclaimer: Option<Reclaimer>,
    /// Next byte to read; `None` until the queue has a first segment.
    cursor: Option<Cursor>,
    /// True once the position reflects delivered entries (restored from a
    /// sincedb or advanced by delivery). Guards the final flush so a run
    /// that never delivered anything does not fabricate a cursor.
    has_state: bool,
    /// Truncation marker from the previous pass over a sealed segment,
    /// used to tell a write/seal race from a genuinely torn file.
    last_torn: Option<(u64, u64, usize)>,
}

/// Resumable tailer over one dead letter queue directory.
pub struct DlqTailer {
    config: TailerConfig,
    state: TailerState,
    shutdown: CancellationToken,
    inner: Option<Registered>,
}

impl DlqTailer {
    /// Create an unregistered tailer.
    pub fn new(config: TailerConfig) -> Self {
        Self {
            config,
            state: TailerState::Idle,
            shutdown: CancellationToken::new(),
            inner: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TailerState {
        self.state
    }

    /// Handle that can stop the tailer from another task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.shutdown.clone(),
        }
    }

    /// Request a stop. Idempotent; see [`StopHandle::stop`].
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Validate configuration and prime the cursor.
    ///
    /// Fails with `ConfigurationConflict`, `InvalidLocation` and friends
    /// before any consumption starts; on failure the tailer must not be
    /// run. Calling `register` again after success is a no-op.
    pub async fn register(&mut self) -> Result<(), TailerError> {
        if self.inner.is_some() {
            debug!("Tailer already registered");
            return Ok(());
        }

        let resolved = self.config.resolve()?;
        let store = SegmentStore::new(&resolved.path);
        let sincedb = SinceDb::new(&resolved.sincedb_path);

        let restored = sincedb.load().await?;
        let has_state = restored.is_some();
        let cursor = match restored {
            Some(cursor) => {
                info!(
                    segment_id = cursor.segment_id,
                    offset = cursor.offset,
                    "Resuming from persisted cursor"
                );
                Some(cursor)
            }
            None => match resolved.start_timestamp {
                Some(threshold) => seek_to_timestamp(&store, threshold).await?,
                None => None,
            },
        };

        let reclaimer = resolved
            .clean_consumed
            .then(|| Reclaimer::new(store.clone()));

        info!(
            path = %resolved.path.display(),
            sincedb = %resolved.sincedb_path.display(),
            commit_offsets = resolved.commit_offsets,
            clean_consumed = resolved.clean_consumed,
            "Registered dead letter queue tailer"
        );

        self.inner = Some(Registered {
            config: resolved,
            store,
            sincedb,
            reclaimer,
            cursor,
            has_state,
            last_torn: None,
        });
        self.state = TailerState::Registered;
        Ok(())
    }

    /// Consume entries in order until stopped.
    ///
    /// Blocks the calling task; run it on a dedicated task and use a
    /// [`StopHandle`] to end it. Returns `Ok(())` on a requested stop and
    /// an error on corruption, a vanished segment, or consumer rejection.
    pub async fn run<C: EntryConsumer>(&mut self, consumer: &mut C) -> Result<(), TailerError> {
        ensure!(
            self.state == TailerState::Registered,
            NotRegisteredSnafu { state: self.state }
        );
        self.state = TailerState::Running;

        let result = self.consume_loop(consumer).await;

        self.state = TailerState::Stopping;
        self.flush_final_position().await;
        self.state = TailerState::Closed;
        info!("Dead letter queue tailer closed");

        result
    }

    async fn consume_loop<C: EntryConsumer>(
        &mut self,
        consumer: &mut C,
    ) -> Result<(), TailerError> {
        let shutdown = self.shutdown.clone();
        let Some(inner) = self.inner.as_mut() else {
            return NotRegisteredSnafu {
                state: TailerState::Idle,
            }
            .fail();
        };

        // Watch before the first read so changes made while catching up
        // are buffered, not lost.
        let mut watcher = DirWatcher::watch(inner.store.dir())?;
        info!("Tailing dead letter queue");

        loop {
            if shutdown.is_cancelled() {
                info!("Stop requested");
                return Ok(());
            }

            let segments = inner.store.list_segments().await?;
            let cursor = match inner.cursor {
                Some(cursor) => cursor,
                None => match segments.first() {
                    Some(first) => Cursor::start_of(first.id),
                    None => {
                        // Empty queue; wait for the first segment.
                        if watcher.wait(&shutdown).await == WaitOutcome::Cancelled {
                            return Ok(());
                        }
                        continue;
                    }
                },
            };
            inner.cursor = Some(cursor);

            let sealed = segments.iter().any(|s| s.id > cursor.segment_id);
            let buf = inner.store.read_from(cursor.segment_id, cursor.offset).await?;
            counter!("dlqtail_bytes_read_total").increment(buf.len() as u64);

            let mut pos = 0usize;
            let mut truncated = false;
            while pos < buf.len() {
                match codec::decode_record(&buf[pos..], cursor.offset + pos as u64) {
                    Ok((entry, consumed)) => {
                        consumer.accept(entry).await?;
                        pos += consumed;

                        let next = Cursor {
                            segment_id: cursor.segment_id,
                            offset: cursor.offset + pos as u64,
                        };
                        inner.cursor = Some(next);
                        inner.has_state = true;
                        counter!("dlqtail_entries_delivered_total").increment(1);

                        if inner.config.commit_offsets {
                            inner.sincedb.save(next).await?;
                        }

                        if shutdown.is_cancelled() {
                            info!("Stop requested during delivery");
                            return Ok(());
                        }
                    }
                    Err(source) if source.is_truncated() => {
                        truncated = true;
                        break;
                    }
                    Err(source) => {
                        error!(
                            segment_id = cursor.segment_id,
                            "Corrupt record, not skipping forward: {source}"
                        );
                        return Err(TailerError::Decode {
                            segment_id: cursor.segment_id,
                            source,
                        });
                    }
                }
            }

            let delivered = pos > 0;
            let end_offset = cursor.offset + pos as u64;

            if sealed {
                if truncated {
                    let marker = (cursor.segment_id, end_offset, buf.len() - pos);
                    if inner.last_torn == Some(marker) {
                        return TornSegmentSnafu {
                            segment_id: cursor.segment_id,
                            offset: end_offset,
                        }
                        .fail();
                    }
                    // One immediate re-read absorbs the race between our
                    // read and the writer finishing this segment.
                    inner.last_torn = Some(marker);
                    continue;
                }
                inner.last_torn = None;

                if let Some(next_id) = segments
                    .iter()
                    .map(|s| s.id)
                    .filter(|&id| id > cursor.segment_id)
                    .min()
                {
                    let rolled = Cursor::start_of(next_id);
                    inner.cursor = Some(rolled);
                    // Rollover is a durable commit point even when
                    // per-entry commits are off.
                    if inner.has_state {
                        inner.sincedb.save(rolled).await?;
                    }
                    debug!(
                        from = cursor.segment_id,
                        to = next_id,
                        "Rolling over to next segment"
                    );
                    counter!("dlqtail_segments_completed_total").increment(1);

                    if let Some(reclaimer) = &inner.reclaimer {
                        reclaimer.reclaim(cursor.segment_id).await?;
                    }
                }
                continue;
            }

            inner.last_torn = None;
            if delivered {
                // More bytes may have arrived while we were delivering.
                continue;
            }

            if watcher.wait(&shutdown).await == WaitOutcome::Cancelled {
                info!("Stop requested while waiting for new entries");
                return Ok(());
            }
        }
    }

    /// Persist the final position, if the reader holds any.
    async fn flush_final_position(&mut self) {
        let Some(inner) = self.inner.as_mut() else {
            return;
        };
        if !inner.has_state {
            return;
        }
        if let Some(cursor) = inner.cursor {
            if let Err(e) = inner.sincedb.save(cursor).await {
                error!("Failed to write final position: {e}");
            }
        }
    }
}

/// Scan the queue from the beginning and position the cursor at the first
/// entry admitted by the timestamp filter.
///
/// Entries below the threshold are skipped without delivery. When every
/// existing entry is older, the cursor lands at the end of the log so only
/// future entries are delivered.
async fn seek_to_timestamp(
    store: &SegmentStore,
    threshold: DateTime<Utc>,
) -> Result<Option<Cursor>, TailerError> {
    let mut filter = StartTimestampFilter::new(threshold);
    let segments = store.list_segments().await?;
    let mut skipped = 0u64;

    for (index, segment) in segments.iter().enumerate() {
        let buf = store.read_from(segment.id, 0).await?;
        let mut pos = 0usize;

        while pos < buf.len() {
            match codec::decode_record(&buf[pos..], pos as u64) {
                Ok((entry, consumed)) => {
                    if filter.admit(&entry) {
                        info!(
                            skipped,
                            segment_id = segment.id,
                            offset = pos as u64,
                            "Fast-forwarded to start_timestamp"
                        );
                        return Ok(Some(Cursor {
                            segment_id: segment.id,
                            offset: pos as u64,
                        }));
                    }
                    skipped += 1;
                    pos += consumed;
                }
                Err(source) if source.is_truncated() => break,
                Err(source) => {
                    return Err(TailerError::Decode {
                        segment_id: segment.id,
                        source,
                    })
                }
            }
        }

        if index == segments.len() - 1 {
            info!(skipped, "start_timestamp is past every existing entry");
            return Ok(Some(Cursor {
                segment_id: segment.id,
                offset: pos as u64,
            }));
        }
    }

    Ok(None)
}
