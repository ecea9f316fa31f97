//! Shared fixtures: segment writers and instrumented consumers.

use std::io::Write;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use dlqtail::codec;
use dlqtail::error::ConsumerRejected;
use dlqtail::tailer::StopHandle;
use dlqtail::{DlqEntry, EntryConsumer};

/// Deterministic timestamp `secs` seconds after a fixed epoch.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

/// Entry with a recognizable sequence number, timestamped at `ts(seq * 10)`.
pub fn make_entry(seq: u64) -> DlqEntry {
    DlqEntry::new(
        json!({"message": format!("event {seq}"), "seq": seq}),
        "elasticsearch",
        "es-main",
        "mapper_parsing_exception",
        ts(seq as i64 * 10),
    )
}

/// Sequence number back out of a delivered entry.
pub fn seq_of(entry: &DlqEntry) -> u64 {
    entry.event["seq"].as_u64().unwrap()
}

pub fn encode_all(entries: &[DlqEntry]) -> Vec<u8> {
    let mut buf = Vec::new();
    for entry in entries {
        buf.extend_from_slice(&codec::encode_record(entry).unwrap());
    }
    buf
}

/// Write `{id}.log` containing the given entries.
pub fn write_segment(dir: &Path, id: u64, entries: &[DlqEntry]) {
    std::fs::write(dir.join(format!("{id}.log")), encode_all(entries)).unwrap();
}

/// Append entries to an existing (or new) segment file.
pub fn append_to_segment(dir: &Path, id: u64, entries: &[DlqEntry]) {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(dir.join(format!("{id}.log")))
        .unwrap();
    file.write_all(&encode_all(entries)).unwrap();
    file.flush().unwrap();
}

/// Collects entries and requests a stop once `limit` have been accepted.
pub struct StopAfter {
    pub seen: Vec<DlqEntry>,
    stop: StopHandle,
    limit: usize,
}

impl StopAfter {
    pub fn new(limit: usize, stop: StopHandle) -> Self {
        Self {
            seen: Vec::new(),
            stop,
            limit,
        }
    }
}

#[async_trait]
impl EntryConsumer for StopAfter {
    async fn accept(&mut self, entry: DlqEntry) -> Result<(), ConsumerRejected> {
        self.seen.push(entry);
        if self.seen.len() >= self.limit {
            self.stop.stop();
        }
        Ok(())
    }
}

/// Accepts everything except the entry with the given sequence number.
pub struct RejectSeq {
    pub seen: Vec<DlqEntry>,
    reject: u64,
}

impl RejectSeq {
    pub fn new(reject: u64) -> Self {
        Self {
            seen: Vec::new(),
            reject,
        }
    }
}

#[async_trait]
impl EntryConsumer for RejectSeq {
    async fn accept(&mut self, entry: DlqEntry) -> Result<(), ConsumerRejected> {
        if seq_of(&entry) == self.reject {
            return Err(ConsumerRejected {
                message: format!("refusing entry {}", self.reject),
            });
        }
        self.seen.push(entry);
        Ok(())
    }
}
