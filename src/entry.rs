//! Dead letter entry type.
//!
//! An entry pairs the original event payload (opaque to this crate) with
//! the failure provenance recorded by the producing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One decoded dead letter record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqEntry {
    /// Original event payload. Schema is owned by the host pipeline.
    pub event: serde_json::Value,
    /// Type of the plugin that dead-lettered the event.
    pub plugin_type: String,
    /// Id of the plugin instance that dead-lettered the event.
    pub plugin_id: String,
    /// Why the event was dead-lettered.
    pub reason: String,
    /// When the entry was written to the queue.
    pub entry_time: DateTime<Utc>,
}

impl DlqEntry {
    /// Create a new entry.
    pub fn new(
        event: serde_json::Value,
        plugin_type: impl Into<String>,
        plugin_id: impl Into<String>,
        reason: impl Into<String>,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            event,
            plugin_type: plugin_type.into(),
            plugin_id: plugin_id.into(),
            reason: reason.into(),
            entry_time,
        }
    }
}
