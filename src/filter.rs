//! Start-timestamp fast-forward filter.

use chrono::{DateTime, Utc};

use crate::entry::DlqEntry;

/// Skips entries older than a configured start timestamp.
///
/// Used once, while seeking the initial cursor on a queue with no restored
/// sincedb state. Once a single entry at or past the threshold is admitted
/// the filter stays open; entry timestamps are only non-decreasing in the
/// common case, and re-gating after the threshold is crossed would drop
/// out-of-order entries the operator asked for.
#[derive(Debug)]
pub struct StartTimestampFilter {
    threshold: DateTime<Utc>,
    crossed: bool,
}

impl StartTimestampFilter {
    /// Create a filter that admits entries at or after `threshold`.
    pub fn new(threshold: DateTime<Utc>) -> Self {
        Self {
            threshold,
            crossed: false,
        }
    }

    /// Whether this entry should be delivered.
    pub fn admit(&mut self, entry: &DlqEntry) -> bool {
        if self.crossed {
            return true;
        }
        if entry.entry_time >= self.threshold {
            self.crossed = true;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn entry_at(secs: i64) -> DlqEntry {
        DlqEntry::new(
            json!({}),
            "t",
            "i",
            "r",
            Utc.timestamp_opt(secs, 0).unwrap(),
        )
    }

    #[test]
    fn test_skips_entries_before_threshold() {
        let mut filter = StartTimestampFilter::new(Utc.timestamp_opt(100, 0).unwrap());

        assert!(!filter.admit(&entry_at(50)));
        assert!(!filter.admit(&entry_at(99)));
        assert!(filter.admit(&entry_at(100)));
        assert!(filter.admit(&entry_at(150)));
    }

    #[test]
    fn test_stays_open_once_crossed() {
        let mut filter = StartTimestampFilter::new(Utc.timestamp_opt(100, 0).unwrap());

        assert!(filter.admit(&entry_at(120)));
        // Out-of-order entry below the threshold still passes.
        assert!(filter.admit(&entry_at(80)));
    }
}
