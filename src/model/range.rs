//! Synchronization time windows.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive `[oldest, newest]` window in milliseconds since the epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRange {
    pub oldest: i64,
    pub newest: i64,
}

impl SyncRange {
    pub fn new(oldest: i64, newest: i64) -> Self {
        Self { oldest, newest }
    }

    /// Window of `days_past` before and `days_future` after `now`.
    pub fn around(now: DateTime<Utc>, days_past: i64, days_future: i64) -> Self {
        Self {
            oldest: (now - Duration::days(days_past)).timestamp_millis(),
            newest: (now + Duration::days(days_future)).timestamp_millis(),
        }
    }

    /// An event is outside when it ends before the window opens or starts
    /// after it closes; touching either edge counts as inside.
    pub fn event_outside(&self, start_date: i64, end_date: i64) -> bool {
        end_date < self.oldest || start_date > self.newest
    }
}
