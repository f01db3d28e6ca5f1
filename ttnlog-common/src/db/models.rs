//! Database models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One confirmed row of the remote tabular store, as cached in the
/// local mirror. `code` is the logical identity; `row_ref` is the
/// remote row position (1-based, row 1 is the header) captured at
/// verify or resync time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeRecord {
    pub code: String,
    /// Remote timestamp cell, kept verbatim (`YYYY-MM-DD HH:MM:SS`)
    pub recorded_at: String,
    pub submitted_by: String,
    pub row_ref: i64,
}

/// A scanned code accepted into a submitter's staging buffer but not
/// yet confirmed in the remote store. Removed when the buffer is
/// drained at flush start, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StagingEntry {
    pub submitter: String,
    pub code: String,
    pub username: Option<String>,
    pub queued_at: DateTime<Utc>,
}

impl StagingEntry {
    /// Display name pushed to the remote store: the chat username when
    /// known, otherwise the submitter chat id.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.submitter)
    }
}

/// A chat subscribed to the daily processed-codes count report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub chat_id: String,
    /// Requested delivery time, `HH:MM`
    pub report_time: String,
    pub username: Option<String>,
    /// Date the report was last delivered; guards against double sends
    pub last_sent_on: Option<NaiveDate>,
}
