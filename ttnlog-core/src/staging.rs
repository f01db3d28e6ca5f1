//! Staging buffer
//!
//! Durable per-submitter queue of codes accepted from scans but not yet
//! confirmed in the remote store. Entries survive a process restart;
//! they leave the buffer exactly once, when the reconciliation engine
//! drains the submitter's queue at flush start.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use ttnlog_common::db::StagingEntry;
use ttnlog_common::Result;

/// SQLite-backed per-submitter staging queue.
pub struct StagingBuffer {
    pool: SqlitePool,
}

impl StagingBuffer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stage a code for a submitter.
    ///
    /// Returns `true` when the entry was newly staged, `false` when the
    /// code was already pending for this submitter (duplicate scans in
    /// one burst collapse to one entry). Concurrent enqueues are
    /// serialized by SQLite; the UNIQUE(submitter, code) constraint
    /// keeps the race outcome a no-op rather than a duplicate.
    pub async fn enqueue(
        &self,
        submitter: &str,
        code: &str,
        username: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO staging_entries (submitter, code, username, queued_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(submitter)
        .bind(code)
        .bind(username)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if inserted {
            debug!("Staged code {} for submitter {}", code, submitter);
        } else {
            debug!("Code {} already pending for submitter {}", code, submitter);
        }
        Ok(inserted)
    }

    /// Remove and return all pending entries for a submitter, in
    /// insertion order. Called exactly once per flush cycle; the
    /// removal is not rolled back on flush failure.
    pub async fn drain_all(&self, submitter: &str) -> Result<Vec<StagingEntry>> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query_as::<_, (String, Option<String>, DateTime<Utc>)>(
            "SELECT code, username, queued_at FROM staging_entries \
             WHERE submitter = ? ORDER BY id",
        )
        .bind(submitter)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM staging_entries WHERE submitter = ?")
            .bind(submitter)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(rows
            .into_iter()
            .map(|(code, username, queued_at)| StagingEntry {
                submitter: submitter.to_string(),
                code,
                username,
                queued_at,
            })
            .collect())
    }

    /// Submitters with at least one pending entry. Used at startup to
    /// re-arm flushes for entries staged before the last shutdown;
    /// without this, a code accepted just before a crash would wait
    /// for its submitter's next scan.
    pub async fn pending_submitters(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT submitter FROM staging_entries ORDER BY submitter",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Number of pending entries for a submitter.
    pub async fn pending_count(&self, submitter: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM staging_entries WHERE submitter = ?")
                .bind(submitter)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
