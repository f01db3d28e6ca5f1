//! Collaborator seams: notification sink and roster
//!
//! The chat transport and the user roster are external collaborators.
//! The core talks to them through these traits; production wires the
//! real transport, tests wire recording mocks, and [`TracingSink`]
//! serves headless operation.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::info;
use ttnlog_common::db::Subscriber;
use ttnlog_common::Result;

/// Outbound message delivery (chat transport).
///
/// The core calls this exactly once per flush outcome and at most once
/// per throttle-permitted alert.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_message(&self, recipient: &str, text: &str) -> Result<()>;
}

/// Read-mostly view of the chat roster: operators receiving alerts and
/// subscribers receiving the daily count report.
#[async_trait]
pub trait Roster: Send + Sync {
    /// Operators to alert. Read at alert time, never cached, so a newly
    /// promoted operator receives future alerts without a restart.
    async fn list_operators(&self) -> Result<Vec<String>>;

    /// Chats subscribed to the daily report.
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>>;

    /// Record that a subscriber's report went out on `date`.
    async fn mark_report_sent(&self, chat_id: &str, date: NaiveDate) -> Result<()>;
}

/// Sink that logs outbound messages instead of delivering them.
/// Used when no chat transport is attached.
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn send_message(&self, recipient: &str, text: &str) -> Result<()> {
        info!("[outbound -> {}] {}", recipient, text);
        Ok(())
    }
}

/// Roster backed by the service's own database (`users` and
/// `subscribers` tables).
pub struct DbRoster {
    pool: SqlitePool,
}

impl DbRoster {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Roster for DbRoster {
    async fn list_operators(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT chat_id FROM users WHERE is_operator = 1 ORDER BY chat_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>, Option<String>)>(
            "SELECT chat_id, report_time, username, last_sent_on FROM subscribers ORDER BY chat_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(chat_id, report_time, username, last_sent_on)| Subscriber {
                chat_id,
                report_time,
                username,
                last_sent_on: last_sent_on
                    .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            })
            .collect())
    }

    async fn mark_report_sent(&self, chat_id: &str, date: NaiveDate) -> Result<()> {
        sqlx::query("UPDATE subscribers SET last_sent_on = ? WHERE chat_id = ?")
            .bind(date.format("%Y-%m-%d").to_string())
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
