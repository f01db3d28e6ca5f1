//! Daily subscriber reports
//!
//! Office chats can subscribe to a daily processed-codes count at a
//! chosen HH:MM. A once-per-minute ticker compares each subscriber's
//! requested time with the local clock; a last-sent date guard keeps
//! the report to one delivery per subscriber per day even though the
//! tick fires many times inside the matching minute.

use crate::mirror::MirrorStore;
use crate::notify::{NotificationSink, Roster};
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use ttnlog_common::Result;

/// Ticker delivering daily count reports to subscribers.
pub struct ReportScheduler {
    mirror: Arc<MirrorStore>,
    roster: Arc<dyn Roster>,
    sink: Arc<dyn NotificationSink>,
    tick: Duration,
}

impl ReportScheduler {
    pub fn new(
        mirror: Arc<MirrorStore>,
        roster: Arc<dyn Roster>,
        sink: Arc<dyn NotificationSink>,
        tick: Duration,
    ) -> Self {
        Self {
            mirror,
            roster,
            sink,
            tick,
        }
    }

    /// One tick at clock time `hhmm` on `today`. Returns how many
    /// reports went out. Separated from the loop so the time matching
    /// is testable without a real clock.
    pub async fn run_at(&self, hhmm: &str, today: NaiveDate) -> Result<usize> {
        let subscribers = self.roster.list_subscribers().await?;
        let mut sent = 0usize;

        for subscriber in subscribers {
            if subscriber.report_time != hhmm || subscriber.last_sent_on == Some(today) {
                continue;
            }

            let count = self.mirror.count_non_empty().await?;
            let text = format!("Codes processed today: {}", count);
            if let Err(e) = self.sink.send_message(&subscriber.chat_id, &text).await {
                warn!("Report to {} failed: {}", subscriber.chat_id, e);
                continue;
            }

            // Stamp only after a successful send so a failed delivery
            // retries on the next tick within the same minute
            self.roster
                .mark_report_sent(&subscriber.chat_id, today)
                .await?;
            sent += 1;
        }

        if sent > 0 {
            info!("Sent {} daily report(s) at {}", sent, hhmm);
        }
        Ok(sent)
    }

    /// Spawn the report ticker loop on the local clock.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.tick);
            loop {
                ticker.tick().await;
                let now = Local::now();
                let hhmm = now.format("%H:%M").to_string();
                if let Err(e) = self.run_at(&hhmm, now.date_naive()).await {
                    error!("Daily report tick failed: {}", e);
                }
            }
        })
    }
}
