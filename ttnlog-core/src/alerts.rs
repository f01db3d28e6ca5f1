//! Alert throttle
//!
//! Operator notifications for failures are deduplicated by message text
//! and rate-limited: the same text is not resent within the cool-down
//! window. A flapping remote store therefore produces one alert per
//! window, not one per failed flush.

use crate::notify::{NotificationSink, Roster};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Deduplicating, rate-limited operator alerting.
pub struct AlertThrottle {
    cooldown: Duration,
    last_notified: Mutex<HashMap<String, Instant>>,
    roster: Arc<dyn Roster>,
    sink: Arc<dyn NotificationSink>,
}

impl AlertThrottle {
    pub fn new(
        roster: Arc<dyn Roster>,
        sink: Arc<dyn NotificationSink>,
        cooldown: Duration,
    ) -> Self {
        Self {
            cooldown,
            last_notified: Mutex::new(HashMap::new()),
            roster,
            sink,
        }
    }

    /// Send `message` to every operator, unless the identical message
    /// already went out within the cool-down window.
    ///
    /// Returns `true` when delivery was attempted, `false` when the
    /// alert was throttled or the roster was unreadable. Per-operator
    /// delivery failures are logged and swallowed: alerting is
    /// best-effort and must never fail a flush.
    pub async fn notify(&self, message: &str) -> bool {
        {
            let mut last_notified = self.last_notified.lock().await;
            // Expired stamps are dead weight; alert texts embed code
            // lists, so the map would otherwise grow without bound
            last_notified.retain(|_, stamped| stamped.elapsed() < self.cooldown);
            if last_notified.contains_key(message) {
                debug!("Alert throttled: {}", message);
                return false;
            }
            last_notified.insert(message.to_string(), Instant::now());
        }

        // Roster read happens at alert time, not at startup
        let operators = match self.roster.list_operators().await {
            Ok(operators) => operators,
            Err(e) => {
                warn!("Cannot list operators for alert: {}", e);
                // Nothing went out: release the stamp so the next
                // occurrence retries instead of waiting out the window
                self.last_notified.lock().await.remove(message);
                return false;
            }
        };

        if operators.is_empty() {
            warn!("No operators registered; alert only logged: {}", message);
            return true;
        }

        for operator in operators {
            if let Err(e) = self.sink.send_message(&operator, message).await {
                warn!("Alert delivery to {} failed: {}", operator, e);
            }
        }
        true
    }

    #[cfg(test)]
    async fn tracked_messages(&self) -> usize {
        self.last_notified.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationSink;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use ttnlog_common::db::Subscriber;
    use ttnlog_common::Result;

    struct FixedRoster(Vec<String>);

    #[async_trait]
    impl Roster for FixedRoster {
        async fn list_operators(&self) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }
        async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
            Ok(vec![])
        }
        async fn mark_report_sent(&self, _chat_id: &str, _date: NaiveDate) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send_message(&self, recipient: &str, text: &str) -> Result<()> {
            self.messages
                .lock()
                .await
                .push((recipient.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn identical_message_throttled_within_window() {
        let sink = Arc::new(RecordingSink::default());
        let throttle = AlertThrottle::new(
            Arc::new(FixedRoster(vec!["op-1".into()])),
            sink.clone(),
            Duration::from_millis(80),
        );

        assert!(throttle.notify("push failed").await);
        assert!(!throttle.notify("push failed").await);
        assert_eq!(sink.messages.lock().await.len(), 1);

        // After the window elapses the same text goes out again
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(throttle.notify("push failed").await);
        assert_eq!(sink.messages.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn distinct_messages_are_independent() {
        let sink = Arc::new(RecordingSink::default());
        let throttle = AlertThrottle::new(
            Arc::new(FixedRoster(vec!["op-1".into()])),
            sink.clone(),
            Duration::from_secs(600),
        );

        assert!(throttle.notify("push failed").await);
        assert!(throttle.notify("resync failed").await);
        assert_eq!(sink.messages.lock().await.len(), 2);
    }

    struct FlakyRoster {
        fail: std::sync::atomic::AtomicBool,
        operators: Vec<String>,
    }

    #[async_trait]
    impl Roster for FlakyRoster {
        async fn list_operators(&self) -> Result<Vec<String>> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(ttnlog_common::Error::Internal("roster offline".to_string()));
            }
            Ok(self.operators.clone())
        }
        async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
            Ok(vec![])
        }
        async fn mark_report_sent(&self, _chat_id: &str, _date: NaiveDate) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn roster_failure_does_not_burn_the_window() {
        let sink = Arc::new(RecordingSink::default());
        let roster = Arc::new(FlakyRoster {
            fail: std::sync::atomic::AtomicBool::new(true),
            operators: vec!["op-1".into()],
        });
        let throttle = AlertThrottle::new(roster.clone(), sink.clone(), Duration::from_secs(600));

        // Roster unreadable: nothing delivered, and the message is not
        // stamped as sent
        assert!(!throttle.notify("push failed").await);
        assert!(sink.messages.lock().await.is_empty());

        // Roster back: the very next occurrence goes out, well inside
        // the cool-down window
        roster.fail.store(false, std::sync::atomic::Ordering::SeqCst);
        assert!(throttle.notify("push failed").await);
        assert_eq!(sink.messages.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn expired_stamps_are_pruned() {
        let sink = Arc::new(RecordingSink::default());
        let throttle = AlertThrottle::new(
            Arc::new(FixedRoster(vec!["op-1".into()])),
            sink,
            Duration::from_millis(40),
        );

        throttle.notify("push failed").await;
        throttle.notify("resync failed").await;
        assert_eq!(throttle.tracked_messages().await, 2);

        tokio::time::sleep(Duration::from_millis(60)).await;

        // Next notify prunes both expired stamps before adding its own
        throttle.notify("verify anomaly").await;
        assert_eq!(throttle.tracked_messages().await, 1);
    }

    #[tokio::test]
    async fn alert_fans_out_to_all_operators() {
        let sink = Arc::new(RecordingSink::default());
        let throttle = AlertThrottle::new(
            Arc::new(FixedRoster(vec!["op-1".into(), "op-2".into()])),
            sink.clone(),
            Duration::from_secs(600),
        );

        throttle.notify("push failed").await;
        let messages = sink.messages.lock().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0, "op-1");
        assert_eq!(messages[1].0, "op-2");
    }
}
