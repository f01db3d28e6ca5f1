//! Debounce scheduler
//!
//! A burst of scans from one submitter must trigger one flush, not one
//! per scan. The scheduler keeps a per-submitter armed flag: the first
//! scan arms a one-shot timer for the debounce window, later scans in
//! the same window ride the armed timer. On expiry the flag is cleared
//! first, then the flush runs, so a scan arriving mid-flush arms a
//! fresh timer instead of being lost.
//!
//! Arm/clear is a single test-and-set under one mutex; the race between
//! two concurrent first-scans resolves to exactly one timer.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// What the scheduler fires when a submitter's timer expires. The
/// reconciliation engine is the production target; tests substitute
/// counters.
#[async_trait]
pub trait FlushTarget: Send + Sync {
    async fn run_flush(&self, submitter: &str);
}

struct SchedulerInner {
    armed: Mutex<HashSet<String>>,
    window: Duration,
    target: Arc<dyn FlushTarget>,
}

/// Per-submitter one-shot flush timers behind an armed-flag set.
#[derive(Clone)]
pub struct FlushScheduler {
    inner: Arc<SchedulerInner>,
}

impl FlushScheduler {
    pub fn new(target: Arc<dyn FlushTarget>, window: Duration) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                armed: Mutex::new(HashSet::new()),
                window,
                target,
            }),
        }
    }

    /// Note a new scan for `submitter`; arm the flush timer unless one
    /// is already armed.
    pub async fn notify(&self, submitter: &str) {
        {
            let mut armed = self.inner.armed.lock().await;
            if !armed.insert(submitter.to_string()) {
                debug!("Flush already armed for submitter {}", submitter);
                return;
            }
        }

        debug!(
            "Armed flush for submitter {} in {:?}",
            submitter, self.inner.window
        );

        let inner = Arc::clone(&self.inner);
        let submitter = submitter.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(inner.window).await;
            // Clear before flushing: scans arriving during the flush
            // must be able to arm the next cycle
            inner.armed.lock().await.remove(&submitter);
            inner.target.run_flush(&submitter).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTarget {
        flushes: AtomicUsize,
    }

    #[async_trait]
    impl FlushTarget for CountingTarget {
        async fn run_flush(&self, _submitter: &str) {
            self.flushes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn burst_coalesces_to_one_flush() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = FlushScheduler::new(
            target.clone() as Arc<dyn FlushTarget>,
            Duration::from_millis(50),
        );

        for _ in 0..5 {
            scheduler.notify("chat-1").await;
        }

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(target.flushes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn scan_after_expiry_arms_fresh_timer() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = FlushScheduler::new(
            target.clone() as Arc<dyn FlushTarget>,
            Duration::from_millis(30),
        );

        scheduler.notify("chat-1").await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        scheduler.notify("chat-1").await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(target.flushes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn submitters_are_independent() {
        let target = Arc::new(CountingTarget::default());
        let scheduler = FlushScheduler::new(
            target.clone() as Arc<dyn FlushTarget>,
            Duration::from_millis(30),
        );

        scheduler.notify("chat-1").await;
        scheduler.notify("chat-2").await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(target.flushes.load(Ordering::SeqCst), 2);
    }
}
