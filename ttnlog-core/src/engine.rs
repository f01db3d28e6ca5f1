//! Reconciliation engine
//!
//! The flush state machine: `Idle -> Flushing -> {Committed,
//! DegradedFallback} -> Idle`. One flush drains a submitter's staging
//! buffer, pushes the drained codes to the remote store in a single
//! batch, verifies against a fresh remote read, appends the confirmed
//! codes to the local mirror, and reports exactly one outcome message
//! to the submitter.
//!
//! The drain at flush start is the commit: entries never return to the
//! buffer. A failed push surfaces its codes to the operator and the
//! submitter instead of requeueing them, so duplicates cannot grow
//! unbounded across retries.

use crate::alerts::AlertThrottle;
use crate::debounce::{FlushScheduler, FlushTarget};
use crate::mirror::MirrorStore;
use crate::notify::NotificationSink;
use crate::remote::RemoteTable;
use crate::staging::StagingBuffer;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use ttnlog_common::db::{CodeRecord, StagingEntry};
use ttnlog_common::{normalize_code, Error, LengthPolicy, Result};

/// Result of one flush cycle, as reported to the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The buffer was empty; nothing to do, no message sent.
    Empty,
    /// Push and verify succeeded. `not_added` is normally empty; a
    /// non-empty value is a correctness anomaly that was escalated.
    Committed {
        added: Vec<String>,
        not_added: Vec<String>,
    },
    /// Push succeeded but the post-push read failed, so the codes
    /// could not be confirmed either way.
    Unverified { codes: Vec<String> },
    /// Push failed; degraded fallback ran. `unconfirmed` is the drained
    /// batch plus any mirror codes missing from the best-effort remote
    /// re-read.
    Degraded { unconfirmed: Vec<String> },
}

/// The flush state machine over the staging buffer, remote store,
/// local mirror, and notification sink.
pub struct ReconcileEngine {
    staging: StagingBuffer,
    mirror: Arc<MirrorStore>,
    remote: Arc<dyn RemoteTable>,
    sink: Arc<dyn NotificationSink>,
    alerts: Arc<AlertThrottle>,
    policy: LengthPolicy,
    /// Per-submitter guards: a new flush may not start while one is in
    /// flight for the same submitter. Different submitters flush
    /// concurrently.
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ReconcileEngine {
    pub fn new(
        staging: StagingBuffer,
        mirror: Arc<MirrorStore>,
        remote: Arc<dyn RemoteTable>,
        sink: Arc<dyn NotificationSink>,
        alerts: Arc<AlertThrottle>,
        policy: LengthPolicy,
    ) -> Self {
        Self {
            staging,
            mirror,
            remote,
            sink,
            alerts,
            policy,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Validate a raw scan and stage it for the submitter.
    ///
    /// Returns the normalized code when it was accepted (whether newly
    /// staged or already pending), `None` when the scan failed
    /// validation. Invalid scans are skipped silently; callers report
    /// aggregate counts only.
    pub async fn accept_scan(
        &self,
        submitter: &str,
        raw: &str,
        username: Option<&str>,
    ) -> Result<Option<String>> {
        let code = match normalize_code(raw, &self.policy) {
            Ok(code) => code,
            Err(Error::InvalidCode(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        self.staging.enqueue(submitter, &code, username).await?;
        Ok(Some(code))
    }

    /// Run one flush cycle for a submitter.
    ///
    /// Remote failures are handled inside the cycle (fallback, alert,
    /// submitter message); only local persistence errors propagate.
    pub async fn flush(&self, submitter: &str) -> Result<FlushOutcome> {
        let lock = self.flush_lock(submitter).await;
        let _guard = lock.lock().await;

        let entries = self.staging.drain_all(submitter).await?;
        if entries.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        // Buffer dedup makes in-batch duplicates impossible; treat any
        // that slip through as one logical item
        let mut seen = HashSet::new();
        let entries: Vec<StagingEntry> = entries
            .into_iter()
            .filter(|e| seen.insert(e.code.clone()))
            .collect();

        info!(
            "Flushing {} code(s) for submitter {}",
            entries.len(),
            submitter
        );

        let batch: Vec<CodeRecord> = entries
            .iter()
            .map(|e| CodeRecord {
                code: e.code.clone(),
                recorded_at: e.queued_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                submitted_by: e.display_name().to_string(),
                row_ref: 0,
            })
            .collect();

        match self.remote.append_records(&batch).await {
            Ok(()) => self.verify_and_commit(submitter, batch).await,
            Err(e) => self.degraded_fallback(submitter, batch, e).await,
        }
    }

    /// Verify a successful push against a fresh remote read, update
    /// the mirror, and report.
    async fn verify_and_commit(
        &self,
        submitter: &str,
        batch: Vec<CodeRecord>,
    ) -> Result<FlushOutcome> {
        let remote_rows = match self.remote.read_all().await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    "Post-push verify read failed for submitter {}: {}",
                    submitter, e
                );
                self.alerts
                    .notify(&format!("Verify read failed after push: {}", e))
                    .await;

                let codes: Vec<String> = batch.into_iter().map(|r| r.code).collect();
                self.send_to_submitter(submitter, &unverified_message(&codes))
                    .await;
                return Ok(FlushOutcome::Unverified { codes });
            }
        };

        // The partition reflects the final remote state, not the push
        // response
        let remote_index: HashMap<&str, &CodeRecord> = remote_rows
            .iter()
            .map(|r| (r.code.as_str(), r))
            .collect();

        let mut added = Vec::new();
        let mut not_added = Vec::new();
        let mut mirror_records = Vec::new();
        for record in &batch {
            match remote_index.get(record.code.as_str()) {
                Some(remote_record) => {
                    added.push(record.code.clone());
                    mirror_records.push((*remote_record).clone());
                }
                None => not_added.push(record.code.clone()),
            }
        }

        self.mirror.append(&mirror_records).await?;

        if !not_added.is_empty() {
            // The push call succeeded, yet codes are absent from the
            // table: a correctness signal, not a connectivity hiccup
            error!(
                "Verify anomaly for submitter {}: {} code(s) missing after successful push",
                submitter,
                not_added.len()
            );
            self.alerts
                .notify(&format!(
                    "Verify anomaly: codes missing after successful push: {}",
                    not_added.join(", ")
                ))
                .await;
        }

        self.send_to_submitter(submitter, &committed_message(&added, &not_added))
            .await;

        info!(
            "Flush committed for submitter {}: {} added, {} not added",
            submitter,
            added.len(),
            not_added.len()
        );
        Ok(FlushOutcome::Committed { added, not_added })
    }

    /// Degraded fallback after a failed push: no automatic retry.
    /// Best-effort remote re-read, local diff, throttled operator
    /// alert, and a single could-not-complete message to the submitter.
    async fn degraded_fallback(
        &self,
        submitter: &str,
        batch: Vec<CodeRecord>,
        push_error: Error,
    ) -> Result<FlushOutcome> {
        error!("Degraded fallback for submitter {}: {}", submitter, push_error);

        // When the re-read fails too, the last known remote state is
        // nothing, and every mirrored code counts as unconfirmed
        let remote_codes: HashSet<String> = match self.remote.read_all().await {
            Ok(rows) => rows.into_iter().map(|r| r.code).collect(),
            Err(e) => {
                warn!("Fallback remote read also failed: {}", e);
                HashSet::new()
            }
        };

        let batch_codes: Vec<String> = batch.into_iter().map(|r| r.code).collect();
        let mut unconfirmed = batch_codes.clone();
        for code in self.mirror.codes().await? {
            if !remote_codes.contains(&code) && !unconfirmed.contains(&code) {
                unconfirmed.push(code);
            }
        }

        self.alerts
            .notify(&format!(
                "{}. Unconfirmed codes: {}",
                push_error,
                unconfirmed.join(", ")
            ))
            .await;

        self.send_to_submitter(submitter, &degraded_message(&batch_codes))
            .await;

        Ok(FlushOutcome::Degraded { unconfirmed })
    }

    /// Exactly one outcome message per flush; delivery failure is
    /// logged, never propagated into the cycle.
    async fn send_to_submitter(&self, submitter: &str, text: &str) {
        if let Err(e) = self.sink.send_message(submitter, text).await {
            warn!("Outcome message to {} failed: {}", submitter, e);
        }
    }

    async fn flush_lock(&self, submitter: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        in_flight
            .entry(submitter.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl FlushTarget for ReconcileEngine {
    async fn run_flush(&self, submitter: &str) {
        if let Err(e) = self.flush(submitter).await {
            error!("Flush failed for submitter {}: {}", submitter, e);
        }
    }
}

/// Scan ingestion entry point: validate, stage, arm the debounce timer.
pub struct ScanIngest {
    engine: Arc<ReconcileEngine>,
    scheduler: FlushScheduler,
}

impl ScanIngest {
    pub fn new(engine: Arc<ReconcileEngine>, scheduler: FlushScheduler) -> Self {
        Self { engine, scheduler }
    }

    /// Process one raw scan. Returns the accepted code, or `None` when
    /// the scan was skipped as invalid.
    pub async fn submit(
        &self,
        submitter: &str,
        raw: &str,
        username: Option<&str>,
    ) -> Result<Option<String>> {
        let accepted = self.engine.accept_scan(submitter, raw, username).await?;
        if accepted.is_some() {
            self.scheduler.notify(submitter).await;
        }
        Ok(accepted)
    }
}

fn committed_message(added: &[String], not_added: &[String]) -> String {
    let mut message = if added.is_empty() {
        "❌ No codes were added.".to_string()
    } else {
        format!("✅ Added {} code(s):\n{}", added.len(), added.join("\n"))
    };
    if !not_added.is_empty() {
        message.push_str(&format!(
            "\n❌ Not added ({}):\n{}",
            not_added.len(),
            not_added.join("\n")
        ));
    }
    message
}

fn unverified_message(codes: &[String]) -> String {
    format!(
        "⚠️ Your codes were submitted but could not be verified:\n{}",
        codes.join("\n")
    )
}

fn degraded_message(codes: &[String]) -> String {
    format!(
        "❌ The remote table is unreachable; these codes could not be recorded:\n{}",
        codes.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn committed_message_lists_both_partitions() {
        let added = vec!["12345678901".to_string()];
        let not_added = vec!["12345678902".to_string()];

        let message = committed_message(&added, &not_added);
        assert!(message.contains("Added 1 code(s)"));
        assert!(message.contains("12345678901"));
        assert!(message.contains("Not added (1)"));
        assert!(message.contains("12345678902"));

        let clean = committed_message(&added, &[]);
        assert!(!clean.contains("Not added"));
    }

    #[test]
    fn degraded_message_names_every_code() {
        let codes = vec!["11111111111".to_string(), "22222222222".to_string()];
        let message = degraded_message(&codes);
        assert!(message.contains("11111111111"));
        assert!(message.contains("22222222222"));
    }
}
