//! Periodic mirror resync
//!
//! On a fixed interval the remote connection is re-established
//! (credentials may have expired) and the local mirror is replaced
//! wholesale with a full remote read. This heals any drift left by
//! partial flush failures and picks up edits made to the remote table
//! outside this service. A failed resync is escalated through the
//! alert throttle; the stale mirror keeps serving lookups.

use crate::alerts::AlertThrottle;
use crate::mirror::MirrorStore;
use crate::remote::RemoteTable;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};
use ttnlog_common::{Error, Result};

/// Wholesale mirror rebuild on a ticker.
pub struct ResyncTask {
    remote: Arc<dyn RemoteTable>,
    mirror: Arc<MirrorStore>,
    alerts: Arc<AlertThrottle>,
    period: Duration,
}

impl ResyncTask {
    pub fn new(
        remote: Arc<dyn RemoteTable>,
        mirror: Arc<MirrorStore>,
        alerts: Arc<AlertThrottle>,
        period: Duration,
    ) -> Self {
        Self {
            remote,
            mirror,
            alerts,
            period,
        }
    }

    /// One resync pass: reconnect, read everything, replace the mirror.
    /// Returns the number of records now mirrored.
    pub async fn run_once(&self) -> Result<usize> {
        self.remote
            .reconnect()
            .await
            .map_err(|e| Error::Resync(format!("reconnect: {}", e)))?;

        let records = self
            .remote
            .read_all()
            .await
            .map_err(|e| Error::Resync(format!("read: {}", e)))?;

        self.mirror.replace_all(&records).await?;

        info!("Resync complete: {} records mirrored", records.len());
        Ok(records.len())
    }

    /// Spawn the ticker loop. The first pass runs immediately, giving
    /// the mirror its initial contents on startup.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    error!("Mirror resync failed: {}", e);
                    self.alerts
                        .notify(&format!("Mirror resync failed: {}", e))
                        .await;
                }
            }
        })
    }
}
