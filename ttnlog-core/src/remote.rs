//! Remote tabular store seam and HTTP client
//!
//! The authoritative store is a row-oriented table behind a network
//! boundary; it is assumed unreliable. [`RemoteTable`] is the seam the
//! engine and resync work against; [`SheetApiClient`] is the production
//! implementation over a JSON rows API.
//!
//! Wire layout mirrors the sheet: row 1 is the header, data rows carry
//! `[code, recorded_at, submitted_by]`. A data row's 1-based sheet
//! position is its `row_ref`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use ttnlog_common::config::RemoteConfig;
use ttnlog_common::db::CodeRecord;
use ttnlog_common::{Error, Result};

/// The authoritative remote store, as seen by the core.
#[async_trait]
pub trait RemoteTable: Send + Sync {
    /// Append `batch` as new rows, one call for the whole batch,
    /// ordering preserved. Errors map to the degraded fallback path.
    async fn append_records(&self, batch: &[CodeRecord]) -> Result<()>;

    /// Full read of the table's data rows.
    async fn read_all(&self) -> Result<Vec<CodeRecord>>;

    /// Re-establish the connection; credentials may have expired.
    async fn reconnect(&self) -> Result<()>;
}

#[derive(Serialize)]
struct AppendRequest {
    rows: Vec<Vec<String>>,
}

#[derive(Deserialize)]
struct RowsResponse {
    rows: Vec<Vec<String>>,
}

/// HTTP client for the rows API, owning the connection as an object
/// with an explicit reconnect instead of module-level state.
pub struct SheetApiClient {
    base_url: String,
    token: String,
    timeout: Duration,
    client: RwLock<reqwest::Client>,
}

impl SheetApiClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = build_client(timeout)?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            timeout,
            client: RwLock::new(client),
        })
    }

    fn rows_url(&self) -> String {
        format!("{}/rows", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("Cannot build HTTP client: {}", e)))
}

#[async_trait]
impl RemoteTable for SheetApiClient {
    async fn append_records(&self, batch: &[CodeRecord]) -> Result<()> {
        let body = AppendRequest {
            rows: batch
                .iter()
                .map(|r| {
                    vec![
                        r.code.clone(),
                        r.recorded_at.clone(),
                        r.submitted_by.clone(),
                    ]
                })
                .collect(),
        };

        let client = self.client.read().await;
        let response = self
            .authorize(client.post(self.rows_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::RemotePush(e.to_string()))?;
        response
            .error_for_status()
            .map_err(|e| Error::RemotePush(e.to_string()))?;

        debug!("Pushed {} rows to remote table", batch.len());
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<CodeRecord>> {
        let client = self.client.read().await;
        let response = self
            .authorize(client.get(self.rows_url()))
            .send()
            .await
            .map_err(|e| Error::RemoteVerify(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::RemoteVerify(e.to_string()))?;

        let body: RowsResponse = response
            .json()
            .await
            .map_err(|e| Error::RemoteVerify(e.to_string()))?;

        // Row 1 is the header; blank code cells keep their row position
        // but carry no record
        let records = body
            .rows
            .into_iter()
            .enumerate()
            .skip(1)
            .filter_map(|(idx, cells)| {
                let code = cells.first().cloned().unwrap_or_default();
                if code.is_empty() {
                    return None;
                }
                Some(CodeRecord {
                    code,
                    recorded_at: cells.get(1).cloned().unwrap_or_default(),
                    submitted_by: cells.get(2).cloned().unwrap_or_default(),
                    row_ref: idx as i64 + 1,
                })
            })
            .collect();

        Ok(records)
    }

    async fn reconnect(&self) -> Result<()> {
        // Fresh client drops pooled connections and any stale TLS state
        let fresh = build_client(self.timeout)?;
        {
            let mut client = self.client.write().await;
            *client = fresh;
        }

        // Probe so an expired token surfaces here, not mid-flush
        let client = self.client.read().await;
        self.authorize(client.get(self.rows_url()))
            .query(&[("limit", "1")])
            .send()
            .await
            .map_err(|e| Error::RemotePush(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::RemotePush(e.to_string()))?;

        info!("Remote table connection re-established");
        Ok(())
    }
}
