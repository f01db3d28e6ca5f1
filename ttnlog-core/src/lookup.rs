//! Office-side code lookup
//!
//! Answers "has this shipment been scanned?" from the local mirror
//! only. The remote store is never consulted on the lookup path, so an
//! outage degrades freshness, not availability.

use crate::mirror::MirrorStore;
use std::sync::Arc;
use ttnlog_common::{normalize_code, LengthPolicy, Result};

/// Lookup outcome for a normalized code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResult {
    Found {
        code: String,
        row_ref: i64,
        recorded_at: String,
    },
    NotFound {
        code: String,
    },
}

impl LookupResult {
    /// User-facing reply text for the chat transport.
    pub fn message(&self) -> String {
        match self {
            LookupResult::Found {
                code, recorded_at, ..
            } => format!("✅ Order picked! Code: {}\n🕒 Time: {}", code, recorded_at),
            LookupResult::NotFound { code } => format!("❌ Code {} not found!", code),
        }
    }
}

/// Mirror-backed lookup service.
pub struct LookupService {
    mirror: Arc<MirrorStore>,
    policy: LengthPolicy,
}

impl LookupService {
    pub fn new(mirror: Arc<MirrorStore>, policy: LengthPolicy) -> Self {
        Self { mirror, policy }
    }

    /// Normalize a raw query and look it up in the mirror.
    /// Returns `Error::InvalidCode` for malformed queries.
    pub async fn check_code(&self, raw: &str) -> Result<LookupResult> {
        let code = normalize_code(raw, &self.policy)?;

        match self.mirror.lookup(&code).await? {
            Some(hit) => Ok(LookupResult::Found {
                code,
                row_ref: hit.row_ref,
                recorded_at: hit.recorded_at,
            }),
            None => Ok(LookupResult::NotFound { code }),
        }
    }
}
