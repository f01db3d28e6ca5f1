//! Common error types for TTNLOG

use thiserror::Error;

/// Common result type for TTNLOG operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the TTNLOG services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A scanned code failed normalization (wrong length after digit
    /// stripping). Local condition, silently skipped by batch callers.
    #[error("Invalid code: {0}")]
    InvalidCode(String),

    /// Batch push to the remote tabular store errored or timed out.
    /// Triggers the degraded fallback path, never a retry.
    #[error("Remote push failed: {0}")]
    RemotePush(String),

    /// Push apparently succeeded but the post-push read disagrees.
    /// A correctness anomaly, escalated at higher severity than a
    /// plain connectivity failure.
    #[error("Remote verify failed: {0}")]
    RemoteVerify(String),

    /// Periodic wholesale mirror rebuild failed. The stale mirror
    /// keeps serving lookups.
    #[error("Mirror resync failed: {0}")]
    Resync(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
