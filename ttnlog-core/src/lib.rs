//! # TTNLOG Core
//!
//! The buffered reconciliation engine behind the shipment code logging
//! service. Scans are validated, durably staged per submitter, debounced,
//! then pushed to the authoritative remote tabular store in one batch,
//! verified, and mirrored locally for fast lookups. Remote failures take
//! a degraded fallback path with rate-limited operator alerting; a
//! periodic resync rebuilds the mirror wholesale to heal any drift.
//!
//! Module map:
//! - [`staging`] - durable per-submitter queue of unconfirmed codes
//! - [`debounce`] - coalesces scan bursts into one flush per submitter
//! - [`engine`] - the flush state machine (push, verify, mirror, report)
//! - [`mirror`] - local read cache of the remote store
//! - [`remote`] - remote tabular store seam and HTTP client
//! - [`alerts`] - deduplicated, rate-limited operator notifications
//! - [`resync`] - periodic wholesale mirror rebuild
//! - [`report`] - daily processed-count reports to subscribers
//! - [`lookup`] - office-side code lookup against the mirror

pub mod alerts;
pub mod debounce;
pub mod engine;
pub mod lookup;
pub mod mirror;
pub mod notify;
pub mod remote;
pub mod report;
pub mod resync;
pub mod staging;

pub use alerts::AlertThrottle;
pub use debounce::{FlushScheduler, FlushTarget};
pub use engine::{FlushOutcome, ReconcileEngine, ScanIngest};
pub use lookup::{LookupResult, LookupService};
pub use mirror::{MirrorHit, MirrorStore};
pub use notify::{DbRoster, NotificationSink, Roster, TracingSink};
pub use remote::{RemoteTable, SheetApiClient};
pub use report::ReportScheduler;
pub use resync::ResyncTask;
pub use staging::StagingBuffer;
