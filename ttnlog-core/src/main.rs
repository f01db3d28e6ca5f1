//! ttnlog-core - shipment code logging daemon
//!
//! Wires the reconciliation engine to its collaborators and runs the
//! background tasks: periodic mirror resync and the daily report
//! ticker. With no chat transport attached, scans arrive as manual
//! text entry on stdin (`<submitter> <raw code>` per line) and
//! outbound messages go to the log.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use ttnlog_common::config::Config;
use ttnlog_common::db::init_database;
use ttnlog_core::{
    AlertThrottle, DbRoster, FlushScheduler, FlushTarget, MirrorStore, ReconcileEngine,
    ReportScheduler, ResyncTask, ScanIngest, SheetApiClient, StagingBuffer, TracingSink,
};

#[derive(Parser, Debug)]
#[command(name = "ttnlog-core", version, about = "Shipment code logging daemon")]
struct Args {
    /// Path to config.toml (overrides TTNLOG_CONFIG and platform paths)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting ttnlog-core v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    let db_path = config.database_path();
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path).await?;

    let mirror = Arc::new(MirrorStore::new(pool.clone()));
    let staging = StagingBuffer::new(pool.clone());
    let remote = Arc::new(SheetApiClient::new(&config.remote)?);
    let roster = Arc::new(DbRoster::new(pool.clone()));
    let sink = Arc::new(TracingSink);

    let alerts = Arc::new(AlertThrottle::new(
        roster.clone(),
        sink.clone(),
        config.alert_cooldown(),
    ));

    let engine = Arc::new(ReconcileEngine::new(
        staging,
        mirror.clone(),
        remote.clone(),
        sink.clone(),
        alerts.clone(),
        config.length_policy(),
    ));

    let scheduler = FlushScheduler::new(
        engine.clone() as Arc<dyn FlushTarget>,
        config.debounce_window(),
    );

    // Entries staged before the last shutdown still need a flush;
    // re-arm their submitters now rather than waiting for a new scan
    let pending = StagingBuffer::new(pool.clone()).pending_submitters().await?;
    for submitter in &pending {
        info!("Re-arming flush for submitter {} (pending entries)", submitter);
        scheduler.notify(submitter).await;
    }

    let ingest = ScanIngest::new(engine, scheduler);

    // Background tasks: first resync pass fires immediately and seeds
    // the mirror
    Arc::new(ResyncTask::new(
        remote,
        mirror.clone(),
        alerts.clone(),
        config.resync_interval(),
    ))
    .spawn();

    Arc::new(ReportScheduler::new(
        mirror,
        roster,
        sink,
        config.report_tick(),
    ))
    .spawn();

    info!("ttnlog-core ready; reading scans from stdin");

    // Manual-entry scan source: one scan per line
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((submitter, raw)) = line.split_once(char::is_whitespace) else {
            warn!("Malformed scan line (expected '<submitter> <code>'): {}", line);
            continue;
        };

        match ingest.submit(submitter, raw.trim(), None).await? {
            Some(code) => info!("Accepted code {} from {}", code, submitter),
            None => info!("Skipped invalid scan from {}", submitter),
        }
    }

    // Stdin closed; keep serving background tasks until interrupted
    info!("Scan input closed; running until Ctrl-C");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
