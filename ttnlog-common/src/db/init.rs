//! Database initialization
//!
//! Creates the SQLite database on first run and brings the schema up
//! idempotently. The same database holds the local mirror of the remote
//! store, the per-submitter staging buffer, and the chat roster, so a
//! process restart loses neither the mirror nor accepted-but-unflushed
//! scans.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize the database connection pool and create tables if needed.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows concurrent readers (mirror lookups) with one writer
    // (flush append, resync replace)
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    create_mirror_codes_table(&pool).await?;
    create_staging_entries_table(&pool).await?;
    create_users_table(&pool).await?;
    create_subscribers_table(&pool).await?;

    Ok(pool)
}

async fn create_mirror_codes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mirror_codes (
            code TEXT PRIMARY KEY,
            row_ref INTEGER NOT NULL,
            recorded_at TEXT NOT NULL,
            submitted_by TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_staging_entries_table(pool: &SqlitePool) -> Result<()> {
    // UNIQUE(submitter, code) makes enqueue dedup a storage invariant,
    // not just an application check
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS staging_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            submitter TEXT NOT NULL,
            code TEXT NOT NULL,
            username TEXT,
            queued_at TEXT NOT NULL,
            UNIQUE(submitter, code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_staging_submitter ON staging_entries(submitter)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            chat_id TEXT PRIMARY KEY,
            username TEXT,
            role TEXT NOT NULL DEFAULT 'warehouse',
            is_operator INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_subscribers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subscribers (
            chat_id TEXT PRIMARY KEY,
            report_time TEXT NOT NULL DEFAULT '22:00',
            username TEXT,
            last_sent_on TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("ttnlog.db");

        let pool = init_database(&db_path).await.unwrap();
        drop(pool);

        // Second open against the same file must not fail
        let pool = init_database(&db_path).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mirror_codes")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
