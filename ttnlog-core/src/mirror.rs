//! Local mirror store
//!
//! Durable read cache of the remote tabular store, keyed by code.
//! Lookups never touch the network; they are answered from here even
//! while the remote store is unreachable. Writes come from exactly two
//! places: the reconciliation engine appending verified codes, and the
//! periodic resync replacing the whole mirror with a fresh remote read.
//!
//! Both write paths go through one `tokio::sync::Mutex` so `replace_all`
//! and `append` never interleave, on top of SQLite's own WAL
//! single-writer discipline.

use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{debug, info};
use ttnlog_common::db::CodeRecord;
use ttnlog_common::Result;

/// A successful mirror lookup: where the code sits in the remote store
/// and when it was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorHit {
    pub row_ref: i64,
    pub recorded_at: String,
    pub submitted_by: String,
}

/// SQLite-backed mirror of the remote store.
pub struct MirrorStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl MirrorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Look up a code. Returns `None` when the code is not mirrored.
    pub async fn lookup(&self, code: &str) -> Result<Option<MirrorHit>> {
        let row = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT row_ref, recorded_at, submitted_by FROM mirror_codes WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(row_ref, recorded_at, submitted_by)| MirrorHit {
            row_ref,
            recorded_at,
            submitted_by,
        }))
    }

    /// Replace the entire mirror with `records`, transactionally.
    ///
    /// After this returns, the mirror matches the remote store's last
    /// known good read exactly.
    pub async fn replace_all(&self, records: &[CodeRecord]) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM mirror_codes").execute(&mut *tx).await?;
        for record in records {
            sqlx::query(
                "INSERT OR REPLACE INTO mirror_codes (code, row_ref, recorded_at, submitted_by) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&record.code)
            .bind(record.row_ref)
            .bind(&record.recorded_at)
            .bind(&record.submitted_by)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!("Mirror replaced: {} records", records.len());
        Ok(())
    }

    /// Append records, ignoring codes already mirrored.
    ///
    /// Idempotent per code: re-appending an existing code is a no-op,
    /// so a flush and a concurrent resync cannot create duplicates.
    /// Returns the number of records actually inserted.
    pub async fn append(&self, records: &[CodeRecord]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let mut inserted = 0usize;
        for record in records {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO mirror_codes (code, row_ref, recorded_at, submitted_by) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&record.code)
            .bind(record.row_ref)
            .bind(&record.recorded_at)
            .bind(&record.submitted_by)
            .execute(&self.pool)
            .await?;
            inserted += result.rows_affected() as usize;
        }

        debug!("Mirror append: {} of {} records new", inserted, records.len());
        Ok(inserted)
    }

    /// Count mirrored codes, excluding blank cells carried over from
    /// the remote sheet.
    pub async fn count_non_empty(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mirror_codes WHERE code <> ''")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// All mirrored codes, used by the degraded fallback diff.
    pub async fn codes(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>("SELECT code FROM mirror_codes ORDER BY row_ref")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ttnlog_common::db::init_database;

    fn record(code: &str, row_ref: i64) -> CodeRecord {
        CodeRecord {
            code: code.to_string(),
            recorded_at: "2025-03-01 10:00:00".to_string(),
            submitted_by: "worker".to_string(),
            row_ref,
        }
    }

    async fn test_mirror() -> (tempfile::TempDir, MirrorStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("ttnlog.db")).await.unwrap();
        (dir, MirrorStore::new(pool))
    }

    #[tokio::test]
    async fn lookup_found_and_not_found() {
        let (_dir, mirror) = test_mirror().await;
        mirror.replace_all(&[record("12345678901", 2)]).await.unwrap();

        let hit = mirror.lookup("12345678901").await.unwrap().unwrap();
        assert_eq!(hit.row_ref, 2);
        assert_eq!(hit.recorded_at, "2025-03-01 10:00:00");

        assert!(mirror.lookup("99999999999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_is_idempotent_per_code() {
        let (_dir, mirror) = test_mirror().await;

        let first = mirror.append(&[record("12345678901", 2)]).await.unwrap();
        assert_eq!(first, 1);

        // Same code again, even with a different row_ref: no-op
        let second = mirror.append(&[record("12345678901", 7)]).await.unwrap();
        assert_eq!(second, 0);

        assert_eq!(mirror.count_non_empty().await.unwrap(), 1);
        let hit = mirror.lookup("12345678901").await.unwrap().unwrap();
        assert_eq!(hit.row_ref, 2);
    }

    #[tokio::test]
    async fn replace_all_with_empty_clears_mirror() {
        // A remote read that returns only the header row yields zero
        // records; the mirror must follow it down to zero
        let (_dir, mirror) = test_mirror().await;
        mirror
            .replace_all(&[record("12345678901", 2), record("12345678902", 3)])
            .await
            .unwrap();
        assert_eq!(mirror.count_non_empty().await.unwrap(), 2);

        mirror.replace_all(&[]).await.unwrap();
        assert_eq!(mirror.count_non_empty().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn codes_lists_in_row_order() {
        let (_dir, mirror) = test_mirror().await;
        mirror
            .replace_all(&[record("12345678902", 3), record("12345678901", 2)])
            .await
            .unwrap();
        assert_eq!(
            mirror.codes().await.unwrap(),
            vec!["12345678901".to_string(), "12345678902".to_string()]
        );
    }
}
