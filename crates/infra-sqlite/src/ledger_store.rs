// SQLite LedgerStore Implementation

use crate::error::map_sqlx_error;
use crate::rows::{EntryRow, ENTRY_COLUMNS};
use crate::SqliteLedgerTransaction;
use async_trait::async_trait;
use queueup_core::domain::{EntryStatus, QueueEntry, QueueSnapshot, Revision};
use queueup_core::error::{AppError, Result};
use queueup_core::port::{LedgerStore, LedgerTransaction};
use sqlx::SqlitePool;
use tracing::debug;

pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn to_revision(raw: i64) -> Result<Revision> {
    Revision::try_from(raw)
        .map_err(|_| AppError::InvariantViolation(format!("negative revision {}", raw)))
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn begin(&self, professor_id: &str) -> Result<Box<dyn LedgerTransaction>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        // Write first: takes the database write lock before any read
        let revision: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO queue_revisions (professor_id, revision) VALUES (?, 1)
            ON CONFLICT(professor_id) DO UPDATE SET revision = revision + 1
            RETURNING revision
            "#,
        )
        .bind(professor_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        debug!(professor_id = %professor_id, revision = revision, "Ledger transaction opened");

        Ok(Box::new(SqliteLedgerTransaction::new(
            tx,
            professor_id,
            to_revision(revision)?,
        )))
    }

    async fn find_entry(&self, entry_id: &str) -> Result<Option<QueueEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM queue_entries WHERE id = ?",
            ENTRY_COLUMNS
        ))
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(EntryRow::into_entry).transpose()
    }

    async fn load_snapshot(&self, professor_id: &str) -> Result<QueueSnapshot> {
        // One read transaction so revision and entries come from the same state
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let revision: Option<i64> =
            sqlx::query_scalar("SELECT revision FROM queue_revisions WHERE professor_id = ?")
                .bind(professor_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM queue_entries \
             WHERE professor_id = ? AND status = ? \
             ORDER BY position ASC, joined_at ASC",
            ENTRY_COLUMNS
        ))
        .bind(professor_id)
        .bind(EntryStatus::Waiting.to_string())
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        let entries = rows
            .into_iter()
            .map(EntryRow::into_entry)
            .collect::<Result<Vec<_>>>()?;
        QueueSnapshot::from_sequence(professor_id, to_revision(revision.unwrap_or(0))?, &entries)
            .map_err(|e| AppError::from(e).normalize())
    }

    async fn latest_revision(&self, professor_id: &str) -> Result<Revision> {
        let revision: Option<i64> =
            sqlx::query_scalar("SELECT revision FROM queue_revisions WHERE professor_id = ?")
                .bind(professor_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        to_revision(revision.unwrap_or(0))
    }

    async fn count_by_status(&self, status: EntryStatus) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM queue_entries WHERE status = ?")
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}
