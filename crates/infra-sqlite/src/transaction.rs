// SQLite Ledger Transaction
//
// Opened by `SqliteLedgerStore::begin`, which has already bumped the
// professor's revision. That first write holds SQLite's write lock until
// commit or rollback, so everything below runs serialized.

use crate::error::map_sqlx_error;
use crate::rows::{parse_availability, EntryRow, ENTRY_COLUMNS};
use async_trait::async_trait;
use queueup_core::domain::{Availability, EntryStatus, ProfessorId, QueueEntry, Revision};
use queueup_core::error::Result;
use queueup_core::port::{LedgerTransaction, Retirement, Transaction};
use sqlx::{Sqlite, Transaction as SqlxTransaction};

pub struct SqliteLedgerTransaction {
    tx: SqlxTransaction<'static, Sqlite>,
    professor_id: ProfessorId,
    revision: Revision,
}

impl SqliteLedgerTransaction {
    pub(crate) fn new(
        tx: SqlxTransaction<'static, Sqlite>,
        professor_id: &str,
        revision: Revision,
    ) -> Self {
        Self {
            tx,
            professor_id: professor_id.to_string(),
            revision,
        }
    }
}

#[async_trait]
impl Transaction for SqliteLedgerTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl LedgerTransaction for SqliteLedgerTransaction {
    fn revision(&self) -> Revision {
        self.revision
    }

    async fn availability(&mut self) -> Result<Option<Availability>> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT availability FROM professors WHERE id = ?")
                .bind(&self.professor_id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;

        raw.as_deref().map(parse_availability).transpose()
    }

    async fn waiting_entries(&mut self) -> Result<Vec<QueueEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM queue_entries \
             WHERE professor_id = ? AND status = ? \
             ORDER BY position ASC, joined_at ASC",
            ENTRY_COLUMNS
        ))
        .bind(&self.professor_id)
        .bind(EntryStatus::Waiting.to_string())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(EntryRow::into_entry).collect()
    }

    async fn insert(&mut self, entry: &QueueEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO queue_entries (
                id, professor_id, student_name, student_contact,
                position, status, joined_at, called_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.professor_id)
        .bind(&entry.student_name)
        .bind(&entry.student_contact)
        .bind(entry.position)
        .bind(entry.status.to_string())
        .bind(entry.joined_at)
        .bind(entry.called_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn retire(&mut self, entry_id: &str, how: Retirement) -> Result<bool> {
        let waiting = EntryStatus::Waiting.to_string();
        let result = match how {
            Retirement::Left => {
                sqlx::query(
                    "DELETE FROM queue_entries WHERE id = ? AND professor_id = ? AND status = ?",
                )
                .bind(entry_id)
                .bind(&self.professor_id)
                .bind(&waiting)
                .execute(&mut *self.tx)
                .await
            }
            Retirement::Called { at } => {
                sqlx::query(
                    r#"
                    UPDATE queue_entries
                    SET status = ?, position = NULL, called_at = ?
                    WHERE id = ? AND professor_id = ? AND status = ?
                    "#,
                )
                .bind(EntryStatus::Called.to_string())
                .bind(at)
                .bind(entry_id)
                .bind(&self.professor_id)
                .bind(&waiting)
                .execute(&mut *self.tx)
                .await
            }
        }
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn shift_down_after(&mut self, position: i64) -> Result<u64> {
        let waiting = EntryStatus::Waiting.to_string();

        // Two passes through negative space: the unique index on
        // (professor_id, position) is checked per row, so decrementing in
        // place could collide with a row not yet moved.
        let shifted = sqlx::query(
            r#"
            UPDATE queue_entries
            SET position = -(position - 1)
            WHERE professor_id = ? AND status = ? AND position > ?
            "#,
        )
        .bind(&self.professor_id)
        .bind(&waiting)
        .bind(position)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        sqlx::query(
            r#"
            UPDATE queue_entries
            SET position = -position
            WHERE professor_id = ? AND status = ? AND position < 0
            "#,
        )
        .bind(&self.professor_id)
        .bind(&waiting)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(shifted)
    }

    async fn retire_all_waiting(&mut self) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM queue_entries WHERE professor_id = ? AND status = ?")
                .bind(&self.professor_id)
                .bind(EntryStatus::Waiting.to_string())
                .execute(&mut *self.tx)
                .await
                .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
