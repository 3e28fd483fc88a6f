// SQLite ProfessorRepository Implementation

use crate::error::map_sqlx_error;
use crate::rows::ProfessorRow;
use async_trait::async_trait;
use queueup_core::domain::{Availability, Professor};
use queueup_core::error::{AppError, Result};
use queueup_core::port::ProfessorRepository;
use sqlx::SqlitePool;

const PROFESSOR_COLUMNS: &str = "id, name, email, office, availability, created_at, updated_at";

pub struct SqliteProfessorRepository {
    pool: SqlitePool,
}

impl SqliteProfessorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Professor>> {
        let row: Option<ProfessorRow> = sqlx::query_as(&format!(
            "SELECT {} FROM professors WHERE {} = ?",
            PROFESSOR_COLUMNS, column
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(ProfessorRow::into_professor).transpose()
    }
}

#[async_trait]
impl ProfessorRepository for SqliteProfessorRepository {
    async fn insert(&self, professor: &Professor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO professors (
                id, name, email, office, availability, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&professor.id)
        .bind(&professor.name)
        .bind(&professor.email)
        .bind(&professor.office)
        .bind(professor.availability.to_string())
        .bind(professor.created_at)
        .bind(professor.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Professor>> {
        self.find_one("id", id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Professor>> {
        self.find_one("email", email).await
    }

    async fn update_availability(
        &self,
        id: &str,
        expected: Availability,
        next: Availability,
        now_millis: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE professors
            SET availability = ?, updated_at = ?
            WHERE id = ? AND availability = ?
            "#,
        )
        .bind(next.to_string())
        .bind(now_millis)
        .bind(id)
        .bind(expected.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_profile(&self, professor: &Professor) -> Result<()> {
        let result =
            sqlx::query("UPDATE professors SET name = ?, office = ?, updated_at = ? WHERE id = ?")
                .bind(&professor.name)
                .bind(&professor.office)
                .bind(professor.updated_at)
                .bind(&professor.id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Professor {} not found",
                professor.id
            )));
        }
        Ok(())
    }

    async fn list_listed(&self) -> Result<Vec<Professor>> {
        let rows: Vec<ProfessorRow> = sqlx::query_as(&format!(
            "SELECT {} FROM professors WHERE availability != ? ORDER BY name ASC, id ASC",
            PROFESSOR_COLUMNS
        ))
        .bind(Availability::Ended.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(ProfessorRow::into_professor).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqliteProfessorRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("profs.db").display());
        let pool = create_pool(&url, 2).await.unwrap();
        run_migrations(&pool).await.unwrap();
        (dir, SqliteProfessorRepository::new(pool))
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let (_dir, repo) = setup().await;
        let prof = Professor::new("p1", 10, "Ada", "ada@uni.edu", Some("MSC 3106".into()));
        repo.insert(&prof).await.unwrap();

        assert_eq!(repo.find_by_id("p1").await.unwrap(), Some(prof.clone()));
        assert_eq!(repo.find_by_email("ada@uni.edu").await.unwrap(), Some(prof));
        assert!(repo.find_by_id("p2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let (_dir, repo) = setup().await;
        repo.insert(&Professor::new("p1", 0, "Ada", "ada@uni.edu", None))
            .await
            .unwrap();

        let err = repo
            .insert(&Professor::new("p2", 0, "Other", "ada@uni.edu", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_availability_is_compare_and_set() {
        let (_dir, repo) = setup().await;
        repo.insert(&Professor::new("p1", 0, "Ada", "ada@uni.edu", None))
            .await
            .unwrap();

        assert!(repo
            .update_availability("p1", Availability::Available, Availability::Busy, 5)
            .await
            .unwrap());
        // Stale expectation
        assert!(!repo
            .update_availability("p1", Availability::Available, Availability::Ended, 6)
            .await
            .unwrap());

        let prof = repo.find_by_id("p1").await.unwrap().unwrap();
        assert_eq!(prof.availability, Availability::Busy);
        assert_eq!(prof.updated_at, 5);
    }

    #[tokio::test]
    async fn test_list_listed_hides_ended() {
        let (_dir, repo) = setup().await;
        repo.insert(&Professor::new("p1", 0, "Zed", "zed@uni.edu", None))
            .await
            .unwrap();
        repo.insert(&Professor::new("p2", 0, "Ada", "ada@uni.edu", None))
            .await
            .unwrap();
        repo.insert(&Professor::new("p3", 0, "Bob", "bob@uni.edu", None))
            .await
            .unwrap();
        repo.update_availability("p3", Availability::Available, Availability::Ended, 1)
            .await
            .unwrap();

        let names: Vec<String> = repo
            .list_listed()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Ada", "Zed"]);
    }

    #[tokio::test]
    async fn test_update_profile_missing() {
        let (_dir, repo) = setup().await;
        let err = repo
            .update_profile(&Professor::new("ghost", 0, "G", "g@uni.edu", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
