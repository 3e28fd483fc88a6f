// Schema migrations, embedded at compile time and tracked in `schema_version`

use crate::error::map_sqlx_error;
use queueup_core::error::Result;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial schema",
    sql: include_str!("../migrations/001_initial_schema.sql"),
}];

const CREATE_VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
)";

/// Bring the database up to the newest schema. Safe to call on every start.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(CREATE_VERSION_TABLE)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;

    let current: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(map_sqlx_error)?;

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();
    if pending.is_empty() {
        debug!(version = current, "Schema up to date");
        return Ok(());
    }

    for migration in pending {
        info!(version = migration.version, name = migration.name, "Applying migration");
        apply(pool, migration).await?;
    }

    info!(
        from = current,
        to = MIGRATIONS.last().map_or(current, |m| m.version),
        "Schema migrated"
    );
    Ok(())
}

/// Statements and the version row commit together
async fn apply(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

    for statement in statements(migration.sql) {
        execute(&mut tx, &statement).await?;
    }

    sqlx::query(
        "INSERT INTO schema_version (version, applied_at)
         VALUES (?, CAST(strftime('%s', 'now') AS INTEGER) * 1000)",
    )
    .bind(migration.version)
    .execute(&mut *tx)
    .await
    .map_err(map_sqlx_error)?;

    tx.commit().await.map_err(map_sqlx_error)
}

async fn execute(tx: &mut Transaction<'_, Sqlite>, statement: &str) -> Result<()> {
    sqlx::query(statement)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

/// Split a script on `;`, dropping `--` comment lines and empty statements.
/// Migration scripts must not contain `;` inside literals or triggers.
fn statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(|chunk| {
            chunk
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|statement| !statement.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::create_pool;

    #[test]
    fn test_statements_skip_comments() {
        let parsed = statements("-- header\nCREATE TABLE a (x);\n\n-- note\nCREATE INDEX i ON a(x);\n");
        assert_eq!(parsed, vec!["CREATE TABLE a (x)", "CREATE INDEX i ON a(x)"]);
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("migrate.db").display());
        let pool = create_pool(&url, 1).await.unwrap();

        run_migrations(&pool).await.unwrap();
        // Second run is a no-op
        run_migrations(&pool).await.unwrap();

        let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_version")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(versions, vec![1]);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM queue_entries")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
