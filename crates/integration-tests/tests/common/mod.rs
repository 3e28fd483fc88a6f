//! Shared setup: a temp-file SQLite database wired into the core services

#![allow(dead_code)]

use queueup_core::application::{
    AvailabilityTracker, ChangeFeed, FeedConfig, JoinReceipt, JoinRequest, QueueCoordinator,
    RegisterRequest,
};
use queueup_core::port::id_provider::UuidProvider;
use queueup_core::port::time_provider::SystemTimeProvider;
use queueup_core::port::LedgerStore;
use queueup_infra_sqlite::{
    create_pool, run_migrations, SqliteLedgerStore, SqliteProfessorRepository,
};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Feed poll interval for tests; short so cross-process delivery is quick
pub const FEED_POLL: Duration = Duration::from_millis(20);

/// One "process" worth of services over a database file
pub struct App {
    pub pool: SqlitePool,
    pub store: Arc<dyn LedgerStore>,
    pub coordinator: Arc<QueueCoordinator>,
    pub tracker: Arc<AvailabilityTracker>,
}

impl App {
    pub async fn open(db_path: &Path) -> Self {
        let url = format!("sqlite://{}", db_path.display());
        let pool = create_pool(&url, 5).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let store: Arc<dyn LedgerStore> = Arc::new(SqliteLedgerStore::new(pool.clone()));
        let coordinator = Arc::new(QueueCoordinator::new(
            Arc::clone(&store),
            Arc::new(ChangeFeed::with_config(
                Arc::clone(&store),
                FeedConfig {
                    poll_interval: FEED_POLL,
                    ..FeedConfig::default()
                },
            )),
            Arc::new(UuidProvider),
            Arc::new(SystemTimeProvider),
        ));
        let tracker = Arc::new(AvailabilityTracker::new(
            Arc::new(SqliteProfessorRepository::new(pool.clone())),
            Arc::new(UuidProvider),
            Arc::new(SystemTimeProvider),
        ));

        Self {
            pool,
            store,
            coordinator,
            tracker,
        }
    }

    pub async fn professor(&self, name: &str) -> String {
        self.tracker
            .register(RegisterRequest {
                name: name.to_string(),
                email: format!("{}@uni.edu", name.to_lowercase()),
                office: Some("MSC 3106".to_string()),
            })
            .await
            .unwrap()
            .id
    }

    pub async fn join(&self, professor_id: &str, student: &str) -> JoinReceipt {
        self.coordinator
            .join(professor_id, request(student))
            .await
            .unwrap()
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

pub fn request(student: &str) -> JoinRequest {
    JoinRequest {
        student_name: student.to_string(),
        student_contact: format!("{}@students.uni.edu", student.to_lowercase()),
    }
}

pub fn temp_db() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queueup.db");
    (dir, path)
}
