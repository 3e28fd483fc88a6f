// Queue Coordinator - Join / Leave / CallNext over the position ledger
//
// The coordinator is the only caller of ledger mutators. Every committed
// mutation is published to the change feed after the commit returns, never
// before.

pub mod join;

pub use join::{JoinReceipt, JoinRequest};

use crate::application::feed::{ChangeFeed, QueueSubscription};
use crate::application::ledger::PositionLedger;
use crate::domain::{QueueEntry, QueueSnapshot, StudentStatus};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, LedgerStore, Retirement, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Result of a Leave request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveOutcome {
    /// Entry removed; everyone behind it moved up
    Left,
    /// Entry was already gone (called, removed, or never existed)
    AlreadyGone,
}

pub struct QueueCoordinator {
    ledger: PositionLedger,
    store: Arc<dyn LedgerStore>,
    feed: Arc<ChangeFeed>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl QueueCoordinator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        feed: Arc<ChangeFeed>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            ledger: PositionLedger::new(Arc::clone(&store)),
            store,
            feed,
            id_provider,
            time_provider,
        }
    }

    /// Join a professor's queue at the end.
    ///
    /// The coordinator does not deduplicate students; submitting twice
    /// yields two entries.
    pub async fn join(&self, professor_id: &str, req: JoinRequest) -> Result<JoinReceipt> {
        let commit = join::execute(
            &self.ledger,
            self.id_provider.as_ref(),
            self.time_provider.as_ref(),
            professor_id,
            req,
        )
        .await?;

        let receipt = JoinReceipt::from_entry(&commit.outcome);
        info!(
            professor_id = %professor_id,
            entry_id = %receipt.entry_id,
            position = receipt.position,
            revision = commit.snapshot.revision,
            "Student joined queue"
        );

        self.announce(commit.snapshot);
        Ok(receipt)
    }

    /// Leave the queue. Leaving an entry that is already gone is a no-op.
    pub async fn leave(&self, entry_id: &str) -> Result<LeaveOutcome> {
        let entry = match self.store.find_entry(entry_id).await? {
            Some(entry) if entry.is_waiting() => entry,
            _ => {
                debug!(entry_id = %entry_id, "Leave for entry no longer waiting");
                return Ok(LeaveOutcome::AlreadyGone);
            }
        };

        match self
            .ledger
            .remove_by_id(&entry.professor_id, entry_id, Retirement::Left)
            .await
        {
            Ok(commit) => {
                info!(
                    professor_id = %entry.professor_id,
                    entry_id = %entry_id,
                    revision = commit.snapshot.revision,
                    remaining = commit.snapshot.len(),
                    "Student left queue"
                );
                self.announce(commit.snapshot);
                Ok(LeaveOutcome::Left)
            }
            Err(AppError::NotFound(_)) => {
                debug!(entry_id = %entry_id, "Entry removed concurrently");
                Ok(LeaveOutcome::AlreadyGone)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove and return the entry at position 1, or `None` if the queue is
    /// empty. The returned entry is already committed as CALLED.
    pub async fn call_next(&self, professor_id: &str) -> Result<Option<QueueEntry>> {
        let now = self.time_provider.now_millis();

        match self
            .ledger
            .remove_at(professor_id, 1, Retirement::Called { at: now })
            .await
        {
            Ok(commit) => {
                info!(
                    professor_id = %professor_id,
                    entry_id = %commit.outcome.id,
                    student = %commit.outcome.student_name,
                    revision = commit.snapshot.revision,
                    remaining = commit.snapshot.len(),
                    "Called next student"
                );
                let called = commit.outcome;
                self.announce(commit.snapshot);
                Ok(Some(called))
            }
            Err(AppError::NotFound(_)) => {
                debug!(professor_id = %professor_id, "Call next on empty queue");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Explicit bulk leave: remove every waiting entry. Returns how many.
    pub async fn clear_queue(&self, professor_id: &str) -> Result<u64> {
        match self.ledger.remove_all(professor_id).await? {
            Some(commit) => {
                info!(
                    professor_id = %professor_id,
                    removed = commit.outcome,
                    revision = commit.snapshot.revision,
                    "Queue cleared"
                );
                let removed = commit.outcome;
                self.announce(commit.snapshot);
                Ok(removed)
            }
            None => Ok(0),
        }
    }

    /// Current committed queue
    pub async fn snapshot(&self, professor_id: &str) -> Result<Arc<QueueSnapshot>> {
        self.feed.refresh(professor_id).await
    }

    /// Observe a professor's queue
    pub async fn subscribe(&self, professor_id: &str) -> Result<QueueSubscription> {
        self.feed.subscribe(professor_id).await
    }

    /// Live subscriptions on a professor's queue
    pub fn subscriber_count(&self, professor_id: &str) -> Result<usize> {
        self.feed.subscriber_count(professor_id)
    }

    /// Where a student stands, by entry id
    pub async fn student_status(&self, entry_id: &str) -> Result<StudentStatus> {
        match self.store.find_entry(entry_id).await? {
            Some(entry) if entry.is_waiting() => {
                let snapshot = self.snapshot(&entry.professor_id).await?;
                Ok(snapshot.status_of(entry_id))
            }
            _ => Ok(StudentStatus::Served),
        }
    }

    fn announce(&self, snapshot: QueueSnapshot) {
        let professor_id = snapshot.professor_id.clone();
        if let Err(e) = self.feed.publish(snapshot) {
            // Committed state is intact; subscribers catch up on next refresh
            error!(professor_id = %professor_id, error = %e, "Failed to publish snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntryStatus, Professor};
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::ledger_store::mocks::InMemoryStore;
    use crate::port::time_provider::mocks::ManualClock;
    use crate::port::ProfessorRepository;

    struct Harness {
        store: InMemoryStore,
        clock: Arc<ManualClock>,
        coordinator: QueueCoordinator,
    }

    async fn harness() -> Harness {
        let store = InMemoryStore::new();
        store
            .insert(&Professor::new("prof-1", 0, "Ada", "ada@uni.edu", None))
            .await
            .unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let ledger_store: Arc<dyn LedgerStore> = Arc::new(store.clone());
        let coordinator = QueueCoordinator::new(
            Arc::clone(&ledger_store),
            Arc::new(ChangeFeed::new(ledger_store)),
            Arc::new(SequentialIdProvider::new("entry")),
            clock.clone(),
        );
        Harness {
            store,
            clock,
            coordinator,
        }
    }

    fn student(name: &str) -> JoinRequest {
        JoinRequest {
            student_name: name.to_string(),
            student_contact: format!("{}@uni.edu", name.to_lowercase()),
        }
    }

    fn layout(snapshot: &QueueSnapshot) -> Vec<(String, i64)> {
        snapshot
            .entries
            .iter()
            .map(|e| (e.student_name.clone(), e.position))
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let h = harness().await;
        let c = &h.coordinator;

        let alice = c.join("prof-1", student("Alice")).await.unwrap();
        h.clock.advance(1);
        let bob = c.join("prof-1", student("Bob")).await.unwrap();
        assert_eq!(alice.position, 1);
        assert_eq!(bob.position, 2);
        assert_eq!(bob.estimated_wait_minutes, 10);

        let called = c.call_next("prof-1").await.unwrap().unwrap();
        assert_eq!(called.id, alice.entry_id);
        assert_eq!(called.status, EntryStatus::Called);
        assert_eq!(
            c.student_status(&bob.entry_id).await.unwrap(),
            StudentStatus::Waiting {
                position: 1,
                queue_length: 1,
                estimated_wait_minutes: 5,
                is_next: true,
            }
        );

        assert_eq!(c.leave(&bob.entry_id).await.unwrap(), LeaveOutcome::Left);
        assert!(c.snapshot("prof-1").await.unwrap().is_empty());
        assert!(c.call_next("prof-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mid_queue_leave_renumbers() {
        let h = harness().await;
        let c = &h.coordinator;
        c.join("prof-1", student("A")).await.unwrap();
        let b = c.join("prof-1", student("B")).await.unwrap();
        c.join("prof-1", student("C")).await.unwrap();

        c.leave(&b.entry_id).await.unwrap();

        let snapshot = c.snapshot("prof-1").await.unwrap();
        assert_eq!(
            layout(&snapshot),
            vec![("A".to_string(), 1), ("C".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_leave_twice_is_noop() {
        let h = harness().await;
        let c = &h.coordinator;
        let a = c.join("prof-1", student("A")).await.unwrap();

        assert_eq!(c.leave(&a.entry_id).await.unwrap(), LeaveOutcome::Left);
        assert_eq!(c.leave(&a.entry_id).await.unwrap(), LeaveOutcome::AlreadyGone);
        assert_eq!(c.leave("never-existed").await.unwrap(), LeaveOutcome::AlreadyGone);
        assert!(c.snapshot("prof-1").await.unwrap().is_dense());
    }

    #[tokio::test]
    async fn test_leave_after_called_is_noop() {
        let h = harness().await;
        let c = &h.coordinator;
        let a = c.join("prof-1", student("A")).await.unwrap();
        c.call_next("prof-1").await.unwrap();

        assert_eq!(c.leave(&a.entry_id).await.unwrap(), LeaveOutcome::AlreadyGone);
        assert_eq!(c.student_status(&a.entry_id).await.unwrap(), StudentStatus::Served);
    }

    #[tokio::test]
    async fn test_call_next_on_empty_mutates_nothing() {
        let h = harness().await;
        let before = h.coordinator.snapshot("prof-1").await.unwrap();

        assert!(h.coordinator.call_next("prof-1").await.unwrap().is_none());

        let after = h.coordinator.snapshot("prof-1").await.unwrap();
        assert_eq!(before.revision, after.revision);
        assert!(after.is_empty());
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let h = harness().await;
        let c = &h.coordinator;
        let names = ["A", "B", "C", "D"];
        for name in names {
            c.join("prof-1", student(name)).await.unwrap();
            h.clock.advance(5);
        }

        let mut served = Vec::new();
        while let Some(entry) = c.call_next("prof-1").await.unwrap() {
            served.push(entry.student_name);
        }
        assert_eq!(served, names);
    }

    #[tokio::test]
    async fn test_join_ended_professor_rejected() {
        let h = harness().await;
        h.store
            .update_availability(
                "prof-1",
                crate::domain::Availability::Available,
                crate::domain::Availability::Ended,
                5,
            )
            .await
            .unwrap();

        let err = h
            .coordinator
            .join("prof-1", student("A"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProfessorUnavailable(_)));
    }

    #[tokio::test]
    async fn test_join_validation_error() {
        let h = harness().await;
        let err = h
            .coordinator
            .join(
                "prof-1",
                JoinRequest {
                    student_name: " ".into(),
                    student_contact: "a@uni.edu".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_and_publishes_nothing() {
        let h = harness().await;
        let c = &h.coordinator;
        c.join("prof-1", student("A")).await.unwrap();
        let sub = c.subscribe("prof-1").await.unwrap();
        let revision = sub.revision();

        h.store.fail_next_commits(1);
        let err = c.call_next("prof-1").await.unwrap_err();
        assert!(err.is_transient());

        assert_eq!(sub.revision(), revision);
        assert_eq!(c.snapshot("prof-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_sees_called_student_disappear() {
        let h = harness().await;
        let c = &h.coordinator;
        let a = c.join("prof-1", student("A")).await.unwrap();
        c.join("prof-1", student("B")).await.unwrap();

        let mut sub = c.subscribe("prof-1").await.unwrap();
        assert_eq!(sub.current().position_of(&a.entry_id), Some(1));

        c.call_next("prof-1").await.unwrap();
        let next = sub.next().await.unwrap();
        assert_eq!(next.status_of(&a.entry_id), StudentStatus::Served);
        assert!(next.is_dense());
    }

    #[tokio::test]
    async fn test_subscriber_receives_every_commit() {
        let h = harness().await;
        let c = &h.coordinator;
        let mut sub = c.subscribe("prof-1").await.unwrap();

        for name in ["A", "B", "C", "D", "E"] {
            c.join("prof-1", student(name)).await.unwrap();
        }

        let mut delivered = Vec::new();
        while let Ok(Some(snapshot)) =
            tokio::time::timeout(std::time::Duration::from_millis(100), sub.next()).await
        {
            delivered.push((snapshot.revision, snapshot.len()));
        }
        assert_eq!(delivered, vec![(1, 1), (2, 2), (3, 3), (4, 4), (5, 5)]);
    }

    #[tokio::test]
    async fn test_clear_queue() {
        let h = harness().await;
        let c = &h.coordinator;
        assert_eq!(c.clear_queue("prof-1").await.unwrap(), 0);

        c.join("prof-1", student("A")).await.unwrap();
        c.join("prof-1", student("B")).await.unwrap();
        assert_eq!(c.clear_queue("prof-1").await.unwrap(), 2);
        assert!(c.snapshot("prof-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_joins_and_leaves_keep_queue_dense() {
        let h = harness().await;
        let c = Arc::new(h.coordinator);

        let mut joins = tokio::task::JoinSet::new();
        for i in 0..30 {
            let c = Arc::clone(&c);
            joins.spawn(async move { c.join("prof-1", student(&format!("S{}", i))).await });
        }
        let mut receipts = Vec::new();
        while let Some(res) = joins.join_next().await {
            receipts.push(res.unwrap().unwrap());
        }

        let mut ops = tokio::task::JoinSet::new();
        for receipt in receipts.iter().step_by(3) {
            let c = Arc::clone(&c);
            let id = receipt.entry_id.clone();
            ops.spawn(async move {
                c.leave(&id).await.unwrap();
            });
        }
        for _ in 0..5 {
            let c = Arc::clone(&c);
            ops.spawn(async move {
                c.call_next("prof-1").await.unwrap();
            });
        }
        while let Some(res) = ops.join_next().await {
            res.unwrap();
        }

        let snapshot = c.snapshot("prof-1").await.unwrap();
        assert!(snapshot.is_dense());
        // 30 joined, 10 left; 5 calls may overlap with leavers at the head
        assert!(snapshot.len() >= 15 && snapshot.len() <= 20);
    }
}
