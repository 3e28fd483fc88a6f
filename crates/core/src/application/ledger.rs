// Position Ledger - sole owner of position assignment
//
// Every mutator is one store transaction: claim the professor's lock,
// read the sequence, derive positions, write, re-verify, commit.

use crate::domain::snapshot::verify_sequence;
use crate::domain::{QueueEntry, QueueSnapshot, StudentInfo};
use crate::error::{AppError, Result};
use crate::port::{LedgerStore, LedgerTransaction, Retirement};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Result of a committed ledger mutation
#[derive(Debug, Clone)]
pub struct LedgerCommit<T> {
    pub outcome: T,
    /// Waiting set exactly as committed
    pub snapshot: QueueSnapshot,
}

/// Which waiting entry a removal targets
#[derive(Clone, Copy)]
enum Target<'a> {
    Position(i64),
    Id(&'a str),
}

pub struct PositionLedger {
    store: Arc<dyn LedgerStore>,
}

impl PositionLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Insert a new waiting entry at the end of the professor's sequence.
    ///
    /// Position = current length + 1, derived inside the transaction.
    /// Rejects with `ProfessorUnavailable` when the professor is unknown or
    /// has ended office hours (checked under the same lock).
    /// `joined_at` is clamped so arrival times never decrease along the queue.
    pub async fn append(
        &self,
        professor_id: &str,
        entry_id: String,
        student: StudentInfo,
        now_millis: i64,
    ) -> Result<LedgerCommit<QueueEntry>> {
        let mut tx = self.store.begin(professor_id).await?;

        match tx.availability().await? {
            None => {
                return Err(abort(
                    tx,
                    AppError::ProfessorUnavailable(format!(
                        "Professor {} not found",
                        professor_id
                    )),
                )
                .await)
            }
            Some(availability) if !availability.accepts_joins() => {
                return Err(abort(
                    tx,
                    AppError::ProfessorUnavailable(format!(
                        "Professor {} has ended office hours",
                        professor_id
                    )),
                )
                .await)
            }
            Some(_) => {}
        }

        let sequence = match load_verified(tx.as_mut()).await {
            Ok(seq) => seq,
            Err(e) => return Err(abort(tx, e).await),
        };

        let position = sequence.len() as i64 + 1;
        let joined_at = sequence
            .last()
            .map_or(now_millis, |last| now_millis.max(last.joined_at));
        let entry = QueueEntry::new_waiting(entry_id, professor_id, student, position, joined_at);

        if let Err(e) = tx.insert(&entry).await {
            return Err(abort(tx, ledger_error(e)).await);
        }

        debug!(
            professor_id = %professor_id,
            entry_id = %entry.id,
            position = position,
            revision = tx.revision(),
            "Ledger append staged"
        );

        finish(tx, professor_id, entry).await
    }

    /// Remove the entry at `position` and renumber every later entry down by
    /// one, atomically. `NotFound` if the position is unoccupied.
    pub async fn remove_at(
        &self,
        professor_id: &str,
        position: i64,
        how: Retirement,
    ) -> Result<LedgerCommit<QueueEntry>> {
        self.remove(professor_id, Target::Position(position), how)
            .await
    }

    /// Resolve the entry's current position and remove it like `remove_at`.
    pub async fn remove_by_id(
        &self,
        professor_id: &str,
        entry_id: &str,
        how: Retirement,
    ) -> Result<LedgerCommit<QueueEntry>> {
        self.remove(professor_id, Target::Id(entry_id), how).await
    }

    /// Delete every waiting entry (explicit bulk leave).
    ///
    /// Returns `None` without consuming a revision when the queue is empty.
    pub async fn remove_all(&self, professor_id: &str) -> Result<Option<LedgerCommit<u64>>> {
        let mut tx = self.store.begin(professor_id).await?;

        let sequence = match load_verified(tx.as_mut()).await {
            Ok(seq) => seq,
            Err(e) => return Err(abort(tx, e).await),
        };
        if sequence.is_empty() {
            let _ = abort(tx, AppError::NotFound(professor_id.to_string())).await;
            return Ok(None);
        }

        let removed = match tx.retire_all_waiting().await {
            Ok(n) => n,
            Err(e) => return Err(abort(tx, ledger_error(e)).await),
        };
        if removed != sequence.len() as u64 {
            return Err(abort(
                tx,
                AppError::InvariantViolation(format!(
                    "cleared {} entries, expected {}",
                    removed,
                    sequence.len()
                )),
            )
            .await);
        }

        finish(tx, professor_id, removed).await.map(Some)
    }

    async fn remove(
        &self,
        professor_id: &str,
        target: Target<'_>,
        how: Retirement,
    ) -> Result<LedgerCommit<QueueEntry>> {
        let mut tx = self.store.begin(professor_id).await?;

        let sequence = match load_verified(tx.as_mut()).await {
            Ok(seq) => seq,
            Err(e) => return Err(abort(tx, e).await),
        };

        let found = match target {
            Target::Position(p) => sequence.iter().find(|e| e.position == Some(p)),
            Target::Id(id) => sequence.iter().find(|e| e.id == id),
        };
        let Some(mut removed) = found.cloned() else {
            let what = match target {
                Target::Position(p) => format!("position {}", p),
                Target::Id(id) => format!("entry {}", id),
            };
            debug!(professor_id = %professor_id, target = %what, "Ledger removal target already gone");
            return Err(abort(
                tx,
                AppError::NotFound(format!("No waiting {} for professor {}", what, professor_id)),
            )
            .await);
        };
        let position = removed.position.unwrap_or_default();

        match tx.retire(&removed.id, how).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(abort(
                    tx,
                    AppError::InvariantViolation(format!(
                        "entry {} vanished inside its own transaction",
                        removed.id
                    )),
                )
                .await)
            }
            Err(e) => return Err(abort(tx, ledger_error(e)).await),
        }

        let expected_shift = sequence.len() as u64 - position as u64;
        match tx.shift_down_after(position).await {
            Ok(n) if n == expected_shift => {}
            Ok(n) => {
                return Err(abort(
                    tx,
                    AppError::InvariantViolation(format!(
                        "renumbered {} entries after position {}, expected {}",
                        n, position, expected_shift
                    )),
                )
                .await)
            }
            Err(e) => return Err(abort(tx, ledger_error(e)).await),
        }

        match how {
            Retirement::Called { at } => removed.mark_called(at),
            Retirement::Left => removed.position = None,
        }

        debug!(
            professor_id = %professor_id,
            entry_id = %removed.id,
            position = position,
            renumbered = expected_shift,
            revision = tx.revision(),
            "Ledger removal staged"
        );

        finish(tx, professor_id, removed).await
    }
}

/// Read the waiting sequence and refuse to build on a broken one
async fn load_verified(tx: &mut dyn LedgerTransaction) -> Result<Vec<QueueEntry>> {
    let sequence = tx.waiting_entries().await?;
    verify_sequence(&sequence).map_err(|e| AppError::from(e).normalize())?;
    Ok(sequence)
}

/// Re-verify the staged state, then commit
async fn finish<T>(
    mut tx: Box<dyn LedgerTransaction>,
    professor_id: &str,
    outcome: T,
) -> Result<LedgerCommit<T>> {
    let staged = match tx.waiting_entries().await {
        Ok(seq) => seq,
        Err(e) => return Err(abort(tx, e).await),
    };
    let snapshot = match QueueSnapshot::from_sequence(professor_id, tx.revision(), &staged) {
        Ok(snapshot) => snapshot,
        Err(e) => return Err(abort(tx, AppError::from(e).normalize()).await),
    };

    tx.commit().await?;
    Ok(LedgerCommit { outcome, snapshot })
}

/// Roll back and hand the error back to the caller
async fn abort(tx: Box<dyn LedgerTransaction>, err: AppError) -> AppError {
    if let AppError::InvariantViolation(msg) = &err {
        error!(revision = tx.revision(), violation = %msg, "Ledger invariant violated, aborting");
    }
    if let Err(rollback_err) = tx.rollback().await {
        warn!(error = %rollback_err, "Ledger rollback failed");
    }
    err
}

/// A uniqueness conflict on a ledger write means two entries claimed one
/// position.
fn ledger_error(err: AppError) -> AppError {
    match err {
        AppError::Conflict(msg) => AppError::InvariantViolation(msg),
        other => other.normalize(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntryStatus, Professor};
    use crate::port::ledger_store::mocks::InMemoryStore;
    use crate::port::ProfessorRepository;

    async fn setup() -> (InMemoryStore, PositionLedger) {
        let store = InMemoryStore::new();
        store
            .insert(&Professor::new("prof-1", 0, "Ada", "ada@uni.edu", None))
            .await
            .unwrap();
        let ledger = PositionLedger::new(Arc::new(store.clone()));
        (store, ledger)
    }

    async fn append(ledger: &PositionLedger, id: &str, at: i64) -> LedgerCommit<QueueEntry> {
        ledger
            .append(
                "prof-1",
                id.to_string(),
                StudentInfo::new(id, format!("{}@uni.edu", id)),
                at,
            )
            .await
            .unwrap()
    }

    fn ids(snapshot: &QueueSnapshot) -> Vec<(&str, i64)> {
        snapshot
            .entries
            .iter()
            .map(|e| (e.id.as_str(), e.position))
            .collect()
    }

    #[tokio::test]
    async fn test_append_assigns_next_position() {
        let (_store, ledger) = setup().await;

        let a = append(&ledger, "a", 10).await;
        let b = append(&ledger, "b", 20).await;

        assert_eq!(a.outcome.position, Some(1));
        assert_eq!(b.outcome.position, Some(2));
        assert_eq!(ids(&b.snapshot), vec![("a", 1), ("b", 2)]);
        assert!(b.snapshot.revision > a.snapshot.revision);
    }

    #[tokio::test]
    async fn test_append_clamps_arrival_time() {
        let (_store, ledger) = setup().await;

        append(&ledger, "a", 500).await;
        // Clock went backwards between joins
        let b = append(&ledger, "b", 100).await;
        assert_eq!(b.outcome.joined_at, 500);
    }

    #[tokio::test]
    async fn test_remove_at_renumbers_tail() {
        let (_store, ledger) = setup().await;
        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            append(&ledger, id, i as i64).await;
        }

        let commit = ledger
            .remove_at("prof-1", 2, Retirement::Left)
            .await
            .unwrap();

        assert_eq!(commit.outcome.id, "b");
        assert_eq!(ids(&commit.snapshot), vec![("a", 1), ("c", 2), ("d", 3)]);
    }

    #[tokio::test]
    async fn test_remove_by_id_uses_current_position() {
        let (_store, ledger) = setup().await;
        append(&ledger, "a", 1).await;
        append(&ledger, "b", 2).await;
        append(&ledger, "c", 3).await;

        // "c" was observed at position 3; "a" leaving moves it to 2
        ledger
            .remove_by_id("prof-1", "a", Retirement::Left)
            .await
            .unwrap();
        let commit = ledger
            .remove_by_id("prof-1", "c", Retirement::Left)
            .await
            .unwrap();

        assert_eq!(ids(&commit.snapshot), vec![("b", 1)]);
    }

    #[tokio::test]
    async fn test_remove_missing_is_not_found_and_consumes_no_revision() {
        let (store, ledger) = setup().await;
        append(&ledger, "a", 1).await;
        let before = store.load_snapshot("prof-1").await.unwrap().revision;

        let err = ledger
            .remove_at("prof-1", 5, Retirement::Left)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = ledger
            .remove_by_id("prof-1", "ghost", Retirement::Left)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        assert_eq!(store.load_snapshot("prof-1").await.unwrap().revision, before);
    }

    #[tokio::test]
    async fn test_called_entry_keeps_record_outside_waiting_set() {
        let (store, ledger) = setup().await;
        append(&ledger, "a", 1).await;

        let commit = ledger
            .remove_at("prof-1", 1, Retirement::Called { at: 42 })
            .await
            .unwrap();

        assert_eq!(commit.outcome.status, EntryStatus::Called);
        assert_eq!(commit.outcome.called_at, Some(42));
        assert!(commit.snapshot.is_empty());

        let stored = store.find_entry("a").await.unwrap().unwrap();
        assert_eq!(stored.status, EntryStatus::Called);
        assert_eq!(stored.position, None);
    }

    #[tokio::test]
    async fn test_remove_all() {
        let (store, ledger) = setup().await;
        assert!(ledger.remove_all("prof-1").await.unwrap().is_none());

        append(&ledger, "a", 1).await;
        append(&ledger, "b", 2).await;

        let commit = ledger.remove_all("prof-1").await.unwrap().unwrap();
        assert_eq!(commit.outcome, 2);
        assert!(commit.snapshot.is_empty());
        assert_eq!(store.entry_count("prof-1").await, 0);
    }

    #[tokio::test]
    async fn test_corrupted_sequence_aborts_instead_of_renumbering() {
        let (store, ledger) = setup().await;
        append(&ledger, "a", 1).await;
        append(&ledger, "b", 2).await;
        store.corrupt_position("b", 7).await;

        let err = ledger
            .remove_at("prof-1", 1, Retirement::Left)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));

        // Nothing was applied
        assert!(store.find_entry("a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_commit_applies_nothing() {
        let (store, ledger) = setup().await;
        append(&ledger, "a", 1).await;

        store.fail_next_commits(1);
        let err = ledger
            .append("prof-1", "b".into(), StudentInfo::new("b", "b@uni.edu"), 2)
            .await
            .unwrap_err();
        assert!(err.is_transient());

        let snapshot = store.load_snapshot("prof-1").await.unwrap();
        assert_eq!(ids(&snapshot), vec![("a", 1)]);
    }

    #[tokio::test]
    async fn test_unknown_professor_rejected() {
        let (_store, ledger) = setup().await;
        let err = ledger
            .append("nobody", "x".into(), StudentInfo::new("x", "x@uni.edu"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProfessorUnavailable(_)));
    }

    #[tokio::test]
    async fn test_concurrent_appends_get_distinct_positions() {
        let (store, ledger) = setup().await;
        let ledger = Arc::new(ledger);

        let mut handles = Vec::new();
        for i in 0..20 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger
                    .append(
                        "prof-1",
                        format!("s{}", i),
                        StudentInfo::new(format!("s{}", i), "s@uni.edu"),
                        i,
                    )
                    .await
                    .unwrap()
                    .outcome
                    .position
            }));
        }

        let mut positions: Vec<i64> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();
        positions.sort_unstable();
        assert_eq!(positions, (1..=20).collect::<Vec<_>>());

        let snapshot = store.load_snapshot("prof-1").await.unwrap();
        assert!(snapshot.is_dense());
        assert_eq!(snapshot.len(), 20);
    }
}
