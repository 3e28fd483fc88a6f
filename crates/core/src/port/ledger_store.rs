// Ledger Store Port - the Durable Store behind the position ledger

use crate::domain::{
    Availability, EntryStatus, QueueEntry, QueueSnapshot, Revision,
};
use crate::error::Result;
use crate::port::Transaction;
use async_trait::async_trait;

/// How an entry leaves the waiting set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retirement {
    /// Student left (or was removed): the record is deleted
    Left,
    /// Professor called the student: record kept with status CALLED
    Called { at: i64 },
}

/// Durable store for queue entries
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Begin a transaction scoped to one professor's entry collection.
    ///
    /// Implementations must claim the professor's write lock (and bump the
    /// revision) before returning, so every read made through the
    /// transaction is serialized with all other mutators of that queue.
    async fn begin(&self, professor_id: &str) -> Result<Box<dyn LedgerTransaction>>;

    /// Find entry by ID (any status)
    async fn find_entry(&self, entry_id: &str) -> Result<Option<QueueEntry>>;

    /// Committed waiting set + revision, read consistently
    async fn load_snapshot(&self, professor_id: &str) -> Result<QueueSnapshot>;

    /// Newest committed revision of a professor's queue (0 if never written).
    ///
    /// Cheap enough to poll: the change feed uses it to notice commits made
    /// by other processes sharing the store.
    async fn latest_revision(&self, professor_id: &str) -> Result<Revision>;

    /// Count entries across all professors by status
    async fn count_by_status(&self, status: EntryStatus) -> Result<i64>;
}

/// Ledger operations within a per-professor transaction
#[async_trait]
pub trait LedgerTransaction: Transaction {
    /// Revision this transaction commits as
    fn revision(&self) -> Revision;

    /// Professor availability, read under the same lock (`None` if unknown)
    async fn availability(&mut self) -> Result<Option<Availability>>;

    /// Waiting entries ordered by position
    async fn waiting_entries(&mut self) -> Result<Vec<QueueEntry>>;

    /// Insert a waiting entry
    async fn insert(&mut self, entry: &QueueEntry) -> Result<()>;

    /// Take a waiting entry out of the waiting set.
    ///
    /// Returns `false` if no waiting entry with that id exists.
    async fn retire(&mut self, entry_id: &str, how: Retirement) -> Result<bool>;

    /// Decrement the position of every waiting entry after `position`
    /// in one batch step
    async fn shift_down_after(&mut self, position: i64) -> Result<u64>;

    /// Delete every waiting entry of this professor
    async fn retire_all_waiting(&mut self) -> Result<u64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::{Professor, ProfessorId};
    use crate::error::AppError;
    use crate::port::ProfessorRepository;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::{Mutex, OwnedMutexGuard};

    #[derive(Debug, Clone, Default)]
    struct MemoryState {
        professors: HashMap<ProfessorId, Professor>,
        entries: HashMap<String, QueueEntry>,
        revisions: HashMap<ProfessorId, Revision>,
    }

    impl MemoryState {
        fn waiting(&self, professor_id: &str) -> Vec<QueueEntry> {
            let mut waiting: Vec<QueueEntry> = self
                .entries
                .values()
                .filter(|e| e.professor_id == professor_id && e.is_waiting())
                .cloned()
                .collect();
            waiting.sort_by_key(|e| (e.position, e.joined_at));
            waiting
        }
    }

    /// In-memory store implementing both `LedgerStore` and
    /// `ProfessorRepository`.
    ///
    /// One global async mutex serializes transactions; each transaction
    /// works on a copy that replaces the shared state on commit.
    #[derive(Clone, Default)]
    pub struct InMemoryStore {
        state: Arc<Mutex<MemoryState>>,
        failing_commits: Arc<AtomicUsize>,
    }

    impl InMemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `n` commits fail with `TransientStore`
        pub fn fail_next_commits(&self, n: usize) {
            self.failing_commits.store(n, Ordering::SeqCst);
        }

        /// Overwrite a stored position without going through the ledger
        pub async fn corrupt_position(&self, entry_id: &str, position: i64) {
            let mut state = self.state.lock().await;
            if let Some(entry) = state.entries.get_mut(entry_id) {
                entry.position = Some(position);
            }
        }

        /// Number of stored entries (any status) for a professor
        pub async fn entry_count(&self, professor_id: &str) -> usize {
            let state = self.state.lock().await;
            state
                .entries
                .values()
                .filter(|e| e.professor_id == professor_id)
                .count()
        }
    }

    pub struct InMemoryTransaction {
        guard: OwnedMutexGuard<MemoryState>,
        working: MemoryState,
        professor_id: ProfessorId,
        revision: Revision,
        failing_commits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transaction for InMemoryTransaction {
        async fn commit(mut self: Box<Self>) -> Result<()> {
            let should_fail = self
                .failing_commits
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if should_fail {
                return Err(AppError::TransientStore(
                    "injected commit failure".to_string(),
                ));
            }
            let working = std::mem::take(&mut self.working);
            *self.guard = working;
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl LedgerTransaction for InMemoryTransaction {
        fn revision(&self) -> Revision {
            self.revision
        }

        async fn availability(&mut self) -> Result<Option<Availability>> {
            Ok(self
                .working
                .professors
                .get(&self.professor_id)
                .map(|p| p.availability))
        }

        async fn waiting_entries(&mut self) -> Result<Vec<QueueEntry>> {
            Ok(self.working.waiting(&self.professor_id))
        }

        async fn insert(&mut self, entry: &QueueEntry) -> Result<()> {
            let clash = self.working.entries.values().any(|e| {
                e.professor_id == entry.professor_id
                    && e.is_waiting()
                    && e.position == entry.position
            });
            if clash || self.working.entries.contains_key(&entry.id) {
                return Err(AppError::Conflict(format!(
                    "entry {} collides at position {:?}",
                    entry.id, entry.position
                )));
            }
            self.working
                .entries
                .insert(entry.id.clone(), entry.clone());
            Ok(())
        }

        async fn retire(&mut self, entry_id: &str, how: Retirement) -> Result<bool> {
            let owned = matches!(
                self.working.entries.get(entry_id),
                Some(e) if e.professor_id == self.professor_id && e.is_waiting()
            );
            if !owned {
                return Ok(false);
            }
            match how {
                Retirement::Left => {
                    self.working.entries.remove(entry_id);
                }
                Retirement::Called { at } => {
                    if let Some(entry) = self.working.entries.get_mut(entry_id) {
                        entry.mark_called(at);
                    }
                }
            }
            Ok(true)
        }

        async fn shift_down_after(&mut self, position: i64) -> Result<u64> {
            let mut shifted = 0;
            for entry in self.working.entries.values_mut() {
                if entry.professor_id != self.professor_id || !entry.is_waiting() {
                    continue;
                }
                if let Some(p) = entry.position.filter(|p| *p > position) {
                    entry.position = Some(p - 1);
                    shifted += 1;
                }
            }
            Ok(shifted)
        }

        async fn retire_all_waiting(&mut self) -> Result<u64> {
            let professor_id = self.professor_id.clone();
            let before = self.working.entries.len();
            self.working
                .entries
                .retain(|_, e| !(e.professor_id == professor_id && e.is_waiting()));
            Ok((before - self.working.entries.len()) as u64)
        }
    }

    #[async_trait]
    impl LedgerStore for InMemoryStore {
        async fn begin(&self, professor_id: &str) -> Result<Box<dyn LedgerTransaction>> {
            let guard = Arc::clone(&self.state).lock_owned().await;
            let mut working = guard.clone();
            let revision = {
                let rev = working
                    .revisions
                    .entry(professor_id.to_string())
                    .or_insert(0);
                *rev += 1;
                *rev
            };
            Ok(Box::new(InMemoryTransaction {
                guard,
                working,
                professor_id: professor_id.to_string(),
                revision,
                failing_commits: Arc::clone(&self.failing_commits),
            }))
        }

        async fn find_entry(&self, entry_id: &str) -> Result<Option<QueueEntry>> {
            Ok(self.state.lock().await.entries.get(entry_id).cloned())
        }

        async fn load_snapshot(&self, professor_id: &str) -> Result<QueueSnapshot> {
            let state = self.state.lock().await;
            let revision = state.revisions.get(professor_id).copied().unwrap_or(0);
            let waiting = state.waiting(professor_id);
            QueueSnapshot::from_sequence(professor_id, revision, &waiting)
                .map_err(|e| AppError::from(e).normalize())
        }

        async fn latest_revision(&self, professor_id: &str) -> Result<Revision> {
            let state = self.state.lock().await;
            Ok(state.revisions.get(professor_id).copied().unwrap_or(0))
        }

        async fn count_by_status(&self, status: EntryStatus) -> Result<i64> {
            let state = self.state.lock().await;
            Ok(state.entries.values().filter(|e| e.status == status).count() as i64)
        }
    }

    #[async_trait]
    impl ProfessorRepository for InMemoryStore {
        async fn insert(&self, professor: &Professor) -> Result<()> {
            let mut state = self.state.lock().await;
            if state
                .professors
                .values()
                .any(|p| p.email == professor.email || p.id == professor.id)
            {
                return Err(AppError::Conflict(format!(
                    "professor {} already registered",
                    professor.email
                )));
            }
            state
                .professors
                .insert(professor.id.clone(), professor.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &str) -> Result<Option<Professor>> {
            Ok(self.state.lock().await.professors.get(id).cloned())
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<Professor>> {
            let state = self.state.lock().await;
            Ok(state
                .professors
                .values()
                .find(|p| p.email == email)
                .cloned())
        }

        async fn update_availability(
            &self,
            id: &str,
            expected: Availability,
            next: Availability,
            now_millis: i64,
        ) -> Result<bool> {
            let mut state = self.state.lock().await;
            match state.professors.get_mut(id) {
                Some(p) if p.availability == expected => {
                    p.availability = next;
                    p.updated_at = now_millis;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn update_profile(&self, professor: &Professor) -> Result<()> {
            let mut state = self.state.lock().await;
            match state.professors.get_mut(&professor.id) {
                Some(p) => {
                    p.name = professor.name.clone();
                    p.office = professor.office.clone();
                    p.updated_at = professor.updated_at;
                    Ok(())
                }
                None => Err(AppError::NotFound(format!(
                    "Professor {} not found",
                    professor.id
                ))),
            }
        }

        async fn list_listed(&self) -> Result<Vec<Professor>> {
            let state = self.state.lock().await;
            let mut listed: Vec<Professor> = state
                .professors
                .values()
                .filter(|p| p.is_listed())
                .cloned()
                .collect();
            listed.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
            Ok(listed)
        }
    }
}
