// Queue Snapshot - the value delivered through the change feed

use crate::domain::entry::{EntryId, QueueEntry};
use crate::domain::error::{DomainError, Result};
use crate::domain::professor::ProfessorId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Per-professor commit counter (bumped by every mutating transaction)
pub type Revision = u64;

/// Rough per-student wait used for estimates shown to students
pub const WAIT_MINUTES_PER_STUDENT: i64 = 5;

/// One waiting entry as seen by observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub id: EntryId,
    pub student_name: String,
    pub position: i64,
    pub joined_at: i64,
}

/// Full ordered waiting list of one professor at one revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub professor_id: ProfessorId,
    pub revision: Revision,
    pub entries: Vec<SnapshotEntry>,
}

/// A student's view of their own entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StudentStatus {
    Waiting {
        position: i64,
        queue_length: usize,
        estimated_wait_minutes: i64,
        is_next: bool,
    },
    /// No longer in the waiting set: called by the professor or removed
    Served,
}

impl QueueSnapshot {
    /// Empty queue at revision 0 (professor never had a mutation)
    pub fn empty(professor_id: impl Into<String>) -> Self {
        Self {
            professor_id: professor_id.into(),
            revision: 0,
            entries: Vec::new(),
        }
    }

    /// Build from a verified, position-ordered waiting sequence
    pub fn from_sequence(
        professor_id: impl Into<String>,
        revision: Revision,
        sequence: &[QueueEntry],
    ) -> Result<Self> {
        verify_sequence(sequence)?;
        Ok(Self {
            professor_id: professor_id.into(),
            revision,
            entries: sequence
                .iter()
                .map(|e| SnapshotEntry {
                    id: e.id.clone(),
                    student_name: e.student_name.clone(),
                    position: e.position.unwrap_or_default(),
                    joined_at: e.joined_at,
                })
                .collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at position 1
    pub fn head(&self) -> Option<&SnapshotEntry> {
        self.entries.first()
    }

    pub fn position_of(&self, entry_id: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|e| e.id == entry_id)
            .map(|e| e.position)
    }

    /// Correlate an entry id against this snapshot
    pub fn status_of(&self, entry_id: &str) -> StudentStatus {
        match self.position_of(entry_id) {
            Some(position) => StudentStatus::Waiting {
                position,
                queue_length: self.len(),
                estimated_wait_minutes: estimated_wait_minutes(position),
                is_next: position == 1,
            },
            None => StudentStatus::Served,
        }
    }

    /// Positions form exactly `1..=N` in list order
    pub fn is_dense(&self) -> bool {
        self.entries
            .iter()
            .enumerate()
            .all(|(i, e)| e.position == i as i64 + 1)
    }
}

/// Estimated wait shown to a student at `position`
pub fn estimated_wait_minutes(position: i64) -> i64 {
    position.max(0) * WAIT_MINUTES_PER_STUDENT
}

/// Check the per-professor queue invariants on a position-ordered sequence.
///
/// - every entry is waiting and belongs to the same professor
/// - positions are exactly `1..=N` with no gaps or duplicates
/// - arrival order is preserved (`joined_at` non-decreasing)
/// - entry ids are unique
pub fn verify_sequence(sequence: &[QueueEntry]) -> Result<()> {
    let mut seen = HashSet::with_capacity(sequence.len());
    let mut last_joined = i64::MIN;
    let professor_id = sequence.first().map(|e| e.professor_id.as_str());

    for (index, entry) in sequence.iter().enumerate() {
        let expected = index as i64 + 1;

        if !entry.is_waiting() {
            return Err(DomainError::InvariantViolation(format!(
                "entry {} in waiting set has status {}",
                entry.id, entry.status
            )));
        }
        if Some(entry.professor_id.as_str()) != professor_id {
            return Err(DomainError::InvariantViolation(format!(
                "entry {} belongs to professor {}",
                entry.id, entry.professor_id
            )));
        }
        if entry.position != Some(expected) {
            return Err(DomainError::InvariantViolation(format!(
                "entry {} at position {:?}, expected {}",
                entry.id, entry.position, expected
            )));
        }
        if entry.joined_at < last_joined {
            return Err(DomainError::InvariantViolation(format!(
                "entry {} joined at {} before its predecessor ({})",
                entry.id, entry.joined_at, last_joined
            )));
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(DomainError::InvariantViolation(format!(
                "entry {} appears twice",
                entry.id
            )));
        }
        last_joined = entry.joined_at;
    }

    Ok(())
}
