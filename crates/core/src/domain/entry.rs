// Queue Entry Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::professor::ProfessorId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Entry ID (UUID v4), held by the student for the lifetime of the wait
pub type EntryId = String;

/// Entry Status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Waiting,
    Called,
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryStatus::Waiting => write!(f, "WAITING"),
            EntryStatus::Called => write!(f, "CALLED"),
        }
    }
}

impl FromStr for EntryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "WAITING" => Ok(EntryStatus::Waiting),
            "CALLED" => Ok(EntryStatus::Called),
            other => Err(DomainError::UnknownVariant {
                kind: "entry status",
                value: other.to_string(),
            }),
        }
    }
}

/// What a student submits when joining
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentInfo {
    pub name: String,
    pub contact: String,
}

impl StudentInfo {
    pub fn new(name: impl Into<String>, contact: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contact: contact.into(),
        }
    }
}

/// Queue Entry Entity
///
/// `position` is owned by the ledger: it is `Some(1..=N)` while waiting and
/// `None` once the entry has been called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,
    pub professor_id: ProfessorId,
    pub student_name: String,
    pub student_contact: String,
    pub position: Option<i64>,
    pub status: EntryStatus,
    pub joined_at: i64, // epoch ms, server-assigned
    pub called_at: Option<i64>,
}

impl QueueEntry {
    /// Create a waiting entry at the given ledger-derived position
    pub fn new_waiting(
        id: impl Into<String>,
        professor_id: impl Into<String>,
        student: StudentInfo,
        position: i64,
        joined_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            professor_id: professor_id.into(),
            student_name: student.name,
            student_contact: student.contact,
            position: Some(position),
            status: EntryStatus::Waiting,
            joined_at,
            called_at: None,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.status == EntryStatus::Waiting
    }

    /// Mark as called by the professor. A called entry never waits again.
    pub fn mark_called(&mut self, now_millis: i64) {
        self.status = EntryStatus::Called;
        self.position = None;
        self.called_at = Some(now_millis);
    }
}
