// SQLite row representations

use queueup_core::domain::{Availability, EntryStatus, Professor, QueueEntry};
use queueup_core::error::{AppError, Result};
use std::str::FromStr;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EntryRow {
    id: String,
    professor_id: String,
    student_name: String,
    student_contact: String,
    position: Option<i64>,
    status: String,
    joined_at: i64,
    called_at: Option<i64>,
}

impl EntryRow {
    pub(crate) fn into_entry(self) -> Result<QueueEntry> {
        // A row we cannot read back is corrupted ledger state
        let status = EntryStatus::from_str(&self.status)
            .map_err(|e| AppError::InvariantViolation(format!("entry {}: {}", self.id, e)))?;

        Ok(QueueEntry {
            id: self.id,
            professor_id: self.professor_id,
            student_name: self.student_name,
            student_contact: self.student_contact,
            position: self.position,
            status,
            joined_at: self.joined_at,
            called_at: self.called_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProfessorRow {
    id: String,
    name: String,
    email: String,
    office: String,
    availability: String,
    created_at: i64,
    updated_at: i64,
}

impl ProfessorRow {
    pub(crate) fn into_professor(self) -> Result<Professor> {
        let availability = Availability::from_str(&self.availability)?;
        Ok(Professor {
            id: self.id,
            name: self.name,
            email: self.email,
            office: self.office,
            availability,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) fn parse_availability(raw: &str) -> Result<Availability> {
    Ok(Availability::from_str(raw)?)
}

pub(crate) const ENTRY_COLUMNS: &str =
    "id, professor_id, student_name, student_contact, position, status, joined_at, called_at";
