// Join Use Case

use crate::application::ledger::{LedgerCommit, PositionLedger};
use crate::application::validation::{normalize_email, validate_display_name};
use crate::domain::snapshot::estimated_wait_minutes;
use crate::domain::{QueueEntry, StudentInfo};
use crate::error::Result;
use crate::port::{IdProvider, TimeProvider};
use serde::{Deserialize, Serialize};

/// Join request as submitted by the student-facing collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub student_name: String,
    pub student_contact: String,
}

/// What the student keeps for the lifetime of the wait
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinReceipt {
    pub entry_id: String,
    pub professor_id: String,
    pub position: i64,
    pub estimated_wait_minutes: i64,
}

/// Validate the request into the stored student identity
pub fn validate_request(req: &JoinRequest) -> Result<StudentInfo> {
    let name = validate_display_name("student name", &req.student_name)?;
    let contact = normalize_email(&req.student_contact)?;
    Ok(StudentInfo::new(name, contact))
}

/// Execute join use case (single ledger transaction)
///
/// # Arguments
///
/// * `ledger` - Position ledger (owns position assignment)
/// * `id_provider` - ID generator (injected for determinism)
/// * `time_provider` - Time provider (injected for determinism)
/// * `professor_id` - Queue to join
/// * `req` - Join request
pub async fn execute(
    ledger: &PositionLedger,
    id_provider: &dyn IdProvider,
    time_provider: &dyn TimeProvider,
    professor_id: &str,
    req: JoinRequest,
) -> Result<LedgerCommit<QueueEntry>> {
    let student = validate_request(&req)?;
    let entry_id = id_provider.generate_id();
    let now = time_provider.now_millis();

    ledger.append(professor_id, entry_id, student, now).await
}

impl JoinReceipt {
    pub fn from_entry(entry: &QueueEntry) -> Self {
        let position = entry.position.unwrap_or_default();
        Self {
            entry_id: entry.id.clone(),
            professor_id: entry.professor_id.clone(),
            position,
            estimated_wait_minutes: estimated_wait_minutes(position),
        }
    }
}
