//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use queueup_core::application::LeaveOutcome;
use queueup_core::domain::{Availability, Professor, QueueEntry, StudentStatus};
use serde::{Deserialize, Serialize};

/// queue.join.v1 - Join a professor's queue
#[derive(Debug, Deserialize)]
pub struct JoinParams {
    pub professor_id: String,
    pub student_name: String,
    pub student_contact: String,
}

/// queue.leave.v1 - Leave a queue by entry id
#[derive(Debug, Deserialize)]
pub struct LeaveParams {
    pub entry_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaveResponse {
    pub entry_id: String,
    pub outcome: LeaveOutcome,
}

/// Parameters for every per-professor queue method
/// (call_next, clear, snapshot, subscribe)
#[derive(Debug, Deserialize)]
pub struct QueueParams {
    pub professor_id: String,
}

/// queue.call_next.v1
#[derive(Debug, Clone, Serialize)]
pub struct CallNextResponse {
    pub professor_id: String,
    /// `None` when the queue was empty
    pub called: Option<CalledStudent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalledStudent {
    pub entry_id: String,
    pub student_name: String,
    pub student_contact: String,
    pub joined_at: i64,
    pub called_at: Option<i64>,
}

impl From<QueueEntry> for CalledStudent {
    fn from(entry: QueueEntry) -> Self {
        Self {
            entry_id: entry.id,
            student_name: entry.student_name,
            student_contact: entry.student_contact,
            joined_at: entry.joined_at,
            called_at: entry.called_at,
        }
    }
}

/// queue.clear.v1
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub professor_id: String,
    pub removed: u64,
}

/// queue.status.v1 - Where a student stands
#[derive(Debug, Deserialize)]
pub struct StatusParams {
    pub entry_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub entry_id: String,
    pub status: StudentStatus,
}

/// professor.register.v1 - Professor login
#[derive(Debug, Deserialize)]
pub struct RegisterParams {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub office: Option<String>,
}

/// Parameters for professor.toggle.v1 / professor.end.v1
#[derive(Debug, Deserialize)]
pub struct ProfessorParams {
    pub professor_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityResponse {
    pub professor_id: String,
    pub availability: Availability,
}

/// professor.list.v1 - Student-visible listing
#[derive(Debug, Default, Deserialize)]
pub struct ListProfessorsParams {}

#[derive(Debug, Clone, Serialize)]
pub struct ProfessorSummary {
    pub id: String,
    pub name: String,
    pub office: String,
    pub availability: Availability,
    pub queue_length: usize,
}

impl ProfessorSummary {
    pub fn new(professor: Professor, queue_length: usize) -> Self {
        Self {
            id: professor.id,
            name: professor.name,
            office: professor.office,
            availability: professor.availability,
            queue_length,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListProfessorsResponse {
    pub professors: Vec<ProfessorSummary>,
}

/// admin.stats.v1 - Get system statistics
#[derive(Debug, Default, Deserialize)]
pub struct StatsRequest {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub open_professors: usize,
    pub waiting_entries: i64,
    pub called_entries: i64,
    pub uptime_seconds: i64,
}
