// Domain Layer - Pure business logic and entities

pub mod entry;
pub mod error;
pub mod professor;
pub mod snapshot;

// Re-exports
pub use entry::{EntryId, EntryStatus, QueueEntry, StudentInfo};
pub use error::DomainError;
pub use professor::{Availability, Professor, ProfessorId};
pub use snapshot::{QueueSnapshot, Revision, SnapshotEntry, StudentStatus, WAIT_MINUTES_PER_STUDENT};
