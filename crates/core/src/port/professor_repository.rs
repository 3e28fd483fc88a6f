// Professor Repository Port (Interface)

use crate::domain::{Availability, Professor};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for Professor persistence
#[async_trait]
pub trait ProfessorRepository: Send + Sync {
    /// Insert a new professor. Fails with `Conflict` if the email is taken.
    async fn insert(&self, professor: &Professor) -> Result<()>;

    /// Find professor by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<Professor>>;

    /// Find professor by login email
    async fn find_by_email(&self, email: &str) -> Result<Option<Professor>>;

    /// Conditionally move availability `expected -> next`.
    ///
    /// Returns `false` without writing when the stored availability is no
    /// longer `expected` (concurrent change) or the professor is missing.
    async fn update_availability(
        &self,
        id: &str,
        expected: Availability,
        next: Availability,
        now_millis: i64,
    ) -> Result<bool>;

    /// Update display name and office (profile refresh on login)
    async fn update_profile(&self, professor: &Professor) -> Result<()>;

    /// Student-visible listing: every professor not `ended`, sorted by name
    async fn list_listed(&self) -> Result<Vec<Professor>>;
}
