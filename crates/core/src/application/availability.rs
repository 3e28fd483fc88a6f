// Professor Availability Tracker
//
// available <-> busy (toggle), available|busy -> ended (terminal).
// Decoupled from the ledger: none of these transitions touch the queue.

use crate::application::validation::{normalize_email, validate_display_name};
use crate::domain::{Availability, DomainError, Professor};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, ProfessorRepository, TimeProvider};
use std::sync::Arc;
use tracing::{debug, info};

/// Optimistic compare-and-set attempts before reporting a conflict
const MAX_TRANSITION_ATTEMPTS: usize = 3;

/// Login details captured by the professor-facing collaborator
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub office: Option<String>,
}

pub struct AvailabilityTracker {
    professors: Arc<dyn ProfessorRepository>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl AvailabilityTracker {
    pub fn new(
        professors: Arc<dyn ProfessorRepository>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            professors,
            id_provider,
            time_provider,
        }
    }

    /// Professor login: create on first login, otherwise return the existing
    /// record. A professor who ended office hours starts a new session.
    pub async fn register(&self, req: RegisterRequest) -> Result<Professor> {
        let name = validate_display_name("name", &req.name)?;
        let email = normalize_email(&req.email)?;
        let now = self.time_provider.now_millis();

        if let Some(existing) = self.professors.find_by_email(&email).await? {
            return self.resume(existing, &name, req.office, now).await;
        }

        let professor = Professor::new(self.id_provider.generate_id(), now, name, email, req.office);
        match self.professors.insert(&professor).await {
            Ok(()) => {
                info!(
                    professor_id = %professor.id,
                    office = %professor.office,
                    "Professor registered"
                );
                Ok(professor)
            }
            Err(AppError::Conflict(_)) => {
                // Lost a race with a concurrent first login for the same email
                let existing = self
                    .professors
                    .find_by_email(&professor.email)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "professor {} conflicted but is missing",
                            professor.email
                        ))
                    })?;
                Ok(existing)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, professor_id: &str) -> Result<Professor> {
        self.professors
            .find_by_id(professor_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Professor {} not found", professor_id)))
    }

    /// available <-> busy. No queue side effects.
    pub async fn toggle(&self, professor_id: &str) -> Result<Availability> {
        self.transition(professor_id, |prof, now| prof.toggle(now))
            .await
    }

    /// End office hours: hides the professor from the student listing and
    /// blocks new joins. Waiting entries are left untouched.
    pub async fn end_office_hours(&self, professor_id: &str) -> Result<Availability> {
        self.transition(professor_id, |prof, now| {
            prof.end(now);
            Ok(prof.availability)
        })
        .await
    }

    /// Student-visible listing (everyone not ended)
    pub async fn list_open(&self) -> Result<Vec<Professor>> {
        self.professors.list_listed().await
    }

    async fn resume(
        &self,
        mut existing: Professor,
        name: &str,
        office: Option<String>,
        now: i64,
    ) -> Result<Professor> {
        let office = office.map(|o| o.trim().to_string()).filter(|o| !o.is_empty());
        let profile_changed =
            existing.name != name || office.as_ref().is_some_and(|o| *o != existing.office);
        if profile_changed {
            existing.name = name.to_string();
            if let Some(office) = office {
                existing.office = office;
            }
            existing.updated_at = now;
            self.professors.update_profile(&existing).await?;
        }

        if existing.availability == Availability::Ended {
            let reopened = self
                .professors
                .update_availability(&existing.id, Availability::Ended, Availability::Available, now)
                .await?;
            if reopened {
                existing.reopen(now);
                info!(professor_id = %existing.id, "Office hours reopened on login");
            } else {
                existing = self.get(&existing.id).await?;
            }
        }

        debug!(professor_id = %existing.id, "Professor logged in");
        Ok(existing)
    }

    async fn transition<F>(&self, professor_id: &str, step: F) -> Result<Availability>
    where
        F: Fn(&mut Professor, i64) -> std::result::Result<Availability, DomainError>,
    {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let mut professor = self.get(professor_id).await?;
            let from = professor.availability;
            let now = self.time_provider.now_millis();
            let to = step(&mut professor, now)?;

            if from == to {
                return Ok(to);
            }
            if self
                .professors
                .update_availability(professor_id, from, to, now)
                .await?
            {
                info!(
                    professor_id = %professor_id,
                    from = %from,
                    to = %to,
                    "Availability changed"
                );
                return Ok(to);
            }
            debug!(professor_id = %professor_id, "Availability changed concurrently, retrying");
        }

        Err(AppError::Conflict(format!(
            "Availability of professor {} kept changing",
            professor_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::ledger_store::mocks::InMemoryStore;
    use crate::port::time_provider::mocks::ManualClock;

    fn tracker() -> (AvailabilityTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let tracker = AvailabilityTracker::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(SequentialIdProvider::new("prof")),
            clock.clone(),
        );
        (tracker, clock)
    }

    fn request(name: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            office: None,
        }
    }

    #[tokio::test]
    async fn test_register_is_idempotent_by_email() {
        let (tracker, _) = tracker();

        let first = tracker.register(request("Ada", "ada@uni.edu")).await.unwrap();
        let again = tracker
            .register(request("Ada", "  ADA@uni.edu "))
            .await
            .unwrap();

        assert_eq!(first.id, "prof-1");
        assert_eq!(again.id, first.id);
        assert_eq!(tracker.list_open().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_email() {
        let (tracker, _) = tracker();
        let err = tracker.register(request("Ada", "not-an-email")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_toggle_and_end() {
        let (tracker, clock) = tracker();
        let prof = tracker.register(request("Ada", "ada@uni.edu")).await.unwrap();

        assert_eq!(tracker.toggle(&prof.id).await.unwrap(), Availability::Busy);
        clock.advance(10);
        assert_eq!(tracker.toggle(&prof.id).await.unwrap(), Availability::Available);

        assert_eq!(
            tracker.end_office_hours(&prof.id).await.unwrap(),
            Availability::Ended
        );
        assert!(tracker.list_open().await.unwrap().is_empty());

        let err = tracker.toggle(&prof.id).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(DomainError::InvalidStateTransition { .. })));

        // Ending twice is harmless
        assert_eq!(
            tracker.end_office_hours(&prof.id).await.unwrap(),
            Availability::Ended
        );
    }

    #[tokio::test]
    async fn test_login_after_end_reopens() {
        let (tracker, _) = tracker();
        let prof = tracker.register(request("Ada", "ada@uni.edu")).await.unwrap();
        tracker.end_office_hours(&prof.id).await.unwrap();

        let again = tracker.register(request("Ada", "ada@uni.edu")).await.unwrap();
        assert_eq!(again.id, prof.id);
        assert_eq!(again.availability, Availability::Available);
        assert_eq!(tracker.list_open().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_login_updates_profile() {
        let (tracker, _) = tracker();
        tracker.register(request("Ada", "ada@uni.edu")).await.unwrap();

        let mut req = request("Ada Lovelace", "ada@uni.edu");
        req.office = Some("MSC 3106".to_string());
        let prof = tracker.register(req).await.unwrap();

        assert_eq!(prof.name, "Ada Lovelace");
        assert_eq!(prof.office, "MSC 3106");
        assert_eq!(tracker.get(&prof.id).await.unwrap().office, "MSC 3106");
    }

    #[tokio::test]
    async fn test_unknown_professor() {
        let (tracker, _) = tracker();
        assert!(matches!(
            tracker.toggle("ghost").await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
