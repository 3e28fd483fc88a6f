// Professor Domain Model + Availability state machine

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Professor ID (UUID v4)
pub type ProfessorId = String;

/// Office location used when the professor leaves it blank
pub const DEFAULT_OFFICE: &str = "Not specified";

/// Availability shown on the dashboard and the student listing.
///
/// `available <-> busy` is a professor-driven toggle with no queue side
/// effects. `ended` is terminal for the current office-hours session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Availability {
    Available,
    Busy,
    Ended,
}

impl Availability {
    /// Whether students may still join the queue
    pub fn accepts_joins(self) -> bool {
        !matches!(self, Availability::Ended)
    }
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Availability::Available => write!(f, "AVAILABLE"),
            Availability::Busy => write!(f, "BUSY"),
            Availability::Ended => write!(f, "ENDED"),
        }
    }
}

impl FromStr for Availability {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AVAILABLE" => Ok(Availability::Available),
            "BUSY" => Ok(Availability::Busy),
            "ENDED" => Ok(Availability::Ended),
            other => Err(DomainError::UnknownVariant {
                kind: "availability",
                value: other.to_string(),
            }),
        }
    }
}

/// Professor Entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Professor {
    pub id: ProfessorId,
    pub name: String,
    pub email: String,
    pub office: String,
    pub availability: Availability,
    pub created_at: i64, // epoch ms
    pub updated_at: i64, // epoch ms
}

impl Professor {
    /// Create a new professor at first login
    ///
    /// `id` and `now_millis` are injected (IdProvider / TimeProvider).
    /// A blank office falls back to [`DEFAULT_OFFICE`].
    pub fn new(
        id: impl Into<String>,
        now_millis: i64,
        name: impl Into<String>,
        email: impl Into<String>,
        office: Option<String>,
    ) -> Self {
        let office = office
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| DEFAULT_OFFICE.to_string());

        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            office,
            availability: Availability::Available,
            created_at: now_millis,
            updated_at: now_millis,
        }
    }

    /// Flip between available and busy
    pub fn toggle(&mut self, now_millis: i64) -> Result<Availability> {
        let next = match self.availability {
            Availability::Available => Availability::Busy,
            Availability::Busy => Availability::Available,
            Availability::Ended => {
                return Err(DomainError::InvalidStateTransition {
                    from: self.availability.to_string(),
                    to: "AVAILABLE|BUSY".to_string(),
                })
            }
        };
        self.availability = next;
        self.updated_at = now_millis;
        Ok(next)
    }

    /// End office hours. Idempotent; does not touch the queue.
    pub fn end(&mut self, now_millis: i64) {
        if self.availability != Availability::Ended {
            self.availability = Availability::Ended;
            self.updated_at = now_millis;
        }
    }

    /// Start a new session after a re-login
    pub fn reopen(&mut self, now_millis: i64) {
        if self.availability == Availability::Ended {
            self.availability = Availability::Available;
            self.updated_at = now_millis;
        }
    }

    /// Visible in the student-facing professor listing
    pub fn is_listed(&self) -> bool {
        self.availability != Availability::Ended
    }
}
