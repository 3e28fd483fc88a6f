// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Benign race: the target is already gone. Absorbed by the
    /// coordinator wherever the desired end state already holds.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Professor unavailable: {0}")]
    ProfessorUnavailable(String),

    /// Storage unavailable / busy. Surfaced verbatim, never retried here.
    #[error("Store unavailable: {0}")]
    TransientStore(String),

    /// Defect: the ledger observed a state breaking the queue invariants.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// The caller may retry the same request later
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientStore(_))
    }

    /// Collapse domain invariant failures into the top-level variant
    pub fn normalize(self) -> Self {
        match self {
            AppError::Domain(crate::domain::DomainError::InvariantViolation(msg)) => {
                AppError::InvariantViolation(msg)
            }
            other => other,
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in infra-sqlite crate
// by mapping to AppError::TransientStore / AppError::InvariantViolation
