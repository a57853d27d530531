//! Domain errors for the schedule autopilot.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur while driving an optimization run.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Run {run_id} is already being driven by {holder}")]
    RunAlreadyActive { run_id: Uuid, holder: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Candidate generation failed: {0}")]
    GenerationFailed(String),

    #[error("Evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Parameter adaptation failed: {0}")]
    AdaptationFailed(String),

    #[error("Advisory backend unavailable: {0}")]
    AdvisoryUnavailable(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::StorageError(err.to_string())
    }
}
