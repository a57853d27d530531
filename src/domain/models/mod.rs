//! Domain models for optimization runs.

pub mod config;
pub mod evaluation;
pub mod params;
pub mod run_state;
pub mod suggestion;

pub use config::{
    AdvisorBackendKind, AdvisorConfig, Config, LoggingConfig, OptimizerConfig, StorageBackend,
    StorageConfig,
};
pub use evaluation::{Assignment, Candidate, Evaluation, Severity, Violation};
pub use params::{Algorithm, ConstraintName, GeneratorParams, ParamsDelta};
pub use run_state::{
    BestResult, IterationRecord, RunLogEntry, RunState, RunStatus, StopReason, BEST_SCORE_SENTINEL,
};
pub use suggestion::{Suggestion, SuggestionKind};
