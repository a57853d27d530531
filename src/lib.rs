//! Schedule Autopilot - autonomous optimization loop for residency schedules
//!
//! Drives an iterative search for ACGME-compliant schedules: generate
//! candidates, evaluate them, keep the best, adapt the generator parameters,
//! and stop on a target score, an iteration budget, stagnation, a time limit
//! or an abort. Runs are checkpointed so they can be resumed, and an optional
//! language-model advisor can propose parameter changes that are validated
//! before use.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): run state, parameters, evaluations and the port traits
//! - **Application Layer** (`application`): the autonomous loop
//! - **Service Layer** (`services`): advisor, suggestion validation, reference adapter
//! - **Adapters** (`adapters`): SQLite and file state stores, advisory backends
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, wiring
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use schedule_autopilot::{
//!     AutonomousLoop, ConfigLoader, LoopConfig, LoopDependencies, NewRun, RuleBasedAdapter,
//! };
//! use schedule_autopilot::infrastructure::{build_advisor, build_state_store};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load()?;
//!     let store = build_state_store(&config.storage).await?;
//!     let advisor = build_advisor(&config.advisor, config.optimizer.history_window)?;
//!
//!     let deps = LoopDependencies::new(my_generator(), my_evaluator(), Arc::new(RuleBasedAdapter::default()), store)
//!         .with_advisor(advisor);
//!     let run = NewRun { scenario: "block-10".into(), start_date, end_date, initial_params: config.initial_params.clone() };
//!
//!     let result = AutonomousLoop::start(deps, LoopConfig::from(&config.optimizer), run).await?.run().await;
//!     println!("{} after {} iterations", result.stop_reason, result.final_iteration);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{
    AbortHandle, AutonomousLoop, LoopConfig, LoopDependencies, LoopResult, NewRun,
};
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Algorithm, Assignment, BestResult, Candidate, Config, ConstraintName, Evaluation,
    GeneratorParams, IterationRecord, ParamsDelta, RunState, RunStatus, Severity, StopReason,
    Suggestion, SuggestionKind, Violation,
};
pub use domain::ports::{
    Advisor, AdvisoryBackend, CandidateGenerator, NullAdvisor, ParameterAdapter,
    ScheduleEvaluator, StateStore,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{LlmAdvisor, RuleBasedAdapter};
