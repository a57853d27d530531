//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces the optimization loop consumes:
//! - StateStore: persistence of run state, history and artifacts
//! - CandidateGenerator / ScheduleEvaluator / ParameterAdapter: search collaborators
//! - Advisor / AdvisoryBackend: optional, untrusted advisory input

pub mod advisor;
pub mod advisory_backend;
pub mod candidate_generator;
pub mod null_advisor;
pub mod parameter_adapter;
pub mod schedule_evaluator;
pub mod state_store;

pub use advisor::Advisor;
pub use advisory_backend::{AdvisoryBackend, AdvisoryRequest};
pub use candidate_generator::CandidateGenerator;
pub use null_advisor::NullAdvisor;
pub use parameter_adapter::ParameterAdapter;
pub use schedule_evaluator::ScheduleEvaluator;
pub use state_store::StateStore;
