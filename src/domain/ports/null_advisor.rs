//! Null advisor implementation.
//!
//! Used when no advisory backend is configured.

use async_trait::async_trait;

use crate::domain::models::{Evaluation, IterationRecord, RunState, Suggestion};
use super::Advisor;

/// An advisor that never suggests anything.
#[derive(Debug, Clone, Default)]
pub struct NullAdvisor;

impl NullAdvisor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Advisor for NullAdvisor {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn suggest(
        &self,
        _state: &RunState,
        _last_evaluation: &Evaluation,
        _history: &[IterationRecord],
    ) -> Option<Suggestion> {
        None
    }

    async fn explain(&self, evaluation: &Evaluation) -> String {
        evaluation.summary()
    }
}
