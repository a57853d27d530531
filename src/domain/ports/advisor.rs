//! Advisor port - optional advisory input to the search.

use async_trait::async_trait;

use crate::domain::models::{Evaluation, IterationRecord, RunState, Suggestion};

/// Capability interface for advisory suggestions.
///
/// An advisor can only propose; the loop validates every suggestion before
/// acting on it. Neither method can fail: any internal problem surfaces as
/// "no suggestion" or as a template explanation.
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Advisor name used in logs.
    fn name(&self) -> &'static str;

    /// Propose a change for the next iteration, or nothing.
    async fn suggest(
        &self,
        state: &RunState,
        last_evaluation: &Evaluation,
        history: &[IterationRecord],
    ) -> Option<Suggestion>;

    /// Human-readable explanation of an evaluation. Never feeds back into the search.
    async fn explain(&self, evaluation: &Evaluation) -> String;
}
