//! Parameter adapter port.

use crate::domain::errors::DomainResult;
use crate::domain::models::{Evaluation, GeneratorParams, IterationRecord};

/// Proposes the next iteration's parameters.
///
/// Implementations must be pure functions of their inputs: replaying the same
/// history has to reproduce the same parameter trajectory, which is what makes
/// a resumed run continue exactly where it stopped.
pub trait ParameterAdapter: Send + Sync {
    fn adapt(
        &self,
        current: &GeneratorParams,
        evaluation: &Evaluation,
        history: &[IterationRecord],
    ) -> DomainResult<GeneratorParams>;
}
