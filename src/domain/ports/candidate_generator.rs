//! Candidate generator port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Candidate, GeneratorParams};

/// Produces candidate schedules for a parameter set.
///
/// Returning an empty list is a normal outcome; errors are reserved for
/// genuine failures of the underlying solver.
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    async fn generate_candidates(&self, params: &GeneratorParams, k: usize) -> DomainResult<Vec<Candidate>>;
}
