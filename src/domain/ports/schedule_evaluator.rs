//! Schedule evaluator port.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Candidate, Evaluation};

/// Scores a candidate against compliance rules over the scheduling horizon.
#[async_trait]
pub trait ScheduleEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        candidate: &Candidate,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> DomainResult<Evaluation>;
}
