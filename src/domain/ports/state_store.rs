//! State store port: the persistence boundary for optimization runs.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    BestResult, Candidate, Evaluation, GeneratorParams, IterationRecord, RunLogEntry, RunState,
};

/// Repository interface for run state, iteration history and final artifacts.
///
/// The store is the only component allowed to persist or reload a run. Per
/// run it keeps a state snapshot, an append-only iteration history, a
/// free-text operational log and, once the run stops, the best schedule and
/// its evaluation report. Resuming needs only the snapshot.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Allocate a fresh run with a new identity and `status = running`.
    #[allow(clippy::too_many_arguments)]
    async fn create_run(
        &self,
        scenario: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        max_iterations: u32,
        target_score: f64,
        initial_params: &GeneratorParams,
    ) -> DomainResult<RunState> {
        let state = RunState::new(
            scenario,
            start_date,
            end_date,
            max_iterations,
            target_score,
            initial_params.clone(),
        );
        self.save_state(&state).await?;
        Ok(state)
    }

    /// Load the latest checkpointed state of a run.
    async fn load_run(&self, run_id: Uuid) -> DomainResult<Option<RunState>>;

    /// Checkpoint the run state. Saving the same state twice is harmless.
    async fn save_state(&self, state: &RunState) -> DomainResult<()>;

    /// Append one record to the run's history.
    ///
    /// Records must arrive in strictly increasing `iteration` order; an
    /// out-of-order or repeated index is rejected rather than overwriting
    /// what is already stored.
    async fn append_iteration(&self, state: &RunState, record: &IterationRecord) -> DomainResult<()>;

    /// Drop every history record after `iteration`, returning how many went.
    ///
    /// Used on resume so history never runs ahead of the snapshot: records
    /// appended after the last checkpoint of a crashed session are replayed.
    async fn truncate_history(&self, run_id: Uuid, iteration: u32) -> DomainResult<usize>;

    /// History in ascending iteration order. With a limit, only the most
    /// recent `limit` records are returned.
    async fn load_history(&self, run_id: Uuid, limit: Option<usize>) -> DomainResult<Vec<IterationRecord>>;

    /// Append a line of operational narration.
    async fn log(&self, state: &RunState, message: &str) -> DomainResult<()>;

    /// Read back the operational narration, oldest first.
    async fn load_log(&self, run_id: Uuid) -> DomainResult<Vec<RunLogEntry>>;

    /// Persist the best candidate's assignments.
    async fn save_schedule(&self, state: &RunState, candidate: &Candidate) -> DomainResult<()>;

    /// Persist the evaluation report of the best candidate.
    async fn save_report(&self, state: &RunState, evaluation: &Evaluation) -> DomainResult<()>;

    /// Best candidate and report saved by a previous session, if both exist.
    async fn load_best(&self, run_id: Uuid) -> DomainResult<Option<BestResult>>;

    /// Most recently updated runs first.
    async fn list_runs(&self, limit: usize) -> DomainResult<Vec<RunState>>;

    /// Claim exclusive write access to a run for `ttl`.
    ///
    /// Fails with `RunAlreadyActive` when another holder owns an unexpired
    /// lease. Re-acquiring as the current holder renews the lease, and a
    /// lease whose holder stopped renewing it is taken over.
    async fn acquire_lease(&self, run_id: Uuid, holder: &str, ttl: Duration) -> DomainResult<()>;

    /// Give up write access. A no-op when `holder` does not own the lease.
    async fn release_lease(&self, run_id: Uuid, holder: &str) -> DomainResult<()>;
}
