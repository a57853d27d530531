//! Autonomous optimization loop.
//!
//! Drives one run: check stop conditions, generate and score candidates, fold
//! the best of them into the run state, record history, pick the next
//! parameters. Exactly one terminal [`StopReason`] is produced per run and the
//! final state is always persisted.

use chrono::NaiveDate;
use futures::future::try_join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    BestResult, Candidate, Evaluation, GeneratorParams, IterationRecord, OptimizerConfig,
    RunState, StopReason,
};
use crate::domain::ports::{
    Advisor, CandidateGenerator, NullAdvisor, ParameterAdapter, ScheduleEvaluator, StateStore,
};
use crate::services::suggestion_schema::{
    apply_params_delta, validate_generator_params, validate_suggestion,
};

/// Loop configuration.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Iteration budget for new runs. Resumed runs keep their own.
    pub max_iterations: u32,
    /// Target score for new runs. Resumed runs keep their own.
    pub target_score: f64,
    /// Non-improving iterations tolerated before stopping (0 disables).
    pub stagnation_limit: u32,
    /// Wall-clock budget for one `run()` call.
    pub time_limit: Option<Duration>,
    /// Candidates requested per iteration (k).
    pub candidates_per_iteration: usize,
    /// Checkpoint every N iterations.
    pub checkpoint_interval: u32,
    /// Progress log every N iterations.
    pub log_interval: u32,
    /// Records handed to the adapter and advisor.
    pub history_window: usize,
    /// Consult the advisor every N iterations (0 never).
    pub advisor_interval: u32,
    /// Validity of the run lease, renewed every iteration.
    pub lease_ttl: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from(&OptimizerConfig::default())
    }
}

impl From<&OptimizerConfig> for LoopConfig {
    fn from(config: &OptimizerConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            target_score: config.target_score,
            stagnation_limit: config.stagnation_limit,
            time_limit: config.time_limit_seconds.map(Duration::from_secs),
            candidates_per_iteration: config.candidates_per_iteration,
            checkpoint_interval: config.checkpoint_interval,
            log_interval: config.log_interval,
            history_window: config.history_window,
            advisor_interval: config.advisor_interval,
            lease_ttl: Duration::from_secs(config.lease_ttl_seconds),
        }
    }
}

/// The scheduling problem a fresh run optimizes.
#[derive(Debug, Clone)]
pub struct NewRun {
    /// Scenario label passed through to the generator and reports.
    pub scenario: String,
    /// First day of the scheduling horizon.
    pub start_date: NaiveDate,
    /// Last day of the scheduling horizon, inclusive.
    pub end_date: NaiveDate,
    /// Parameters of the first iteration.
    pub initial_params: GeneratorParams,
}

/// Collaborators the loop drives.
#[derive(Clone)]
pub struct LoopDependencies {
    /// Produces candidate schedules.
    pub generator: Arc<dyn CandidateGenerator>,
    /// Scores candidates.
    pub evaluator: Arc<dyn ScheduleEvaluator>,
    /// Proposes the next iteration's parameters.
    pub adapter: Arc<dyn ParameterAdapter>,
    /// Where the run is persisted.
    pub store: Arc<dyn StateStore>,
    /// Optional advice; [`NullAdvisor`] when none is configured.
    pub advisor: Arc<dyn Advisor>,
}

impl LoopDependencies {
    /// Dependencies with no advisor.
    pub fn new(
        generator: Arc<dyn CandidateGenerator>,
        evaluator: Arc<dyn ScheduleEvaluator>,
        adapter: Arc<dyn ParameterAdapter>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            generator,
            evaluator,
            adapter,
            store,
            advisor: Arc::new(NullAdvisor),
        }
    }

    /// Replace the advisor.
    pub fn with_advisor(mut self, advisor: Arc<dyn Advisor>) -> Self {
        self.advisor = advisor;
        self
    }
}

/// Cooperative abort flag shared with a running loop.
///
/// Observed only at the top of a loop pass; an in-flight iteration always
/// completes.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    requested: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Ask the loop to stop with `UserAbort`.
    pub fn abort(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Whether an abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Outcome of a run.
#[derive(Debug, Clone)]
pub struct LoopResult {
    pub run_id: Uuid,
    /// The single terminal reason of this session.
    pub stop_reason: StopReason,
    /// Best score reached, 0.0 when nothing was ever scored.
    pub final_score: f64,
    /// Iterations completed over the whole run, including earlier sessions.
    pub final_iteration: u32,
    /// Best-ever candidate and its evaluation, if anything was scored.
    pub best_candidate: Option<Candidate>,
    pub best_evaluation: Option<Evaluation>,
    /// Wall-clock time of this session.
    pub elapsed: Duration,
    /// Fatal error message when `stop_reason` is `Error`.
    pub error: Option<String>,
}

impl LoopResult {
    /// True only when the target score was reached.
    pub fn succeeded(&self) -> bool {
        self.stop_reason == StopReason::TargetReached
    }
}

/// Drives one optimization run to a terminal stop reason.
pub struct AutonomousLoop {
    deps: LoopDependencies,
    config: LoopConfig,
    state: RunState,
    best: Option<BestResult>,
    /// Best changed since it was last written to the store.
    best_unsaved: bool,
    abort: AbortHandle,
    lease_holder: String,
}

impl AutonomousLoop {
    /// Create a fresh run and take its write lease.
    pub async fn start(deps: LoopDependencies, config: LoopConfig, run: NewRun) -> DomainResult<Self> {
        validate_generator_params(&run.initial_params)?;

        let state = deps
            .store
            .create_run(
                &run.scenario,
                run.start_date,
                run.end_date,
                config.max_iterations,
                config.target_score,
                &run.initial_params,
            )
            .await?;

        let lease_holder = Self::new_lease_holder();
        deps.store
            .acquire_lease(state.run_id, &lease_holder, config.lease_ttl)
            .await?;

        info!(run_id = %state.run_id, scenario = %state.scenario, "Created optimization run");
        Ok(Self::assemble(deps, config, state, None, lease_holder))
    }

    /// Reload a checkpointed run and take its write lease.
    ///
    /// History recorded after the checkpoint by a session that died is
    /// discarded, so those iterations run again from the snapshot.
    ///
    /// Fails with `RunNotFound` for an unknown run and with
    /// `RunAlreadyActive` while another loop holds an unexpired lease.
    pub async fn resume(deps: LoopDependencies, config: LoopConfig, run_id: Uuid) -> DomainResult<Self> {
        let mut state = deps
            .store
            .load_run(run_id)
            .await?
            .ok_or(DomainError::RunNotFound(run_id))?;

        let lease_holder = Self::new_lease_holder();
        deps.store
            .acquire_lease(run_id, &lease_holder, config.lease_ttl)
            .await?;

        let best = match Self::reconcile(&deps, &state).await {
            Ok(best) => best,
            Err(e) => {
                // The loop never starts; give the lease back.
                if let Err(release) = deps.store.release_lease(run_id, &lease_holder).await {
                    warn!(error = %release, "Failed to release run lease");
                }
                return Err(e);
            }
        };

        state.reopen();
        info!(
            run_id = %run_id,
            iteration = state.current_iteration,
            best_score = state.best_score,
            "Resuming optimization run"
        );
        Ok(Self::assemble(deps, config, state, best, lease_holder))
    }

    /// Bring history back in line with the snapshot and load the saved best.
    async fn reconcile(deps: &LoopDependencies, state: &RunState) -> DomainResult<Option<BestResult>> {
        let discarded = deps
            .store
            .truncate_history(state.run_id, state.current_iteration)
            .await?;
        if discarded > 0 {
            warn!(
                run_id = %state.run_id,
                checkpoint = state.current_iteration,
                discarded,
                "Discarded iterations recorded after the last checkpoint"
            );
        }

        deps.store.load_best(state.run_id).await
    }

    fn assemble(
        deps: LoopDependencies,
        config: LoopConfig,
        state: RunState,
        best: Option<BestResult>,
        lease_holder: String,
    ) -> Self {
        Self {
            deps,
            config,
            state,
            best,
            best_unsaved: false,
            abort: AbortHandle::default(),
            lease_holder,
        }
    }

    fn new_lease_holder() -> String {
        format!("loop-{}-{}", std::process::id(), Uuid::new_v4())
    }

    /// Identity of the run being driven.
    pub fn run_id(&self) -> Uuid {
        self.state.run_id
    }

    /// Current in-memory state, ahead of the last checkpoint.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Handle that can request an abort while `run()` is in progress.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Request a stop at the next stop-condition check.
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Run until a stop condition fires, then persist the final state.
    pub async fn run(mut self) -> LoopResult {
        let span = info_span!("autonomous_loop", run_id = %self.state.run_id);
        self.drive().instrument(span).await
    }

    async fn drive(&mut self) -> LoopResult {
        let started = Instant::now();
        self.narrate(&format!(
            "Loop started at iteration {} of {} (best score {:.3})",
            self.state.current_iteration,
            self.state.max_iterations,
            self.state.best_score.max(0.0)
        ))
        .await;

        let (reason, failure, lease_lost) = loop {
            if let Some(reason) = self.check_stop(started.elapsed()) {
                break (reason, None, false);
            }

            if let Err(e) = self.iterate().await {
                error!(
                    iteration = self.state.current_iteration,
                    error = %e,
                    "Iteration failed; stopping run"
                );
                let lease_lost = matches!(e, DomainError::RunAlreadyActive { .. });
                break (StopReason::Error, Some(e.to_string()), lease_lost);
            }
        };

        // The run now belongs to another loop; writing would clobber its state.
        let (reason, failure) = if lease_lost {
            warn!("Run lease taken over by another loop; skipping final save");
            self.state.finish(reason);
            (reason, failure)
        } else {
            self.finalize(reason, failure).await
        };

        if let Err(e) = self.deps.store.release_lease(self.state.run_id, &self.lease_holder).await {
            warn!(error = %e, "Failed to release run lease");
        }

        let elapsed = started.elapsed();
        info!(
            stop_reason = %reason,
            iteration = self.state.current_iteration,
            best_score = self.state.best_score,
            elapsed_secs = elapsed.as_secs_f64(),
            "Optimization run stopped"
        );

        LoopResult {
            run_id: self.state.run_id,
            stop_reason: reason,
            final_score: if self.state.has_scored() { self.state.best_score } else { 0.0 },
            final_iteration: self.state.current_iteration,
            best_candidate: self.best.as_ref().map(|b| b.candidate.clone()),
            best_evaluation: self.best.as_ref().map(|b| b.evaluation.clone()),
            elapsed,
            error: failure,
        }
    }

    /// First matching stop condition, in fixed precedence order.
    fn check_stop(&self, elapsed: Duration) -> Option<StopReason> {
        let state = &self.state;

        if state.best_score >= state.target_score {
            return Some(StopReason::TargetReached);
        }
        if state.current_iteration >= state.max_iterations {
            return Some(StopReason::MaxIterations);
        }
        if self.config.stagnation_limit > 0
            && state.iterations_since_improvement >= self.config.stagnation_limit
        {
            return Some(StopReason::Stagnation);
        }
        if self.config.time_limit.is_some_and(|limit| elapsed >= limit) {
            return Some(StopReason::TimeLimit);
        }
        if self.abort.is_aborted() {
            return Some(StopReason::UserAbort);
        }
        None
    }

    /// One iteration step. Renews the lease before touching anything.
    async fn iterate(&mut self) -> DomainResult<()> {
        let iteration_started = Instant::now();
        self.deps
            .store
            .acquire_lease(self.state.run_id, &self.lease_holder, self.config.lease_ttl)
            .await?;

        let params = self.state.current_params.clone();

        let candidates = self
            .deps
            .generator
            .generate_candidates(&params, self.config.candidates_per_iteration.max(1))
            .await?;

        if candidates.is_empty() {
            self.state.record_wasted_iteration();
            warn!(
                iteration = self.state.current_iteration,
                algorithm = %params.algorithm,
                "Generator returned no candidates"
            );
            return self.after_iteration().await;
        }

        let (start_date, end_date) = (self.state.start_date, self.state.end_date);
        let evaluator = &self.deps.evaluator;
        let evaluations = try_join_all(
            candidates
                .iter()
                .map(|candidate| evaluator.evaluate(candidate, start_date, end_date)),
        )
        .await?;

        let (candidate, evaluation) = select_best(candidates, evaluations)
            .ok_or_else(|| DomainError::EvaluationFailed("No evaluations returned".to_string()))?;

        let improved = self.state.update_with_result(&evaluation);
        let iteration = self.state.current_iteration;

        if self
            .best
            .as_ref()
            .is_none_or(|best| evaluation.is_better_than(&best.evaluation))
        {
            self.best = Some(BestResult {
                candidate,
                evaluation: evaluation.clone(),
            });
            self.best_unsaved = true;
        }

        let record = IterationRecord::from_evaluation(
            iteration,
            params,
            &evaluation,
            iteration_started.elapsed().as_secs_f64(),
        );
        self.deps.store.append_iteration(&self.state, &record).await?;

        debug!(
            iteration,
            score = evaluation.score,
            valid = evaluation.valid,
            improved,
            "Iteration evaluated"
        );

        let next = self.next_params(&evaluation).await?;
        self.state.set_params(next);

        self.after_iteration().await
    }

    /// Adapter proposal, replaced by a validated advisory payload when one arrives.
    async fn next_params(&mut self, evaluation: &Evaluation) -> DomainResult<GeneratorParams> {
        let history = self
            .deps
            .store
            .load_history(self.state.run_id, Some(self.config.history_window))
            .await?;

        let proposal = self
            .deps
            .adapter
            .adapt(&self.state.current_params, evaluation, &history)?;
        validate_generator_params(&proposal)
            .map_err(|e| DomainError::AdaptationFailed(format!("Adapter proposed invalid parameters: {e}")))?;

        if !self.advisor_due() {
            return Ok(proposal);
        }

        let Some(suggestion) = self.deps.advisor.suggest(&self.state, evaluation, &history).await else {
            return Ok(proposal);
        };

        if !validate_suggestion(&suggestion) {
            debug!(
                advisor = self.deps.advisor.name(),
                kind = suggestion.kind.as_str(),
                "Discarding advisory suggestion that failed validation"
            );
            return Ok(proposal);
        }

        match suggestion.params.as_ref().filter(|delta| !delta.is_empty()) {
            Some(delta) => match apply_params_delta(&self.state.current_params, delta) {
                Ok(params) => {
                    info!(
                        advisor = self.deps.advisor.name(),
                        kind = suggestion.kind.as_str(),
                        confidence = suggestion.confidence,
                        "Applying advisory parameters"
                    );
                    self.narrate(&format!(
                        "Advisor {} ({:.2}): {}",
                        suggestion.kind.as_str(),
                        suggestion.confidence,
                        suggestion.reasoning
                    ))
                    .await;
                    Ok(params)
                }
                Err(e) => {
                    debug!(error = %e, "Discarding advisory parameters");
                    Ok(proposal)
                }
            },
            None => {
                info!(
                    kind = suggestion.kind.as_str(),
                    reasoning = %suggestion.reasoning,
                    "Advisory note"
                );
                self.narrate(&format!("Advisor note: {}", suggestion.reasoning)).await;
                Ok(proposal)
            }
        }
    }

    fn advisor_due(&self) -> bool {
        self.config.advisor_interval > 0
            && self.state.current_iteration % self.config.advisor_interval == 0
    }

    /// Checkpoint and progress-log cadence.
    async fn after_iteration(&mut self) -> DomainResult<()> {
        let iteration = self.state.current_iteration;

        if self.config.checkpoint_interval > 0 && iteration % self.config.checkpoint_interval == 0 {
            self.deps.store.save_state(&self.state).await?;
            self.save_best().await?;
            debug!(iteration, "Checkpoint saved");
        }

        if self.config.log_interval > 0 && iteration % self.config.log_interval == 0 {
            info!(
                iteration,
                best_score = self.state.best_score,
                since_improvement = self.state.iterations_since_improvement,
                algorithm = %self.state.current_params.algorithm,
                "Optimization progress"
            );
            self.narrate(&format!(
                "Iteration {}: best {:.3}, {} without improvement, next algorithm {}",
                iteration,
                self.state.best_score.max(0.0),
                self.state.iterations_since_improvement,
                self.state.current_params.algorithm
            ))
            .await;
        }

        Ok(())
    }

    async fn save_best(&mut self) -> DomainResult<()> {
        if !self.best_unsaved {
            return Ok(());
        }
        if let Some(best) = &self.best {
            self.deps.store.save_schedule(&self.state, &best.candidate).await?;
            self.deps.store.save_report(&self.state, &best.evaluation).await?;
        }
        self.best_unsaved = false;
        Ok(())
    }

    /// Final save sequence. A failure here turns the outcome into an error.
    async fn finalize(
        &mut self,
        reason: StopReason,
        failure: Option<String>,
    ) -> (StopReason, Option<String>) {
        self.state.finish(reason);

        if let Some(best) = &self.best {
            let explanation = self.deps.advisor.explain(&best.evaluation).await;
            self.narrate(&format!("Stopped ({reason}). {explanation}")).await;
        } else {
            self.narrate(&format!("Stopped ({reason}) without a scored candidate")).await;
        }

        let saved = match self.deps.store.save_state(&self.state).await {
            Ok(()) => {
                self.best_unsaved = self.best.is_some();
                self.save_best().await
            }
            Err(e) => Err(e),
        };

        match saved {
            Ok(()) => (reason, failure),
            Err(e) => {
                error!(error = %e, "Final save failed");
                self.state.finish(StopReason::Error);
                let message = match failure {
                    Some(original) => format!("{original}; final save failed: {e}"),
                    None => format!("Final save failed: {e}"),
                };
                (StopReason::Error, Some(message))
            }
        }
    }

    /// Append to the run's operational log. Failures are only traced.
    async fn narrate(&self, message: &str) {
        if let Err(e) = self.deps.store.log(&self.state, message).await {
            warn!(error = %e, "Failed to write run log");
        }
    }
}

/// Best of k by the evaluator's ordering; ties keep the first seen.
fn select_best(
    candidates: Vec<Candidate>,
    evaluations: Vec<Evaluation>,
) -> Option<(Candidate, Evaluation)> {
    let mut best: Option<(Candidate, Evaluation)> = None;
    for (candidate, evaluation) in candidates.into_iter().zip(evaluations) {
        let replace = best
            .as_ref()
            .is_none_or(|(_, current)| evaluation.is_better_than(current));
        if replace {
            best = Some((candidate, evaluation));
        }
    }
    best
}
