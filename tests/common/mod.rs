//! Common test utilities for integration tests
//!
//! Provides scripted search collaborators, an in-memory state store and a
//! store wrapper that injects persistence failures.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

use schedule_autopilot::application::{AbortHandle, LoopConfig, LoopDependencies, NewRun};
use schedule_autopilot::domain::models::{
    Assignment, BestResult, Candidate, Evaluation, GeneratorParams, IterationRecord, RunLogEntry,
    RunState, Severity, Violation,
};
use schedule_autopilot::domain::ports::{CandidateGenerator, ScheduleEvaluator, StateStore};
use schedule_autopilot::services::RuleBasedAdapter;
use schedule_autopilot::{DomainError, DomainResult};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn horizon() -> (NaiveDate, NaiveDate) {
    (
        NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
    )
}

pub fn new_run() -> NewRun {
    let (start_date, end_date) = horizon();
    NewRun {
        scenario: "block-10".to_string(),
        start_date,
        end_date,
        initial_params: GeneratorParams::default(),
    }
}

/// Loop config with every cadence at 1 and no time limit.
pub fn loop_config(max_iterations: u32, target_score: f64, stagnation_limit: u32) -> LoopConfig {
    LoopConfig {
        max_iterations,
        target_score,
        stagnation_limit,
        time_limit: None,
        candidates_per_iteration: 1,
        checkpoint_interval: 1,
        log_interval: 1,
        history_window: 10,
        advisor_interval: 1,
        lease_ttl: Duration::from_secs(60),
    }
}

/// Lease validity short enough for a test to wait out.
pub const SHORT_LEASE: Duration = Duration::from_millis(50);

/// Simulate a crash: drop `run()` while the generator hangs. The lease is
/// left behind exactly as a killed process would leave it.
pub async fn crash(run: impl std::future::Future<Output = schedule_autopilot::LoopResult>) {
    let outcome = tokio::time::timeout(Duration::from_millis(200), run).await;
    assert!(outcome.is_err(), "run finished instead of hanging");
}

/// Wait until a lease taken with [`SHORT_LEASE`] has expired.
pub async fn wait_for_lease_expiry() {
    tokio::time::sleep(SHORT_LEASE * 3).await;
}

/// What the scripted generator does on one call.
#[derive(Debug, Clone)]
pub enum Step {
    /// One candidate per score, evaluated to exactly that score.
    Scores(Vec<f64>),
    /// No candidates.
    Empty,
    /// Generator failure.
    Fail,
    /// Never returns.
    Hang,
}

/// Generator and evaluator driven by a script of steps.
///
/// The last step repeats once the script runs out. Candidates scoring below
/// 0.5 carry a critical duty-hour violation so the adapter has something to
/// react to.
pub struct ScriptedSearch {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Step>,
    scores: Mutex<HashMap<Uuid, f64>>,
    params_seen: Mutex<Vec<GeneratorParams>>,
    abort_on_call: Mutex<Option<(usize, AbortHandle)>>,
}

impl ScriptedSearch {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        let last = steps.last().cloned().unwrap_or(Step::Empty);
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(last),
            scores: Mutex::new(HashMap::new()),
            params_seen: Mutex::new(Vec::new()),
            abort_on_call: Mutex::new(None),
        })
    }

    /// One candidate per iteration with the given scores.
    pub fn with_scores(scores: &[f64]) -> Arc<Self> {
        Self::new(scores.iter().map(|s| Step::Scores(vec![*s])).collect())
    }

    /// Request an abort through `handle` during the `call`-th generation (1-based).
    pub fn abort_on_call(&self, call: usize, handle: AbortHandle) {
        *self.abort_on_call.lock().unwrap() = Some((call, handle));
    }

    /// Parameters received by every generation call, in order.
    pub fn params_seen(&self) -> Vec<GeneratorParams> {
        self.params_seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.params_seen.lock().unwrap().len()
    }

    pub fn dependencies(self: &Arc<Self>, store: Arc<dyn StateStore>) -> LoopDependencies {
        LoopDependencies::new(
            self.clone(),
            self.clone(),
            Arc::new(RuleBasedAdapter::default()),
            store,
        )
    }

    fn candidate(person: usize) -> Candidate {
        let (start, _) = horizon();
        Candidate::new(vec![Assignment {
            person_id: format!("PGY1-{person:02}"),
            date: start,
            rotation: "wards".to_string(),
            shift: "day".to_string(),
        }])
    }
}

#[async_trait]
impl CandidateGenerator for ScriptedSearch {
    async fn generate_candidates(&self, params: &GeneratorParams, _k: usize) -> DomainResult<Vec<Candidate>> {
        let call = {
            let mut seen = self.params_seen.lock().unwrap();
            seen.push(params.clone());
            seen.len()
        };

        if let Some((at, handle)) = self.abort_on_call.lock().unwrap().as_ref() {
            if *at == call {
                handle.abort();
            }
        }

        let step = {
            let next = self.steps.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.last.lock().unwrap().clone())
        };

        match step {
            Step::Scores(scores) => {
                let mut issued = self.scores.lock().unwrap();
                Ok(scores
                    .into_iter()
                    .enumerate()
                    .map(|(i, score)| {
                        let candidate = Self::candidate(i);
                        issued.insert(candidate.id, score);
                        candidate
                    })
                    .collect())
            }
            Step::Empty => Ok(Vec::new()),
            Step::Fail => Err(DomainError::GenerationFailed("solver crashed".to_string())),
            Step::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl ScheduleEvaluator for ScriptedSearch {
    async fn evaluate(&self, candidate: &Candidate, _start: NaiveDate, _end: NaiveDate) -> DomainResult<Evaluation> {
        let score = self
            .scores
            .lock()
            .unwrap()
            .get(&candidate.id)
            .copied()
            .ok_or_else(|| DomainError::EvaluationFailed("unknown candidate".to_string()))?;

        let violations = if score < 0.5 {
            vec![Violation::new("eighty_hour_rule", "over 80h", Severity::Critical)]
        } else {
            Vec::new()
        };
        Ok(Evaluation::from_violations(score, violations))
    }
}

#[derive(Default)]
struct RunRecord {
    state: Option<RunState>,
    history: Vec<IterationRecord>,
    log: Vec<RunLogEntry>,
    schedule: Option<Candidate>,
    report: Option<Evaluation>,
    lease: Option<(String, Instant)>,
}

/// StateStore kept entirely in memory.
#[derive(Default)]
pub struct MemoryStateStore {
    runs: Mutex<HashMap<Uuid, RunRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load_run(&self, run_id: Uuid) -> DomainResult<Option<RunState>> {
        Ok(self.runs.lock().unwrap().get(&run_id).and_then(|r| r.state.clone()))
    }

    async fn save_state(&self, state: &RunState) -> DomainResult<()> {
        self.runs.lock().unwrap().entry(state.run_id).or_default().state = Some(state.clone());
        Ok(())
    }

    async fn append_iteration(&self, state: &RunState, record: &IterationRecord) -> DomainResult<()> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.entry(state.run_id).or_default();
        if run.history.last().is_some_and(|last| record.iteration <= last.iteration) {
            return Err(DomainError::ValidationFailed("out of order".to_string()));
        }
        run.history.push(record.clone());
        Ok(())
    }

    async fn truncate_history(&self, run_id: Uuid, iteration: u32) -> DomainResult<usize> {
        let mut runs = self.runs.lock().unwrap();
        let Some(run) = runs.get_mut(&run_id) else {
            return Ok(0);
        };
        let before = run.history.len();
        run.history.retain(|record| record.iteration <= iteration);
        Ok(before - run.history.len())
    }

    async fn load_history(&self, run_id: Uuid, limit: Option<usize>) -> DomainResult<Vec<IterationRecord>> {
        let runs = self.runs.lock().unwrap();
        let history = runs.get(&run_id).map(|r| r.history.clone()).unwrap_or_default();
        let skip = limit.map_or(0, |l| history.len().saturating_sub(l));
        Ok(history[skip..].to_vec())
    }

    async fn log(&self, state: &RunState, message: &str) -> DomainResult<()> {
        self.runs.lock().unwrap().entry(state.run_id).or_default().log.push(RunLogEntry {
            timestamp: chrono::Utc::now(),
            iteration: state.current_iteration,
            message: message.to_string(),
        });
        Ok(())
    }

    async fn load_log(&self, run_id: Uuid) -> DomainResult<Vec<RunLogEntry>> {
        Ok(self.runs.lock().unwrap().get(&run_id).map(|r| r.log.clone()).unwrap_or_default())
    }

    async fn save_schedule(&self, state: &RunState, candidate: &Candidate) -> DomainResult<()> {
        self.runs.lock().unwrap().entry(state.run_id).or_default().schedule = Some(candidate.clone());
        Ok(())
    }

    async fn save_report(&self, state: &RunState, evaluation: &Evaluation) -> DomainResult<()> {
        self.runs.lock().unwrap().entry(state.run_id).or_default().report = Some(evaluation.clone());
        Ok(())
    }

    async fn load_best(&self, run_id: Uuid) -> DomainResult<Option<BestResult>> {
        let runs = self.runs.lock().unwrap();
        Ok(runs.get(&run_id).and_then(|r| match (&r.schedule, &r.report) {
            (Some(candidate), Some(evaluation)) => Some(BestResult {
                candidate: candidate.clone(),
                evaluation: evaluation.clone(),
            }),
            _ => None,
        }))
    }

    async fn list_runs(&self, limit: usize) -> DomainResult<Vec<RunState>> {
        let mut runs: Vec<RunState> = self
            .runs
            .lock()
            .unwrap()
            .values()
            .filter_map(|r| r.state.clone())
            .collect();
        runs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn acquire_lease(&self, run_id: Uuid, holder: &str, ttl: Duration) -> DomainResult<()> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.entry(run_id).or_default();
        let now = Instant::now();
        match &run.lease {
            Some((current, expires_at)) if current != holder && *expires_at > now => {
                Err(DomainError::RunAlreadyActive {
                    run_id,
                    holder: current.clone(),
                })
            }
            _ => {
                run.lease = Some((holder.to_string(), now + ttl));
                Ok(())
            }
        }
    }

    async fn release_lease(&self, run_id: Uuid, holder: &str) -> DomainResult<()> {
        let mut runs = self.runs.lock().unwrap();
        if let Some(run) = runs.get_mut(&run_id) {
            if run.lease.as_ref().is_some_and(|(current, _)| current == holder) {
                run.lease = None;
            }
        }
        Ok(())
    }
}

/// Wrapper that counts checkpoints and fails selected operations on demand.
pub struct FlakyStore {
    inner: Arc<dyn StateStore>,
    pub fail_save_state: AtomicBool,
    pub fail_append: AtomicBool,
    pub fail_log: AtomicBool,
    pub fail_load_best: AtomicBool,
    /// Fail `append_iteration` once this many records have been stored.
    pub fail_append_after: Mutex<Option<usize>>,
    save_state_calls: AtomicUsize,
    appends: AtomicUsize,
}

impl FlakyStore {
    pub fn wrap(inner: Arc<dyn StateStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_save_state: AtomicBool::new(false),
            fail_append: AtomicBool::new(false),
            fail_log: AtomicBool::new(false),
            fail_load_best: AtomicBool::new(false),
            fail_append_after: Mutex::new(None),
            save_state_calls: AtomicUsize::new(0),
            appends: AtomicUsize::new(0),
        })
    }

    pub fn save_state_calls(&self) -> usize {
        self.save_state_calls.load(Ordering::SeqCst)
    }

    fn injected(op: &str) -> DomainError {
        DomainError::StorageError(format!("injected {op} failure"))
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn load_run(&self, run_id: Uuid) -> DomainResult<Option<RunState>> {
        self.inner.load_run(run_id).await
    }

    async fn save_state(&self, state: &RunState) -> DomainResult<()> {
        self.save_state_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_save_state.load(Ordering::SeqCst) {
            return Err(Self::injected("save_state"));
        }
        self.inner.save_state(state).await
    }

    async fn append_iteration(&self, state: &RunState, record: &IterationRecord) -> DomainResult<()> {
        let stored = self.appends.load(Ordering::SeqCst);
        let limit_hit = self.fail_append_after.lock().unwrap().is_some_and(|n| stored >= n);
        if self.fail_append.load(Ordering::SeqCst) || limit_hit {
            return Err(Self::injected("append_iteration"));
        }
        self.inner.append_iteration(state, record).await?;
        self.appends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn truncate_history(&self, run_id: Uuid, iteration: u32) -> DomainResult<usize> {
        self.inner.truncate_history(run_id, iteration).await
    }

    async fn load_history(&self, run_id: Uuid, limit: Option<usize>) -> DomainResult<Vec<IterationRecord>> {
        self.inner.load_history(run_id, limit).await
    }

    async fn log(&self, state: &RunState, message: &str) -> DomainResult<()> {
        if self.fail_log.load(Ordering::SeqCst) {
            return Err(Self::injected("log"));
        }
        self.inner.log(state, message).await
    }

    async fn load_log(&self, run_id: Uuid) -> DomainResult<Vec<RunLogEntry>> {
        self.inner.load_log(run_id).await
    }

    async fn save_schedule(&self, state: &RunState, candidate: &Candidate) -> DomainResult<()> {
        self.inner.save_schedule(state, candidate).await
    }

    async fn save_report(&self, state: &RunState, evaluation: &Evaluation) -> DomainResult<()> {
        self.inner.save_report(state, evaluation).await
    }

    async fn load_best(&self, run_id: Uuid) -> DomainResult<Option<BestResult>> {
        if self.fail_load_best.load(Ordering::SeqCst) {
            return Err(Self::injected("load_best"));
        }
        self.inner.load_best(run_id).await
    }

    async fn list_runs(&self, limit: usize) -> DomainResult<Vec<RunState>> {
        self.inner.list_runs(limit).await
    }

    async fn acquire_lease(&self, run_id: Uuid, holder: &str, ttl: Duration) -> DomainResult<()> {
        self.inner.acquire_lease(run_id, holder, ttl).await
    }

    async fn release_lease(&self, run_id: Uuid, holder: &str) -> DomainResult<()> {
        self.inner.release_lease(run_id, holder).await
    }
}
