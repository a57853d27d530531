//! Run state, stop reasons and the per-iteration history record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::evaluation::{Candidate, Evaluation};
use super::params::GeneratorParams;

/// Initial `best_score`, below any valid score in `[0, 1]`.
pub const BEST_SCORE_SENTINEL: f64 = -1.0;

/// Persisted lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Exhausted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Exhausted => "exhausted",
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "exhausted" => Ok(Self::Exhausted),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// Why the loop stopped. `Running` is the only non-terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetReached,
    MaxIterations,
    Stagnation,
    TimeLimit,
    UserAbort,
    Error,
    Running,
}

impl StopReason {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TargetReached => "target_reached",
            Self::MaxIterations => "max_iterations",
            Self::Stagnation => "stagnation",
            Self::TimeLimit => "time_limit",
            Self::UserAbort => "user_abort",
            Self::Error => "error",
            Self::Running => "running",
        }
    }

    /// Persisted status a run ends in when it stops for this reason.
    pub fn final_status(&self) -> RunStatus {
        match self {
            Self::TargetReached => RunStatus::Completed,
            Self::Running => RunStatus::Running,
            Self::MaxIterations
            | Self::Stagnation
            | Self::TimeLimit
            | Self::UserAbort
            | Self::Error => RunStatus::Exhausted,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StopReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "target_reached" => Ok(Self::TargetReached),
            "max_iterations" => Ok(Self::MaxIterations),
            "stagnation" => Ok(Self::Stagnation),
            "time_limit" => Ok(Self::TimeLimit),
            "user_abort" => Ok(Self::UserAbort),
            "error" => Ok(Self::Error),
            "running" => Ok(Self::Running),
            other => Err(format!("unknown stop reason '{other}'")),
        }
    }
}

/// Mutable progress record of one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub scenario: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub max_iterations: u32,
    pub target_score: f64,
    pub current_iteration: u32,
    pub current_params: GeneratorParams,
    pub best_score: f64,
    pub iterations_since_improvement: u32,
    pub status: RunStatus,
    /// Terminal reason recorded at loop exit; `None` while running.
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(
        scenario: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        max_iterations: u32,
        target_score: f64,
        initial_params: GeneratorParams,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            scenario: scenario.into(),
            start_date,
            end_date,
            max_iterations,
            target_score,
            current_iteration: 0,
            current_params: initial_params,
            best_score: BEST_SCORE_SENTINEL,
            iterations_since_improvement: 0,
            status: RunStatus::Running,
            stop_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold one evaluated iteration into the run.
    ///
    /// Advances `current_iteration`. Returns true when the score improved on
    /// `best_score`, in which case the stagnation counter resets to zero;
    /// otherwise the counter grows by one.
    pub fn update_with_result(&mut self, evaluation: &Evaluation) -> bool {
        self.current_iteration += 1;
        let improved = evaluation.score > self.best_score;
        if improved {
            self.best_score = evaluation.score;
            self.iterations_since_improvement = 0;
        } else {
            self.iterations_since_improvement += 1;
        }
        self.updated_at = Utc::now();
        improved
    }

    /// Account for an iteration that produced no candidates.
    pub fn record_wasted_iteration(&mut self) {
        self.current_iteration += 1;
        self.iterations_since_improvement += 1;
        self.updated_at = Utc::now();
    }

    /// Replace the parameters used by the next iteration.
    pub fn set_params(&mut self, params: GeneratorParams) {
        self.current_params = params;
        self.updated_at = Utc::now();
    }

    /// Put a previously stopped run back into the running state.
    pub fn reopen(&mut self) {
        self.status = RunStatus::Running;
        self.stop_reason = None;
        self.updated_at = Utc::now();
    }

    /// Record the terminal reason and the matching status.
    pub fn finish(&mut self, reason: StopReason) {
        self.status = reason.final_status();
        self.stop_reason = Some(reason).filter(StopReason::is_terminal);
        self.updated_at = Utc::now();
    }

    /// True once at least one evaluation has been folded in.
    pub fn has_scored(&self) -> bool {
        self.best_score > BEST_SCORE_SENTINEL
    }
}

/// Immutable log entry describing one completed iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub params: GeneratorParams,
    pub score: f64,
    pub valid: bool,
    pub critical_violations: u32,
    pub total_violations: u32,
    pub violation_types: BTreeSet<String>,
    pub duration_seconds: f64,
}

impl IterationRecord {
    pub fn from_evaluation(
        iteration: u32,
        params: GeneratorParams,
        evaluation: &Evaluation,
        duration_seconds: f64,
    ) -> Self {
        Self {
            iteration,
            timestamp: Utc::now(),
            params,
            score: evaluation.score,
            valid: evaluation.valid,
            critical_violations: evaluation.critical_violations,
            total_violations: evaluation.total_violations,
            violation_types: evaluation.violation_types(),
            duration_seconds,
        }
    }
}

/// One line of free-text operational narration attached to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub timestamp: DateTime<Utc>,
    pub iteration: u32,
    pub message: String,
}

/// Best candidate found by a run together with its evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestResult {
    pub candidate: Candidate,
    pub evaluation: Evaluation,
}
