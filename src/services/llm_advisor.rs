//! LLM-backed advisor for the optimization loop.
//!
//! Summarizes the run for a language model, asks it for a parameter change or
//! diagnosis, and parses the answer into a [`Suggestion`]. Every failure along
//! the way (backend error, timeout, unparseable text) becomes "no suggestion";
//! nothing here can stop or fail a run.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AdvisorConfig, Algorithm, ConstraintName, Evaluation, IterationRecord, RunState, Suggestion,
};
use crate::domain::ports::{Advisor, AdvisoryBackend, AdvisoryRequest};

use super::suggestion_schema::{self, MIN_CONFIDENCE};

const SYSTEM_PREAMBLE: &str = "You are an optimization advisor for a medical residency \
scheduling engine. You review the progress of an automated search for ACGME-compliant \
schedules and propose adjustments to the generator parameters. You never see or edit \
schedules directly. Respond with a single JSON object and nothing else.";

const EXPLAIN_PREAMBLE: &str = "You explain residency schedule evaluations to program \
coordinators in plain language. Be brief and concrete.";

/// Violations listed in the prompt for the last evaluation.
const MAX_PROMPT_VIOLATIONS: usize = 5;

/// Configuration for the LLM advisor.
#[derive(Debug, Clone)]
pub struct LlmAdvisorConfig {
    /// Model identifier sent with every request.
    pub model: String,
    /// Maximum tokens for the response.
    pub max_tokens: u32,
    /// Temperature for generation (0.0-1.0).
    pub temperature: f32,
    /// Upper bound on a single backend call.
    pub timeout: Duration,
    /// Number of most recent iteration records included in the prompt.
    pub history_window: usize,
}

impl Default for LlmAdvisorConfig {
    fn default() -> Self {
        Self::from(&AdvisorConfig::default())
    }
}

impl From<&AdvisorConfig> for LlmAdvisorConfig {
    fn from(config: &AdvisorConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_seconds),
            history_window: 10,
        }
    }
}

impl LlmAdvisorConfig {
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Counters describing how the advisor has fared so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdvisorStats {
    pub requests: u64,
    pub backend_failures: u64,
    pub timeouts: u64,
    pub parse_failures: u64,
    pub suggestions: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    requests: AtomicU64,
    backend_failures: AtomicU64,
    timeouts: AtomicU64,
    parse_failures: AtomicU64,
    suggestions: AtomicU64,
}

/// Advisor that consults a language-model backend.
pub struct LlmAdvisor {
    backend: Arc<dyn AdvisoryBackend>,
    config: LlmAdvisorConfig,
    counters: StatCounters,
}

impl LlmAdvisor {
    pub fn new(backend: Arc<dyn AdvisoryBackend>, config: LlmAdvisorConfig) -> Self {
        Self {
            backend,
            config,
            counters: StatCounters::default(),
        }
    }

    pub fn with_default_config(backend: Arc<dyn AdvisoryBackend>) -> Self {
        Self::new(backend, LlmAdvisorConfig::default())
    }

    pub fn config(&self) -> &LlmAdvisorConfig {
        &self.config
    }

    pub fn stats(&self) -> AdvisorStats {
        AdvisorStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            backend_failures: self.counters.backend_failures.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            parse_failures: self.counters.parse_failures.load(Ordering::Relaxed),
            suggestions: self.counters.suggestions.load(Ordering::Relaxed),
        }
    }

    /// Schema check for a parsed suggestion; see [`suggestion_schema::validate_suggestion`].
    pub fn validate_suggestion(&self, suggestion: &Suggestion) -> bool {
        suggestion_schema::validate_suggestion(suggestion)
    }

    fn request(&self, system: &str, prompt: String) -> AdvisoryRequest {
        AdvisoryRequest {
            system: system.to_string(),
            prompt,
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    /// Query the backend within the configured time bound.
    async fn query(&self, request: &AdvisoryRequest) -> DomainResult<String> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);

        match timeout(self.config.timeout, self.backend.complete(request)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => {
                self.counters.backend_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
            Err(_) => {
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                Err(DomainError::AdvisoryUnavailable(format!(
                    "{} did not answer within {}s",
                    self.backend.name(),
                    self.config.timeout.as_secs_f64()
                )))
            }
        }
    }

    /// Build the suggestion prompt.
    fn build_suggestion_prompt(
        &self,
        state: &RunState,
        last_evaluation: &Evaluation,
        history: &[IterationRecord],
    ) -> String {
        let params_json = serde_json::to_string_pretty(&state.current_params)
            .unwrap_or_else(|_| format!("{:?}", state.current_params));

        let violations_text = if last_evaluation.violations.is_empty() {
            "None".to_string()
        } else {
            last_evaluation
                .violations
                .iter()
                .take(MAX_PROMPT_VIOLATIONS)
                .map(|v| format!("- [{:?}] {}: {}", v.severity, v.violation_type, v.message))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let recent = &history[history.len().saturating_sub(self.config.history_window)..];
        let history_text = if recent.is_empty() {
            "No completed iterations yet".to_string()
        } else {
            recent
                .iter()
                .map(|r| {
                    format!(
                        "- #{}: score={:.3} valid={} critical={} total={} algorithm={}",
                        r.iteration,
                        r.score,
                        r.valid,
                        r.critical_violations,
                        r.total_violations,
                        r.params.algorithm
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        let algorithms = Algorithm::ALL.map(|a| a.as_str()).join("|");
        let constraints = ConstraintName::ALL.map(|c| c.as_str()).join(", ");

        format!(
            r#"## Run
Scenario: {}
Horizon: {} to {}
Iteration: {} of {}
Best score: {:.3} (target {:.3})
Iterations since improvement: {}

## Current Parameters
{}

## Last Evaluation
Score: {:.3}
Valid: {}
Critical violations: {}
Total violations: {}
Top violations:
{}

## Recent History
{}

## Instructions
Propose at most one change that is likely to raise the score or remove critical
violations. Parameter bounds: timeout_seconds 10-600, diversification_factor 0-1,
constraint weights 0-2. Known constraints: {}.
Only suggest a change you are reasonably confident in (confidence >= {}).

## Required Output Format (JSON)
```json
{{
  "type": "parameter_change|algorithm_switch|constraint_weight|failure_analysis|strategy_change|explanation",
  "confidence": 0.0,
  "reasoning": "Why this change should help",
  "params": {{
    "algorithm": "{}",
    "timeout_seconds": 60,
    "diversification_factor": 0.2,
    "constraint_weights": {{"eighty_hour_rule": 1.5}}
  }},
  "analysis": {{}}
}}
```
"params" and "analysis" are optional; include only the fields you want to change.

IMPORTANT: Output ONLY the JSON object, no other text."#,
            state.scenario,
            state.start_date,
            state.end_date,
            state.current_iteration,
            state.max_iterations,
            state.best_score.max(0.0),
            state.target_score,
            state.iterations_since_improvement,
            params_json,
            last_evaluation.score,
            last_evaluation.valid,
            last_evaluation.critical_violations,
            last_evaluation.total_violations,
            violations_text,
            history_text,
            constraints,
            MIN_CONFIDENCE,
            algorithms,
        )
    }

    /// Build the explanation prompt.
    fn build_explanation_prompt(&self, evaluation: &Evaluation) -> String {
        let violations_text = evaluation
            .violations
            .iter()
            .map(|v| format!("- [{:?}] {}: {}", v.severity, v.violation_type, v.message))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Explain this schedule evaluation in two or three sentences.\n\n\
             Score: {:.3}\nCompliant: {}\nCritical violations: {}\nTotal violations: {}\n\
             Violations:\n{}",
            evaluation.score,
            evaluation.valid,
            evaluation.critical_violations,
            evaluation.total_violations,
            if violations_text.is_empty() { "None" } else { &violations_text },
        )
    }
}

#[async_trait]
impl Advisor for LlmAdvisor {
    fn name(&self) -> &'static str {
        self.backend.name()
    }

    async fn suggest(
        &self,
        state: &RunState,
        last_evaluation: &Evaluation,
        history: &[IterationRecord],
    ) -> Option<Suggestion> {
        let prompt = self.build_suggestion_prompt(state, last_evaluation, history);
        let request = self.request(SYSTEM_PREAMBLE, prompt);

        let response = match self.query(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    run_id = %state.run_id,
                    backend = self.backend.name(),
                    error = %e,
                    "Advisory backend failed; continuing without suggestion"
                );
                return None;
            }
        };

        match suggestion_schema::parse_suggestion(&response) {
            Ok(suggestion) => {
                self.counters.suggestions.fetch_add(1, Ordering::Relaxed);
                debug!(
                    run_id = %state.run_id,
                    kind = suggestion.kind.as_str(),
                    confidence = suggestion.confidence,
                    "Parsed advisory suggestion"
                );
                Some(suggestion)
            }
            Err(e) => {
                self.counters.parse_failures.fetch_add(1, Ordering::Relaxed);
                warn!(run_id = %state.run_id, error = %e, "Discarding unparseable advisory response");
                None
            }
        }
    }

    async fn explain(&self, evaluation: &Evaluation) -> String {
        let request = self.request(EXPLAIN_PREAMBLE, self.build_explanation_prompt(evaluation));

        match self.query(&request).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => evaluation.summary(),
            Err(e) => {
                debug!(error = %e, "Explanation falling back to template");
                evaluation.summary()
            }
        }
    }
}
