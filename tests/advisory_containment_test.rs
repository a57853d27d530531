//! Advisory containment tests
//!
//! Malformed or untrustworthy advisory output must never reach the search:
//! each case here either yields no suggestion, fails validation, or leaves a
//! full run indistinguishable from one without an advisor.

mod common;

use std::sync::Arc;

use common::{loop_config, new_run, MemoryStateStore, ScriptedSearch};
use schedule_autopilot::adapters::advisory::ScriptedBackend;
use schedule_autopilot::domain::models::{Evaluation, GeneratorParams, RunState, Severity, Violation};
use schedule_autopilot::domain::ports::Advisor;
use schedule_autopilot::services::validate_suggestion;
use schedule_autopilot::{AutonomousLoop, LlmAdvisor, LoopResult};

const MALFORMED: &[&str] = &[
    "The schedule looks fine to me.",
    "```json\n{\"type\": \"parameter_change\", \"confidence\": 0.9\n```",
    r#"{"confidence": 0.9, "reasoning": "missing type"}"#,
    r#"{"type": "make_it_better", "confidence": 0.9, "reasoning": "unknown kind"}"#,
    r#"{"type": "parameter_change", "confidence": "very", "reasoning": "wrong type"}"#,
];

const REJECTED: &[&str] = &[
    r#"{"type": "parameter_change", "confidence": 0.1, "reasoning": "a hunch", "params": {"algorithm": "hybrid"}}"#,
    r#"{"type": "parameter_change", "confidence": 1.7, "reasoning": "very sure", "params": {"algorithm": "hybrid"}}"#,
    r#"{"type": "algorithm_switch", "confidence": 0.8, "reasoning": "   ", "params": {"algorithm": "hybrid"}}"#,
    r#"{"type": "algorithm_switch", "confidence": 0.8, "reasoning": "quantum", "params": {"algorithm": "quantum_annealer"}}"#,
    r#"{"type": "parameter_change", "confidence": 0.8, "reasoning": "longer", "params": {"timeout_seconds": 5000}}"#,
    r#"{"type": "parameter_change", "confidence": 0.8, "reasoning": "noise", "params": {"diversification_factor": -0.5}}"#,
    r#"{"type": "constraint_weight", "confidence": 0.8, "reasoning": "weights", "params": {"constraint_weights": {"equity": 7.0}}}"#,
    r#"{"type": "constraint_weight", "confidence": 0.8, "reasoning": "weights", "params": {"constraint_weights": {"moonlighting": 1.0}}}"#,
    r#"{"type": "parameter_change", "confidence": 0.8, "reasoning": "mixed", "params": {"algorithm": "pulp", "timeout_seconds": 1}}"#,
];

fn state() -> RunState {
    let run = new_run();
    RunState::new(run.scenario, run.start_date, run.end_date, 10, 0.95, GeneratorParams::default())
}

fn evaluation() -> Evaluation {
    Evaluation::from_violations(
        0.42,
        vec![Violation::new("eighty_hour_rule", "PGY1-04 at 88h", Severity::Critical)],
    )
}

fn advisor_answering(response: &str) -> Arc<LlmAdvisor> {
    let backend = ScriptedBackend::with_responses((0..32).map(|_| Ok(response.to_string())).collect());
    Arc::new(LlmAdvisor::with_default_config(Arc::new(backend)))
}

async fn run_with(advisor: Option<Arc<LlmAdvisor>>) -> (LoopResult, Vec<GeneratorParams>) {
    let search = ScriptedSearch::with_scores(&[0.3, 0.42, 0.42, 0.5, 0.5]);
    let mut deps = search.dependencies(MemoryStateStore::new());
    if let Some(advisor) = advisor {
        deps = deps.with_advisor(advisor);
    }

    let result = AutonomousLoop::start(deps, loop_config(6, 0.95, 0), new_run())
        .await
        .unwrap()
        .run()
        .await;
    (result, search.params_seen())
}

#[tokio::test]
async fn test_malformed_responses_yield_no_suggestion() {
    for response in MALFORMED {
        let advisor = advisor_answering(response);
        let suggestion = advisor.suggest(&state(), &evaluation(), &[]).await;
        assert!(suggestion.is_none(), "accepted malformed response: {response}");
        assert_eq!(advisor.stats().parse_failures, 1);
    }
}

#[tokio::test]
async fn test_out_of_range_suggestions_fail_validation() {
    for response in REJECTED {
        let advisor = advisor_answering(response);
        let suggestion = advisor
            .suggest(&state(), &evaluation(), &[])
            .await
            .unwrap_or_else(|| panic!("expected a parsed suggestion for {response}"));
        assert!(!validate_suggestion(&suggestion), "accepted invalid suggestion: {response}");
    }
}

#[tokio::test]
async fn test_untrusted_advice_leaves_run_unchanged() {
    let (baseline, baseline_params) = run_with(None).await;

    for response in MALFORMED.iter().chain(REJECTED) {
        let (result, params) = run_with(Some(advisor_answering(response))).await;

        assert_eq!(result.stop_reason, baseline.stop_reason, "response: {response}");
        assert_eq!(result.final_iteration, baseline.final_iteration, "response: {response}");
        assert!((result.final_score - baseline.final_score).abs() < f64::EPSILON);
        assert_eq!(params, baseline_params, "response: {response}");
    }
}

#[tokio::test]
async fn test_valid_advice_does_change_the_run() {
    let (_, baseline_params) = run_with(None).await;
    let advisor = advisor_answering(
        r#"{"type": "algorithm_switch", "confidence": 0.85, "reasoning": "Greedy is stuck", "params": {"algorithm": "cp_sat"}}"#,
    );

    let (result, params) = run_with(Some(advisor)).await;

    assert_eq!(result.final_iteration, 6);
    assert_ne!(params, baseline_params);
    assert!(params[1..]
        .iter()
        .all(|p| p.algorithm == schedule_autopilot::Algorithm::CpSat));
}

#[tokio::test]
async fn test_explanations_do_not_feed_back() {
    let (baseline, baseline_params) = run_with(None).await;
    let advisor = advisor_answering("This schedule has one resident over the duty-hour cap.");

    let (result, params) = run_with(Some(advisor)).await;

    assert_eq!(result.stop_reason, baseline.stop_reason);
    assert_eq!(params, baseline_params);
}
