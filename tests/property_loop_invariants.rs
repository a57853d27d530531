//! Property-based tests for run state and loop invariants.
//!
//! Uses proptest to check, over arbitrary score sequences, that iteration
//! counters and best scores only move forward and that every run ends with a
//! stop reason consistent with its final state.

mod common;

use chrono::NaiveDate;
use proptest::prelude::*;

use common::{loop_config, new_run, MemoryStateStore, ScriptedSearch};
use schedule_autopilot::domain::models::{Evaluation, GeneratorParams, RunState, StopReason};
use schedule_autopilot::domain::ports::StateStore;
use schedule_autopilot::{AutonomousLoop, LoopResult};

fn run_state() -> RunState {
    RunState::new(
        "prop",
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 1, 28).unwrap(),
        100,
        0.95,
        GeneratorParams::default(),
    )
}

fn score_strategy() -> impl Strategy<Value = f64> {
    (0u32..=100).prop_map(|n| f64::from(n) / 100.0)
}

/// Drive a whole run on a fresh runtime and return the result with its history.
fn drive(
    scores: &[f64],
    max_iterations: u32,
    target: f64,
    stagnation_limit: u32,
) -> (LoopResult, Vec<f64>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let store = MemoryStateStore::new();
        let search = ScriptedSearch::with_scores(scores);
        let result = AutonomousLoop::start(
            search.dependencies(store.clone()),
            loop_config(max_iterations, target, stagnation_limit),
            new_run(),
        )
        .await
        .unwrap()
        .run()
        .await;

        let history = store.load_history(result.run_id, None).await.unwrap();
        (result, history.iter().map(|r| r.score).collect())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: best_score never decreases and iterations advance by one
    #[test]
    fn prop_run_state_is_monotonic(scores in prop::collection::vec(score_strategy(), 1..40)) {
        let mut state = run_state();
        let mut previous_best = state.best_score;

        for (i, score) in scores.iter().enumerate() {
            let improved = state.update_with_result(&Evaluation::from_violations(*score, vec![]));

            prop_assert_eq!(state.current_iteration as usize, i + 1);
            prop_assert!(state.best_score >= previous_best);
            prop_assert_eq!(improved, *score > previous_best);
            if improved {
                prop_assert_eq!(state.iterations_since_improvement, 0);
            }
            previous_best = state.best_score;
        }

        let max = scores.iter().copied().fold(f64::MIN, f64::max);
        prop_assert!((state.best_score - max).abs() < f64::EPSILON);
    }

    /// Property: the stagnation counter equals the trailing run of non-improving scores
    #[test]
    fn prop_stagnation_counter_matches_history(scores in prop::collection::vec(score_strategy(), 1..40)) {
        let mut state = run_state();
        for score in &scores {
            state.update_with_result(&Evaluation::from_violations(*score, vec![]));
        }

        let mut best = f64::NEG_INFINITY;
        let mut trailing = 0u32;
        for score in &scores {
            if *score > best {
                best = *score;
                trailing = 0;
            } else {
                trailing += 1;
            }
        }
        prop_assert_eq!(state.iterations_since_improvement, trailing);
    }

    /// Property: a finished run never exceeds its budget and reports the best observed score
    #[test]
    fn prop_loop_respects_budget_and_best_score(
        scores in prop::collection::vec(score_strategy(), 1..12),
        max_iterations in 1u32..15,
        stagnation_limit in 0u32..5,
    ) {
        let (result, history) = drive(&scores, max_iterations, 0.95, stagnation_limit);

        prop_assert!(result.final_iteration <= max_iterations);
        prop_assert_eq!(history.len(), result.final_iteration as usize);

        let observed = history.iter().copied().fold(f64::MIN, f64::max);
        prop_assert!((result.final_score - observed).abs() < f64::EPSILON);
    }

    /// Property: the stop reason agrees with the final state
    #[test]
    fn prop_stop_reason_is_consistent(
        scores in prop::collection::vec(score_strategy(), 1..12),
        max_iterations in 1u32..15,
        stagnation_limit in 0u32..5,
    ) {
        let target = 0.9;
        let (result, history) = drive(&scores, max_iterations, target, stagnation_limit);

        match result.stop_reason {
            StopReason::TargetReached => {
                prop_assert!(result.final_score >= target);
                let before_last = &history[..history.len() - 1];
                prop_assert!(before_last.iter().all(|s| *s < target));
            }
            StopReason::MaxIterations => {
                prop_assert_eq!(result.final_iteration, max_iterations);
                prop_assert!(result.final_score < target);
            }
            StopReason::Stagnation => {
                prop_assert!(stagnation_limit > 0);
                prop_assert!(result.final_iteration < max_iterations);
                prop_assert!(result.final_score < target);
            }
            other => prop_assert!(false, "unexpected stop reason {}", other),
        }
    }
}
