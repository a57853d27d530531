//! Deterministic rule-based parameter adapter.
//!
//! Reads only its arguments, so replaying a history reproduces the same
//! parameter trajectory.

use std::str::FromStr;

use crate::domain::errors::DomainResult;
use crate::domain::models::params::{DIVERSIFICATION_RANGE, TIMEOUT_RANGE, WEIGHT_RANGE};
use crate::domain::models::{ConstraintName, Evaluation, GeneratorParams, IterationRecord};
use crate::domain::ports::ParameterAdapter;

/// Tuning knobs for [`RuleBasedAdapter`].
#[derive(Debug, Clone)]
pub struct RuleBasedAdapterConfig {
    /// Diversification added after an iteration that did not improve.
    pub diversify_step: f64,
    /// Diversification removed after an iteration that improved.
    pub focus_step: f64,
    /// Trailing non-improving records before the algorithm is rotated.
    pub switch_after: usize,
    /// Weight added to a constraint whose violation type was observed.
    pub weight_boost: f64,
    /// Timeout multiplier applied when the evaluation is not compliant.
    pub timeout_growth: f64,
}

impl Default for RuleBasedAdapterConfig {
    fn default() -> Self {
        Self {
            diversify_step: 0.1,
            focus_step: 0.05,
            switch_after: 3,
            weight_boost: 0.25,
            timeout_growth: 1.5,
        }
    }
}

/// Reference [`ParameterAdapter`] built from a handful of fixed rules.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedAdapter {
    config: RuleBasedAdapterConfig,
}

impl RuleBasedAdapter {
    pub fn new(config: RuleBasedAdapterConfig) -> Self {
        Self { config }
    }

    /// Number of trailing records that did not beat the best score before them.
    fn trailing_non_improving(history: &[IterationRecord]) -> usize {
        let mut best = f64::NEG_INFINITY;
        let mut trailing = 0;
        for record in history {
            if record.score > best {
                best = record.score;
                trailing = 0;
            } else {
                trailing += 1;
            }
        }
        trailing
    }
}

impl ParameterAdapter for RuleBasedAdapter {
    fn adapt(
        &self,
        current: &GeneratorParams,
        evaluation: &Evaluation,
        history: &[IterationRecord],
    ) -> DomainResult<GeneratorParams> {
        let stagnating = Self::trailing_non_improving(history);
        let mut next = current.clone();

        let factor = if stagnating == 0 {
            current.diversification_factor - self.config.focus_step
        } else {
            current.diversification_factor + self.config.diversify_step
        };
        next = next.with_diversification(
            factor.clamp(*DIVERSIFICATION_RANGE.start(), *DIVERSIFICATION_RANGE.end()),
        );

        if self.config.switch_after > 0
            && stagnating > 0
            && stagnating % self.config.switch_after == 0
        {
            next = next.with_algorithm(current.algorithm.next());
        }

        for violation_type in evaluation.violation_types() {
            if let Ok(constraint) = ConstraintName::from_str(&violation_type) {
                let boosted = (current.weight(constraint) + self.config.weight_boost)
                    .min(*WEIGHT_RANGE.end());
                next = next.with_weight(constraint, boosted);
            }
        }

        if !evaluation.valid {
            let grown = (current.timeout_seconds * self.config.timeout_growth)
                .clamp(*TIMEOUT_RANGE.start(), *TIMEOUT_RANGE.end());
            next = next.with_timeout(grown);
        }

        Ok(next)
    }
}
