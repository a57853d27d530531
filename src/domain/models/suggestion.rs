//! Advisory suggestions parsed from an untrusted backend.

use serde::{Deserialize, Serialize};

use super::params::ParamsDelta;

/// What an advisory suggestion proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    ParameterChange,
    AlgorithmSwitch,
    ConstraintWeight,
    FailureAnalysis,
    StrategyChange,
    Explanation,
}

impl SuggestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParameterChange => "parameter_change",
            Self::AlgorithmSwitch => "algorithm_switch",
            Self::ConstraintWeight => "constraint_weight",
            Self::FailureAnalysis => "failure_analysis",
            Self::StrategyChange => "strategy_change",
            Self::Explanation => "explanation",
        }
    }
}

/// An advisory proposal. Only ever built by parsing backend output, and never
/// applied unless it passes schema validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<ParamsDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<serde_json::Value>,
}
