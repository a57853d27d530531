//! Generator parameters: the configuration bundle handed to candidate generation.
//!
//! `GeneratorParams` is an immutable value. Adaptation and advisory suggestions
//! never edit an instance in place; they always produce a new one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Accepted range for `timeout_seconds`.
pub const TIMEOUT_RANGE: RangeInclusive<f64> = 10.0..=600.0;

/// Accepted range for `diversification_factor`.
pub const DIVERSIFICATION_RANGE: RangeInclusive<f64> = 0.0..=1.0;

/// Accepted range for each constraint weight.
pub const WEIGHT_RANGE: RangeInclusive<f64> = 0.0..=2.0;

/// Weight assumed for a constraint with no explicit entry.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Solver backend used to produce candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Greedy,
    CpSat,
    Pulp,
    Hybrid,
}

impl Algorithm {
    /// Every supported backend, in rotation order.
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Greedy,
        Algorithm::CpSat,
        Algorithm::Pulp,
        Algorithm::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greedy => "greedy",
            Self::CpSat => "cp_sat",
            Self::Pulp => "pulp",
            Self::Hybrid => "hybrid",
        }
    }

    /// The backend that follows this one in rotation order (wraps around).
    pub fn next(&self) -> Self {
        let idx = Self::ALL.iter().position(|a| a == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown algorithm '{s}'"))
    }
}

/// Named scheduling constraints whose relative weight the search can tune.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintName {
    /// ACGME 80-hour weekly duty limit.
    EightyHourRule,
    /// One day off in seven.
    OneInSeven,
    /// Faculty-to-resident supervision ratios.
    SupervisionRatio,
    /// Minimum spacing between call shifts.
    CallSpacing,
    /// Required rotation coverage.
    RotationCoverage,
    /// Absences and leave.
    Availability,
    /// Continuity clinic attendance.
    Continuity,
    /// Workload equity across residents.
    Equity,
    /// Soft preferences.
    Preference,
}

impl ConstraintName {
    pub const ALL: [ConstraintName; 9] = [
        ConstraintName::EightyHourRule,
        ConstraintName::OneInSeven,
        ConstraintName::SupervisionRatio,
        ConstraintName::CallSpacing,
        ConstraintName::RotationCoverage,
        ConstraintName::Availability,
        ConstraintName::Continuity,
        ConstraintName::Equity,
        ConstraintName::Preference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EightyHourRule => "eighty_hour_rule",
            Self::OneInSeven => "one_in_seven",
            Self::SupervisionRatio => "supervision_ratio",
            Self::CallSpacing => "call_spacing",
            Self::RotationCoverage => "rotation_coverage",
            Self::Availability => "availability",
            Self::Continuity => "continuity",
            Self::Equity => "equity",
            Self::Preference => "preference",
        }
    }
}

impl fmt::Display for ConstraintName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConstraintName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown constraint '{s}'"))
    }
}

/// Parameters for one round of candidate generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorParams {
    pub algorithm: Algorithm,
    pub timeout_seconds: f64,
    pub diversification_factor: f64,
    #[serde(default)]
    pub constraint_weights: BTreeMap<ConstraintName, f64>,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Greedy,
            timeout_seconds: 60.0,
            diversification_factor: 0.0,
            constraint_weights: BTreeMap::new(),
        }
    }
}

impl GeneratorParams {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            ..Default::default()
        }
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: f64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_diversification(mut self, factor: f64) -> Self {
        self.diversification_factor = factor;
        self
    }

    pub fn with_weight(mut self, constraint: ConstraintName, weight: f64) -> Self {
        self.constraint_weights.insert(constraint, weight);
        self
    }

    /// Effective weight for a constraint, defaulting to [`DEFAULT_WEIGHT`].
    pub fn weight(&self, constraint: ConstraintName) -> f64 {
        self.constraint_weights
            .get(&constraint)
            .copied()
            .unwrap_or(DEFAULT_WEIGHT)
    }
}

/// A loosely-typed parameter payload as received from an advisory backend.
///
/// Every field is optional and string-keyed; nothing in here is trusted until
/// it has passed `validate_params`. Applying a delta to a `GeneratorParams`
/// produces a fresh instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamsDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diversification_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constraint_weights: BTreeMap<String, f64>,
}

impl ParamsDelta {
    pub fn is_empty(&self) -> bool {
        self.algorithm.is_none()
            && self.timeout_seconds.is_none()
            && self.diversification_factor.is_none()
            && self.constraint_weights.is_empty()
    }
}

impl From<&GeneratorParams> for ParamsDelta {
    fn from(params: &GeneratorParams) -> Self {
        Self {
            algorithm: Some(params.algorithm.as_str().to_string()),
            timeout_seconds: Some(params.timeout_seconds),
            diversification_factor: Some(params.diversification_factor),
            constraint_weights: params
                .constraint_weights
                .iter()
                .map(|(name, weight)| (name.as_str().to_string(), *weight))
                .collect(),
        }
    }
}
