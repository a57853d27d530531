//! Schema validation for advisory suggestions.
//!
//! Advisory output is untrusted. A suggestion reaches the loop only after it
//! parses into a [`Suggestion`] and passes [`validate_suggestion`]; a parameter
//! payload is applied only as a whole, never partially.

use std::fmt;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::params::{DIVERSIFICATION_RANGE, TIMEOUT_RANGE, WEIGHT_RANGE};
use crate::domain::models::{Algorithm, ConstraintName, GeneratorParams, ParamsDelta, Suggestion};

/// Suggestions below this confidence are discarded.
pub const MIN_CONFIDENCE: f64 = 0.3;

/// Every problem found in a parameter payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamsValidationError {
    pub issues: Vec<String>,
}

impl fmt::Display for ParamsValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.issues.join("; "))
    }
}

impl std::error::Error for ParamsValidationError {}

impl From<ParamsValidationError> for DomainError {
    fn from(err: ParamsValidationError) -> Self {
        DomainError::ValidationFailed(err.to_string())
    }
}

/// Check a parameter payload against the closed algorithm set, the numeric
/// ranges and the closed constraint set. All issues are collected.
pub fn validate_params(delta: &ParamsDelta) -> Result<(), ParamsValidationError> {
    let mut issues = Vec::new();

    if let Some(algorithm) = &delta.algorithm {
        if algorithm.parse::<Algorithm>().is_err() {
            let allowed: Vec<&str> = Algorithm::ALL.iter().map(Algorithm::as_str).collect();
            issues.push(format!(
                "algorithm '{}' is not one of: {}",
                algorithm,
                allowed.join(", ")
            ));
        }
    }

    if let Some(timeout) = delta.timeout_seconds {
        if !TIMEOUT_RANGE.contains(&timeout) {
            issues.push(format!(
                "timeout_seconds {} outside [{}, {}]",
                timeout,
                TIMEOUT_RANGE.start(),
                TIMEOUT_RANGE.end()
            ));
        }
    }

    if let Some(factor) = delta.diversification_factor {
        if !DIVERSIFICATION_RANGE.contains(&factor) {
            issues.push(format!(
                "diversification_factor {} outside [{}, {}]",
                factor,
                DIVERSIFICATION_RANGE.start(),
                DIVERSIFICATION_RANGE.end()
            ));
        }
    }

    for (name, weight) in &delta.constraint_weights {
        if name.parse::<ConstraintName>().is_err() {
            issues.push(format!("unknown constraint '{name}'"));
        }
        if !WEIGHT_RANGE.contains(weight) {
            issues.push(format!(
                "weight for '{}' = {} outside [{}, {}]",
                name,
                weight,
                WEIGHT_RANGE.start(),
                WEIGHT_RANGE.end()
            ));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ParamsValidationError { issues })
    }
}

/// Same rules as [`validate_params`], for an already-typed parameter set.
pub fn validate_generator_params(params: &GeneratorParams) -> Result<(), ParamsValidationError> {
    validate_params(&ParamsDelta::from(params))
}

/// Accept or reject a parsed suggestion as a whole.
pub fn validate_suggestion(suggestion: &Suggestion) -> bool {
    if !(MIN_CONFIDENCE..=1.0).contains(&suggestion.confidence) {
        tracing::debug!(
            confidence = suggestion.confidence,
            "Rejecting suggestion: confidence out of range"
        );
        return false;
    }

    if suggestion.reasoning.trim().is_empty() {
        tracing::debug!("Rejecting suggestion: empty reasoning");
        return false;
    }

    if let Some(params) = &suggestion.params {
        if let Err(err) = validate_params(params) {
            tracing::debug!(error = %err, "Rejecting suggestion: invalid params");
            return false;
        }
    }

    true
}

/// Build the parameters a validated payload describes on top of `base`.
///
/// Fields the payload leaves out keep their value from `base`; weights are
/// merged per constraint.
pub fn apply_params_delta(
    base: &GeneratorParams,
    delta: &ParamsDelta,
) -> Result<GeneratorParams, ParamsValidationError> {
    validate_params(delta)?;

    let mut next = base.clone();
    if let Some(algorithm) = &delta.algorithm {
        next = next.with_algorithm(algorithm.parse().map_err(|e: String| ParamsValidationError {
            issues: vec![e],
        })?);
    }
    if let Some(timeout) = delta.timeout_seconds {
        next = next.with_timeout(timeout);
    }
    if let Some(factor) = delta.diversification_factor {
        next = next.with_diversification(factor);
    }
    for (name, weight) in &delta.constraint_weights {
        let constraint: ConstraintName = name
            .parse()
            .map_err(|e: String| ParamsValidationError { issues: vec![e] })?;
        next = next.with_weight(constraint, *weight);
    }
    Ok(next)
}

/// Parse raw backend text into a suggestion.
///
/// The text must contain one JSON object with the suggestion fields; prose
/// and markdown fences around it are ignored.
pub fn parse_suggestion(response: &str) -> DomainResult<Suggestion> {
    let json = super::extract_json_from_response(response).ok_or_else(|| {
        DomainError::ValidationFailed("No JSON object found in advisory response".to_string())
    })?;

    serde_json::from_str(json).map_err(|e| {
        DomainError::ValidationFailed(format!("Advisory response does not match the suggestion schema: {e}"))
    })
}
