//! Candidate schedules and their compliance evaluations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// One person placed on one rotation/shift for one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub person_id: String,
    pub date: NaiveDate,
    pub rotation: String,
    pub shift: String,
}

/// A fully specified proposed schedule produced for one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: Uuid,
    pub assignments: Vec<Assignment>,
}

impl Candidate {
    pub fn new(assignments: Vec<Assignment>) -> Self {
        Self {
            id: Uuid::new_v4(),
            assignments,
        }
    }
}

/// How serious a rule violation is.
///
/// Variants are declared in ascending order so the derived `Ord` ranks
/// `Critical` highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A single compliance finding against a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub violation_type: String,
    pub message: String,
    pub severity: Severity,
}

impl Violation {
    pub fn new(violation_type: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            violation_type: violation_type.into(),
            message: message.into(),
            severity,
        }
    }
}

/// Scored, compliance-annotated assessment of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Overall quality in `[0, 1]`.
    pub score: f64,
    /// True when no critical rule is broken.
    pub valid: bool,
    pub critical_violations: u32,
    pub total_violations: u32,
    #[serde(default)]
    pub violations: Vec<Violation>,
}

impl Evaluation {
    /// Build an evaluation whose counts and validity are derived from `violations`.
    pub fn from_violations(score: f64, violations: Vec<Violation>) -> Self {
        let critical = violations
            .iter()
            .filter(|v| v.severity == Severity::Critical)
            .count();
        Self {
            score,
            valid: critical == 0,
            critical_violations: u32::try_from(critical).unwrap_or(u32::MAX),
            total_violations: u32::try_from(violations.len()).unwrap_or(u32::MAX),
            violations,
        }
    }

    /// Strict ordering used for best-of-k selection and global best tracking.
    ///
    /// Higher score wins; on equal score fewer critical violations wins; on
    /// equal both a valid evaluation beats an invalid one. Equal evaluations
    /// are never "better", so the first one seen is kept.
    pub fn is_better_than(&self, other: &Evaluation) -> bool {
        if self.score != other.score {
            return self.score > other.score;
        }
        if self.critical_violations != other.critical_violations {
            return self.critical_violations < other.critical_violations;
        }
        self.valid && !other.valid
    }

    /// Distinct violation kinds observed, sorted.
    pub fn violation_types(&self) -> BTreeSet<String> {
        self.violations
            .iter()
            .map(|v| v.violation_type.clone())
            .collect()
    }

    /// The most severe violation; the earliest one wins ties.
    pub fn top_violation(&self) -> Option<&Violation> {
        self.violations.iter().fold(None, |best, v| match best {
            Some(b) if b.severity >= v.severity => Some(b),
            _ => Some(v),
        })
    }

    /// Deterministic one-paragraph summary built from this evaluation's own fields.
    pub fn summary(&self) -> String {
        let compliance = if self.valid { "compliant" } else { "not compliant" };
        let mut text = format!(
            "Schedule scored {:.3} and is {} with {} violation(s) ({} critical).",
            self.score, compliance, self.total_violations, self.critical_violations
        );
        if let Some(top) = self.top_violation() {
            text.push_str(&format!(
                " Most significant: {}: {}.",
                top.violation_type, top.message
            ));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(score: f64, critical: u32, valid: bool) -> Evaluation {
        Evaluation {
            score,
            valid,
            critical_violations: critical,
            total_violations: critical,
            violations: Vec::new(),
        }
    }

    #[test]
    fn test_higher_score_is_better() {
        assert!(eval(0.8, 3, false).is_better_than(&eval(0.7, 0, true)));
        assert!(!eval(0.7, 0, true).is_better_than(&eval(0.8, 3, false)));
    }

    #[test]
    fn test_tie_breaks_on_critical_then_validity() {
        assert!(eval(0.5, 0, true).is_better_than(&eval(0.5, 1, false)));
        assert!(eval(0.5, 0, true).is_better_than(&eval(0.5, 0, false)));
    }

    #[test]
    fn test_identical_evaluations_are_not_better() {
        let a = eval(0.6, 1, false);
        assert!(!a.is_better_than(&a.clone()));
    }

    #[test]
    fn test_from_violations_derives_counts() {
        let evaluation = Evaluation::from_violations(
            0.4,
            vec![
                Violation::new("eighty_hour_rule", "PGY1-03 worked 84h", Severity::Critical),
                Violation::new("preference", "Requested day off ignored", Severity::Low),
                Violation::new("preference", "Weekend preference ignored", Severity::Low),
            ],
        );
        assert!(!evaluation.valid);
        assert_eq!(evaluation.critical_violations, 1);
        assert_eq!(evaluation.total_violations, 3);
        assert_eq!(evaluation.violation_types().len(), 2);
    }

    #[test]
    fn test_top_violation_prefers_severity_then_order() {
        let evaluation = Evaluation::from_violations(
            0.4,
            vec![
                Violation::new("call_spacing", "first high", Severity::High),
                Violation::new("preference", "low", Severity::Low),
                Violation::new("supervision_ratio", "second high", Severity::High),
            ],
        );
        assert_eq!(evaluation.top_violation().unwrap().message, "first high");
        assert!(Evaluation::from_violations(1.0, vec![]).top_violation().is_none());
    }

    #[test]
    fn test_summary_mentions_top_violation() {
        let evaluation = Evaluation::from_violations(
            0.42,
            vec![Violation::new("eighty_hour_rule", "PGY2-01 at 86h", Severity::Critical)],
        );
        assert_eq!(
            evaluation.summary(),
            "Schedule scored 0.420 and is not compliant with 1 violation(s) (1 critical). \
             Most significant: eighty_hour_rule: PGY2-01 at 86h."
        );

        let clean = Evaluation::from_violations(0.99, vec![]);
        assert_eq!(
            clean.summary(),
            "Schedule scored 0.990 and is compliant with 0 violation(s) (0 critical)."
        );
    }

    #[test]
    fn test_violation_serializes_type_field() {
        let v = Violation::new("one_in_seven", "no day off", Severity::Medium);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["type"], "one_in_seven");
        assert_eq!(json["severity"], "medium");
    }
}
