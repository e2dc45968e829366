//! Shared confidence scoring.
//!
//! Every validator finalizes its result through one `ScoringPolicy` so the
//! score→status mapping is identical across formats. Formats that weight
//! penalties by which required field failed (Palo Alto, CrowdStrike) supply
//! a per-field weight table; everyone else uses the flat severity table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{IssueKind, Severity, Status, ValidationIssue, ValidationResult};

/// Score at or above which a result is `SUCCESS`.
pub const SUCCESS_THRESHOLD: f64 = 95.0;
/// Score at or above which a result is `WARNING`; below is `ERROR`.
pub const WARNING_THRESHOLD: f64 = 70.0;

/// Flat per-severity penalty table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityWeights {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for SeverityWeights {
    fn default() -> Self {
        Self { high: 20.0, medium: 10.0, low: 5.0 }
    }
}

impl SeverityWeights {
    fn penalty(&self, severity: Severity) -> f64 {
        match severity {
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
        }
    }

    /// Multiplier applied to a field weight when a per-field table is in use.
    fn field_multiplier(severity: Severity) -> f64 {
        match severity {
            Severity::High => 1.0,
            Severity::Medium => 0.5,
            Severity::Low => 0.2,
        }
    }
}

/// Maps an issue sequence to a confidence score and derived status.
#[derive(Debug, Clone, Default)]
pub struct ScoringPolicy {
    severity_weights: SeverityWeights,
    field_weights: Option<HashMap<String, f64>>,
}

impl ScoringPolicy {
    /// Flat severity-weighted policy (most formats).
    pub fn flat() -> Self {
        Self::default()
    }

    /// Policy that weights penalties by which field the issue anchors to.
    /// Issues whose location is not in the table fall back to the flat
    /// severity weights.
    pub fn with_field_weights(field_weights: HashMap<String, f64>) -> Self {
        Self {
            severity_weights: SeverityWeights::default(),
            field_weights: Some(field_weights),
        }
    }

    fn penalty(&self, issue: &ValidationIssue) -> f64 {
        // Policy-kind issues are orchestrator annotations, not defects.
        if issue.kind == IssueKind::Policy {
            return 0.0;
        }
        if let Some(table) = &self.field_weights {
            if let Some(weight) = table.get(&issue.location) {
                return weight * SeverityWeights::field_multiplier(issue.severity);
            }
        }
        self.severity_weights.penalty(issue.severity)
    }

    /// Compute the confidence score and derived status for an issue set.
    ///
    /// The score starts at 100 and loses a weighted penalty per issue,
    /// clamped to `[0, 100]`. Any HIGH-severity structural issue forces
    /// `Status::Error` regardless of the numeric score.
    pub fn score(&self, issues: &[ValidationIssue]) -> (f64, Status) {
        let mut score = 100.0;
        for issue in issues {
            score -= self.penalty(issue);
        }
        score = score.clamp(0.0, 100.0);

        let structural_failure = issues
            .iter()
            .any(|i| i.kind == IssueKind::Structural && i.severity == Severity::High);

        let status = if structural_failure || score < WARNING_THRESHOLD {
            Status::Error
        } else if score < SUCCESS_THRESHOLD {
            Status::Warning
        } else {
            Status::Success
        };

        (score, status)
    }

    /// One-shot scoring pass over a result's accumulated issues.
    pub fn finalize(&self, result: &mut ValidationResult) {
        let (score, status) = self.score(&result.issues);
        result.confidence_score = score;
        result.status = status;
    }
}
