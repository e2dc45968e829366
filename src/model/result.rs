use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{Detection, Format, Severity, ValidationIssue};

/// Overall verdict on a validated rule.
///
/// Derived from the confidence score and the issue list by the scoring
/// policy — never set independently of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Warning,
    Error,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Validation context recorded alongside the verdict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    /// Wall-clock time the validation call took.
    pub validation_time_ms: u64,
    /// Version string reported by the validator that produced the result.
    pub validator_version: String,
    /// SHA-256 fingerprint of the validated content.
    pub content_sha256: String,
}

/// Outcome of validating one detection rule.
///
/// Created at the start of a validation call, mutated only through
/// `add_issue` during that call, finalized by one scoring pass, and returned
/// as an immutable snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// The detection this result judges.
    pub detection_id: Uuid,
    pub format: Format,
    pub status: Status,
    /// How well the rule satisfies its format's requirements, in `[0, 100]`.
    pub confidence_score: f64,
    /// Discovery-ordered issue list.
    pub issues: Vec<ValidationIssue>,
    /// Free-form per-format diagnostics (extracted operators, rule name,
    /// pipeline depth, ...).
    pub format_specific_details: Map<String, Value>,
    pub metadata: ResultMetadata,
}

impl ValidationResult {
    pub fn new(detection: &Detection) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            detection_id: detection.id,
            format: detection.format,
            status: Status::Success,
            confidence_score: 100.0,
            issues: Vec::new(),
            format_specific_details: Map::new(),
            metadata: ResultMetadata::default(),
        }
    }

    /// Append an issue. Score and status are recomputed by the scoring
    /// policy in one pass at the end of the run, not here.
    pub fn add_issue(&mut self, issue: ValidationIssue) {
        tracing::debug!(
            issue_code = %issue.issue_code,
            severity = %issue.severity,
            location = %issue.location,
            "validation issue recorded"
        );
        self.issues.push(issue);
    }

    pub fn detail(&mut self, key: &str, value: impl Into<Value>) {
        self.format_specific_details.insert(key.to_string(), value.into());
    }

    /// Per-severity issue counts.
    pub fn summary(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.severity).or_insert(0) += 1;
        }
        counts
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueKind;
    use pretty_assertions::assert_eq;

    fn make_result() -> ValidationResult {
        let detection = Detection::new("SELECT a FROM events", Format::Qradar);
        ValidationResult::new(&detection)
    }

    #[test]
    fn new_result_starts_clean() {
        let result = make_result();
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.confidence_score, 100.0);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn issues_keep_insertion_order() {
        let mut result = make_result();
        for code in ["QR001", "QR004", "QR005"] {
            result.add_issue(ValidationIssue::semantic(
                "x",
                Severity::Low,
                "query",
                code,
                "y",
            ));
        }
        let codes: Vec<&str> = result.issues.iter().map(|i| i.issue_code.as_str()).collect();
        assert_eq!(codes, vec!["QR001", "QR004", "QR005"]);
    }

    #[test]
    fn summary_counts_by_severity() {
        let mut result = make_result();
        result.add_issue(ValidationIssue::new(
            "a", Severity::High, IssueKind::Structural, "q", "QR001", "r",
        ));
        result.add_issue(ValidationIssue::semantic("b", Severity::Medium, "q", "QR005", "r"));
        result.add_issue(ValidationIssue::semantic("c", Severity::Medium, "q", "QR005", "r"));
        let summary = result.summary();
        assert_eq!(summary.get(&Severity::High), Some(&1));
        assert_eq!(summary.get(&Severity::Medium), Some(&2));
        assert_eq!(summary.get(&Severity::Low), None);
        assert_eq!(result.highest_severity(), Some(Severity::High));
    }

    #[test]
    fn result_serializes_to_json() {
        let mut result = make_result();
        result.detail("pipeline_depth", 3);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["format"], "qradar");
        assert_eq!(json["format_specific_details"]["pipeline_depth"], 3);
    }
}
