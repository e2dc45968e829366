use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a single validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Which validation phase produced an issue.
///
/// Structural issues mean the content does not have the declared format's
/// shape at all; a HIGH structural issue forces `Status::Error` regardless
/// of the numeric score. Policy issues are appended by the orchestrator
/// after scoring (e.g. the low-confidence annotation) and carry no penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Structural,
    Semantic,
    Policy,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Structural => write!(f, "structural"),
            Self::Semantic => write!(f, "semantic"),
            Self::Policy => write!(f, "policy"),
        }
    }
}

/// A single reported problem with a rule.
///
/// Append-only within a validation run; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Human-readable description of the problem.
    pub message: String,
    pub severity: Severity,
    pub kind: IssueKind,
    /// Path-like string identifying where in the rule the issue occurs,
    /// e.g. `"detection.condition"` or `"strings.$a"`.
    pub location: String,
    /// Stable, format-prefixed identifier, e.g. `"SIGMA003"`.
    pub issue_code: String,
    /// Actionable suggestion for fixing the problem.
    pub remediation: String,
    pub timestamp: DateTime<Utc>,
}

impl ValidationIssue {
    pub fn new(
        message: impl Into<String>,
        severity: Severity,
        kind: IssueKind,
        location: impl Into<String>,
        issue_code: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            severity,
            kind,
            location: location.into(),
            issue_code: issue_code.into(),
            remediation: remediation.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn structural(
        message: impl Into<String>,
        severity: Severity,
        location: impl Into<String>,
        issue_code: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self::new(message, severity, IssueKind::Structural, location, issue_code, remediation)
    }

    pub fn semantic(
        message: impl Into<String>,
        severity: Severity,
        location: impl Into<String>,
        issue_code: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self::new(message, severity, IssueKind::Semantic, location, issue_code, remediation)
    }
}
