//! rulegate — multi-format validation engine for security detection rules.
//!
//! Judges a candidate rule against the grammar and semantics of its declared
//! detection language — Splunk SPL, QRadar AQL, SIGMA, Azure KQL, Palo Alto
//! Networks, CrowdStrike, YARA, and YARA-L — and assigns a confidence score
//! usable for automated accept/reject decisions. Rules with problems come
//! back as issue-laden results; only engine-level conditions (unsupported
//! format, timeout, cancellation) surface as errors.
//!
//! # Quick Start
//!
//! ```no_run
//! use rulegate::{validate, Format};
//!
//! let result = validate("rule demo { condition: true }", Format::Yara).unwrap();
//! println!("{} (confidence {:.1})", result.status, result.confidence_score);
//! for issue in &result.issues {
//!     println!("  [{}] {}: {}", issue.severity, issue.issue_code, issue.message);
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod output;
pub mod scoring;
pub mod validators;

pub use config::EngineConfig;
pub use engine::{Engine, ValidateOptions, ValidatorRegistry};
pub use error::{EngineError, Result};
pub use model::{
    Detection, Format, IssueKind, Severity, Status, ValidationIssue, ValidationResult,
};
pub use output::OutputFormat;
pub use scoring::ScoringPolicy;
pub use validators::{CancelToken, FormatValidator, ValidationContext};

/// Validate one rule with a default-configured engine.
///
/// Callers issuing more than a handful of validations should build an
/// [`Engine`] once and reuse it.
pub fn validate(content: &str, format: Format) -> Result<ValidationResult> {
    let engine = Engine::with_defaults()?;
    engine.validate(&Detection::new(content, format))
}

/// Validate a batch of rules with a default-configured engine, returning one
/// outcome per input in the same order.
pub fn validate_batch(detections: &[Detection]) -> Result<Vec<Result<ValidationResult>>> {
    let engine = Engine::with_defaults()?;
    Ok(engine.validate_batch(detections))
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .try_init();
    }

    const MINIMAL_SIGMA: &str = r#"
title: Failed logon burst
description: Detects repeated failed logons
logsource:
  product: windows
  service: security
detection:
  selection:
    EventID: 4625
  condition: selection
"#;

    #[test]
    fn minimal_sigma_rule_is_full_confidence_success() {
        init_tracing();
        let result = validate(MINIMAL_SIGMA, Format::Sigma).unwrap();
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.confidence_score, 100.0);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn sigma_rule_missing_detection_errors() {
        let content = r#"
title: Incomplete
description: no detection section
logsource:
  product: windows
  service: security
"#;
        let result = validate(content, Format::Sigma).unwrap();
        assert_eq!(result.status, Status::Error);
        let issue = &result.issues[0];
        assert_eq!(issue.message, "Missing required field: detection");
        assert_eq!(issue.severity, Severity::High);
    }

    #[test]
    fn yara_duplicate_string_identifier_is_single_medium() {
        let content = r#"
rule dup
{
    strings:
        $a = "one"
        $a = "two"
    condition:
        any of them
}
"#;
        let result = validate(content, Format::Yara).unwrap();
        let duplicates: Vec<_> = result
            .issues
            .iter()
            .filter(|i| i.message == "Duplicate string identifier: $a")
            .collect();
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].severity, Severity::Medium);
    }

    #[test]
    fn qradar_from_after_where_caps_confidence() {
        let result =
            validate("SELECT a FROM events WHERE x=1 GROUP BY a FROM events", Format::Qradar)
                .unwrap();
        assert!(result
            .issues
            .iter()
            .any(|i| i.severity == Severity::High && i.message.contains("clause ordering")));
        assert!(result.confidence_score <= 80.0);
        assert_eq!(result.status, Status::Error);
    }

    #[test]
    fn crowdstrike_bad_technique_id_is_medium() {
        let content = serde_json::json!({
            "format_version": "1.0",
            "event_type": "Process",
            "detection_name": "test",
            "severity": "High",
            "description": "d",
            "mitre_attack": [{"technique_id": "TX123"}]
        })
        .to_string();
        let result = validate(&content, Format::Crowdstrike).unwrap();
        let issue = result
            .issues
            .iter()
            .find(|i| i.message == "Invalid MITRE ATT&CK technique ID: TX123")
            .unwrap();
        assert_eq!(issue.severity, Severity::Medium);
    }

    #[test]
    fn batch_isolates_the_malformed_entry() {
        let engine = Engine::with_defaults().unwrap();
        let good = serde_json::json!({
            "format_version": "1.0",
            "event_type": "Process",
            "detection_name": "ok",
            "severity": "Low",
            "description": "d",
            "mitre_attack": [{"technique_id": "T1059"}]
        })
        .to_string();

        let mut detections: Vec<Detection> =
            (0..9).map(|_| Detection::new(good.clone(), Format::Crowdstrike)).collect();
        detections.insert(4, Detection::new("{broken json", Format::Crowdstrike));

        let outcomes = engine.validate_batch(&detections);
        assert_eq!(outcomes.len(), 10);

        for (index, outcome) in outcomes.iter().enumerate() {
            let result = outcome.as_ref().unwrap();
            if index == 4 {
                assert_eq!(result.status, Status::Error);
                assert!(result.issues.iter().any(|i| i.issue_code == "CS001"));
            } else {
                assert_eq!(result.status, Status::Success);
                assert!(result.issues.is_empty());
            }
        }
    }

    #[test]
    fn validation_is_idempotent_modulo_timestamps() {
        let engine = Engine::with_defaults().unwrap();
        let detection = Detection::new(MINIMAL_SIGMA, Format::Sigma);

        let first = engine.validate(&detection).unwrap();
        let second = engine.validate(&detection).unwrap();

        assert_eq!(first.confidence_score, second.confidence_score);
        assert_eq!(first.status, second.status);
        assert_eq!(first.metadata.content_sha256, second.metadata.content_sha256);
        let codes = |r: &ValidationResult| {
            r.issues.iter().map(|i| i.issue_code.clone()).collect::<Vec<_>>()
        };
        assert_eq!(codes(&first), codes(&second));
    }

    #[test]
    fn engine_errors_are_distinct_from_content_problems() {
        let engine = Engine::with_defaults().unwrap();

        // Content problem: an Ok result carrying issues.
        let garbage = engine.validate(&Detection::new("{nope", Format::Crowdstrike)).unwrap();
        assert_eq!(garbage.status, Status::Error);

        // Engine problem: a typed error from an empty registry.
        let empty = Engine::new(
            std::sync::Arc::new(ValidatorRegistry::new()),
            EngineConfig::default(),
        );
        let err = empty.validate(&Detection::new("{}", Format::Crowdstrike)).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFormat(_)));
    }

    #[test]
    fn every_format_round_trips_through_the_engine() {
        let engine = Engine::with_defaults().unwrap();
        let samples = [
            (Format::Splunk, "search index=web status=500 | stats count by user"),
            (Format::Qradar, "SELECT sourceip FROM events WHERE severity > 5"),
            (Format::Sigma, MINIMAL_SIGMA),
            (Format::Kql, "SecurityEvent | where TimeGenerated > ago(1h)"),
            (Format::Yara, "rule sample { strings: $a = \"x\" condition: $a }"),
            (Format::Yaral, "rule sample { meta: author = \"a\"\n description = \"d\"\n severity = \"low\"\n reference = \"r\"\n strings: $a = \"x\"\n condition: $a }"),
        ];

        for (format, content) in samples {
            let result = engine.validate(&Detection::new(content, format)).unwrap();
            assert_eq!(result.format, format);
            // Serializes cleanly for the caller's transport layer.
            let json = serde_json::to_string(&result).unwrap();
            let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed["format"], format.to_string());
        }
    }
}
