use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::{FormatValidator, ValidationContext, ValidatorInfo};
use crate::error::Result;
use crate::model::{Detection, Format, Severity, ValidationIssue, ValidationResult};
use crate::scoring::ScoringPolicy;

/// Detection format version this validator understands.
const SUPPORTED_FORMAT_VERSION: &str = "1.0";

const VALID_EVENT_TYPES: &[&str] = &[
    "Process", "Network", "File", "Registry", "DNS", "Authentication", "Behavioral",
];

const VALID_SEVERITY_LEVELS: &[&str] = &["Low", "Medium", "High", "Critical"];

const REQUIRED_FIELDS: &[&str] =
    &["event_type", "detection_name", "severity", "description", "mitre_attack"];

static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]{0,63}$").unwrap());

static MITRE_TECHNIQUE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^T\d{4}(\.\d{3})?$").unwrap());

/// Penalty weights keyed by which required field failed.
fn field_weights() -> HashMap<String, f64> {
    [
        ("content", 30.0),
        ("format_version", 10.0),
        ("event_type", 15.0),
        ("detection_name", 10.0),
        ("severity", 10.0),
        ("description", 5.0),
        ("mitre_attack", 10.0),
    ]
    .into_iter()
    .map(|(field, weight)| (field.to_string(), weight))
    .collect()
}

/// CrowdStrike JSON detection rule validator.
pub struct CrowdstrikeValidator {
    policy: ScoringPolicy,
}

impl CrowdstrikeValidator {
    pub fn new() -> Self {
        Self { policy: ScoringPolicy::with_field_weights(field_weights()) }
    }

    fn check_format_version(&self, content: &Value, result: &mut ValidationResult) {
        match content.get("format_version").and_then(Value::as_str) {
            None => {
                result.add_issue(ValidationIssue::semantic(
                    "Missing format version",
                    Severity::High,
                    "format_version",
                    "CS002",
                    format!("Declare format_version \"{SUPPORTED_FORMAT_VERSION}\""),
                ));
            }
            Some(version) if version != SUPPORTED_FORMAT_VERSION => {
                result.add_issue(ValidationIssue::semantic(
                    format!("Unsupported format version: {version}"),
                    Severity::High,
                    "format_version",
                    "CS002",
                    format!("Update detection to use format version {SUPPORTED_FORMAT_VERSION}"),
                ));
            }
            Some(_) => {}
        }
    }

    fn check_required_fields(&self, content: &Value, result: &mut ValidationResult) {
        for field in REQUIRED_FIELDS {
            let missing = match content.get(*field) {
                None | Some(Value::Null) => true,
                _ => false,
            };
            if missing {
                result.add_issue(ValidationIssue::semantic(
                    format!("Missing required field: {field}"),
                    Severity::High,
                    *field,
                    "CS005",
                    format!("Add the required field: {field}"),
                ));
            }
        }
    }

    fn check_enums(&self, content: &Value, result: &mut ValidationResult) {
        if let Some(event_type) = content.get("event_type").and_then(Value::as_str) {
            if !VALID_EVENT_TYPES.contains(&event_type) {
                result.add_issue(ValidationIssue::semantic(
                    format!("Invalid event type: {event_type}"),
                    Severity::High,
                    "event_type",
                    "CS003",
                    format!("Use one of the valid event types: {}", VALID_EVENT_TYPES.join(", ")),
                ));
            }
        }

        if let Some(severity) = content.get("severity").and_then(Value::as_str) {
            if !VALID_SEVERITY_LEVELS.contains(&severity) {
                result.add_issue(ValidationIssue::semantic(
                    format!("Invalid severity level: {severity}"),
                    Severity::High,
                    "severity",
                    "CS004",
                    format!(
                        "Use one of the valid severity levels: {}",
                        VALID_SEVERITY_LEVELS.join(", ")
                    ),
                ));
            }
        }
    }

    fn check_field_mappings(&self, content: &Value, result: &mut ValidationResult) {
        let Some(fields) = content.get("fields") else {
            return;
        };
        let Some(map) = fields.as_object() else {
            result.add_issue(ValidationIssue::semantic(
                "Invalid fields section: expected an object",
                Severity::Medium,
                "fields",
                "CS006",
                "Provide the fields section as an object of field mappings",
            ));
            return;
        };

        for (name, value) in map {
            if !FIELD_NAME_RE.is_match(name) {
                result.add_issue(ValidationIssue::semantic(
                    format!("Invalid field name format: {name}"),
                    Severity::Medium,
                    format!("fields.{name}"),
                    "CS007",
                    "Field names must start with a letter and contain only letters, numbers, \
                     and underscores",
                ));
            }
            self.check_field_value_type(&format!("fields.{name}"), value, result);
        }
    }

    /// Values may be primitives, arrays, or nested objects — nothing else.
    fn check_field_value_type(&self, path: &str, value: &Value, result: &mut ValidationResult) {
        match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {}
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    self.check_field_value_type(&format!("{path}[{index}]"), item, result);
                }
            }
            Value::Object(map) => {
                for (key, nested) in map {
                    self.check_field_value_type(&format!("{path}.{key}"), nested, result);
                }
            }
            Value::Null => {
                result.add_issue(ValidationIssue::semantic(
                    format!("Invalid field value type for {path}"),
                    Severity::Medium,
                    path,
                    "CS008",
                    "Use only supported data types: string, number, boolean, array, or object",
                ));
            }
        }
    }

    fn check_mitre_mapping(&self, content: &Value, result: &mut ValidationResult) {
        let Some(mitre) = content.get("mitre_attack") else {
            return;
        };
        let Some(techniques) = mitre.as_array() else {
            if !mitre.is_null() {
                result.add_issue(ValidationIssue::semantic(
                    "mitre_attack must be an array of technique mappings",
                    Severity::Medium,
                    "mitre_attack",
                    "CS010",
                    "Provide mitre_attack as an array of {technique_id} objects",
                ));
            }
            return;
        };

        for (index, technique) in techniques.iter().enumerate() {
            let Some(id) = technique.get("technique_id").and_then(Value::as_str) else {
                continue;
            };
            if !MITRE_TECHNIQUE_RE.is_match(id) {
                result.add_issue(ValidationIssue::semantic(
                    format!("Invalid MITRE ATT&CK technique ID: {id}"),
                    Severity::Medium,
                    format!("mitre_attack[{index}].technique_id"),
                    "CS009",
                    "Use a valid MITRE ATT&CK technique ID (T#### or T####.###)",
                ));
            }
        }
    }
}

impl Default for CrowdstrikeValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatValidator for CrowdstrikeValidator {
    fn info(&self) -> ValidatorInfo {
        ValidatorInfo { format: Format::Crowdstrike, name: "crowdstrike", version: "1.0.0" }
    }

    fn validate(&self, ctx: &ValidationContext, detection: &Detection) -> Result<ValidationResult> {
        let mut result = ValidationResult::new(detection);
        result.metadata.validator_version = self.info().version.to_string();

        let content: Value = match serde_json::from_str(&detection.content) {
            Ok(Value::Object(map)) => Value::Object(map),
            Ok(_) => {
                result.add_issue(ValidationIssue::structural(
                    "Detection content must be a JSON object",
                    Severity::High,
                    "content",
                    "CS001",
                    "Ensure detection content is a JSON object",
                ));
                self.policy.finalize(&mut result);
                return Ok(result);
            }
            Err(err) => {
                result.add_issue(ValidationIssue::structural(
                    format!("Invalid JSON format in detection content: {err}"),
                    Severity::High,
                    "content",
                    "CS001",
                    "Ensure detection content is valid JSON",
                ));
                self.policy.finalize(&mut result);
                return Ok(result);
            }
        };

        ctx.checkpoint()?;

        self.check_format_version(&content, &mut result);
        self.check_required_fields(&content, &mut result);
        self.check_enums(&content, &mut result);
        self.check_field_mappings(&content, &mut result);
        self.check_mitre_mapping(&content, &mut result);

        if let Some(name) = content.get("detection_name").and_then(Value::as_str) {
            result.detail("detection_name", name);
        }
        if let Some(techniques) = content.get("mitre_attack").and_then(Value::as_array) {
            result.detail("mitre_technique_count", techniques.len());
        }

        self.policy.finalize(&mut result);
        Ok(result)
    }
}
