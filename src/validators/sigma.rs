use serde::Deserialize;

use super::{FormatValidator, ValidationContext, ValidatorInfo};
use crate::error::Result;
use crate::model::{Detection, Format, Severity, ValidationIssue, ValidationResult};
use crate::scoring::ScoringPolicy;

/// Top-level SIGMA document. `deny_unknown_fields` gives the strict decode:
/// a rule carrying keys outside the SIGMA specification fails structurally.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(dead_code)]
struct SigmaDocument {
    title: Option<String>,
    description: Option<String>,
    logsource: Option<Logsource>,
    detection: Option<serde_yaml::Mapping>,
    id: Option<serde_yaml::Value>,
    status: Option<serde_yaml::Value>,
    references: Option<serde_yaml::Value>,
    author: Option<serde_yaml::Value>,
    date: Option<serde_yaml::Value>,
    modified: Option<serde_yaml::Value>,
    tags: Option<serde_yaml::Value>,
    level: Option<serde_yaml::Value>,
    license: Option<serde_yaml::Value>,
    related: Option<serde_yaml::Value>,
    fields: Option<serde_yaml::Value>,
    falsepositives: Option<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Logsource {
    product: Option<String>,
    service: Option<String>,
    category: Option<String>,
    definition: Option<String>,
}

/// Detection keys that are not search identifiers.
const NON_IDENTIFIER_KEYS: &[&str] = &["condition", "timeframe"];

/// SIGMA generic detection rule validator.
pub struct SigmaValidator {
    policy: ScoringPolicy,
}

impl SigmaValidator {
    pub fn new() -> Self {
        Self { policy: ScoringPolicy::flat() }
    }

    fn check_required_fields(&self, doc: &SigmaDocument, result: &mut ValidationResult) {
        let required: [(&str, bool); 4] = [
            ("title", doc.title.is_some()),
            ("description", doc.description.is_some()),
            ("logsource", doc.logsource.is_some()),
            ("detection", doc.detection.is_some()),
        ];

        for (field, present) in required {
            if !present {
                // A document without its required sections does not have the
                // SIGMA shape at all, so this counts as structural.
                result.add_issue(ValidationIssue::structural(
                    format!("Missing required field: {field}"),
                    Severity::High,
                    field,
                    "SIGMA003",
                    format!("Add the required {field} field to the detection"),
                ));
            }
        }
    }

    fn check_logsource(&self, logsource: &Logsource, result: &mut ValidationResult) {
        let required: [(&str, bool); 2] = [
            ("product", logsource.product.is_some()),
            ("service", logsource.service.is_some()),
        ];

        for (field, present) in required {
            if !present {
                result.add_issue(ValidationIssue::semantic(
                    format!("Missing logsource {field} field"),
                    Severity::Medium,
                    format!("logsource.{field}"),
                    "SIGMA004",
                    format!("Specify the {field} in the logsource configuration"),
                ));
            }
        }
    }

    fn check_detection(&self, detection: &serde_yaml::Mapping, result: &mut ValidationResult) {
        let condition = detection
            .iter()
            .find(|(key, _)| key.as_str() == Some("condition"))
            .and_then(|(_, value)| value.as_str());
        if condition.map(str::trim).unwrap_or("").is_empty() {
            result.add_issue(ValidationIssue::semantic(
                "Missing or empty detection condition",
                Severity::High,
                "detection.condition",
                "SIGMA005",
                "Add a valid detection condition",
            ));
        }

        let mut identifier_count = 0usize;
        for (key, value) in detection {
            let Some(name) = key.as_str() else { continue };
            if NON_IDENTIFIER_KEYS.contains(&name) {
                continue;
            }
            identifier_count += 1;
            self.check_search_identifier(name, value, result);
        }

        if identifier_count == 0 {
            result.add_issue(ValidationIssue::semantic(
                "No search identifiers found in detection",
                Severity::High,
                "detection",
                "SIGMA006",
                "Add at least one search identifier with detection criteria",
            ));
        }

        result.detail("search_identifiers", identifier_count);
        if let Some(condition) = condition {
            result.detail("condition", condition);
        }
    }

    fn check_search_identifier(
        &self,
        name: &str,
        value: &serde_yaml::Value,
        result: &mut ValidationResult,
    ) {
        let empty = match value {
            serde_yaml::Value::Mapping(map) => map.is_empty(),
            serde_yaml::Value::Sequence(seq) => seq.is_empty(),
            _ => {
                result.add_issue(ValidationIssue::semantic(
                    format!("Invalid search identifier format: {name}"),
                    Severity::Medium,
                    format!("detection.{name}"),
                    "SIGMA007",
                    "Ensure search identifier contains valid field mappings",
                ));
                return;
            }
        };

        if empty {
            result.add_issue(ValidationIssue::semantic(
                format!("Empty search criteria in identifier: {name}"),
                Severity::Medium,
                format!("detection.{name}"),
                "SIGMA008",
                "Add search criteria to the identifier",
            ));
        }
    }
}

impl Default for SigmaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatValidator for SigmaValidator {
    fn info(&self) -> ValidatorInfo {
        ValidatorInfo { format: Format::Sigma, name: "sigma", version: "1.0.0" }
    }

    fn validate(&self, ctx: &ValidationContext, detection: &Detection) -> Result<ValidationResult> {
        let mut result = ValidationResult::new(detection);
        result.metadata.validator_version = self.info().version.to_string();

        let doc: SigmaDocument = match serde_yaml::from_str(&detection.content) {
            Ok(doc) => doc,
            Err(err) => {
                result.add_issue(ValidationIssue::structural(
                    format!("Invalid YAML structure: {err}"),
                    Severity::High,
                    "yaml",
                    "SIGMA001",
                    "Ensure the detection follows valid YAML syntax with only known SIGMA keys",
                ));
                self.policy.finalize(&mut result);
                return Ok(result);
            }
        };

        ctx.checkpoint()?;

        self.check_required_fields(&doc, &mut result);
        if let Some(logsource) = &doc.logsource {
            self.check_logsource(logsource, &mut result);
        }
        if let Some(detection_section) = &doc.detection {
            self.check_detection(detection_section, &mut result);
        }

        if let Some(title) = &doc.title {
            result.detail("title", title.clone());
        }

        self.policy.finalize(&mut result);
        Ok(result)
    }
}
