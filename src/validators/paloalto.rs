use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{FormatValidator, ValidationContext, ValidatorInfo};
use crate::error::Result;
use crate::model::{Detection, Format, Severity, ValidationIssue, ValidationResult};
use crate::scoring::ScoringPolicy;

static FIELD_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*([a-z_]+)\s*[:=]\s*(.+?)\s*;?\s*$").unwrap());

/// Required fields and the pattern each value must satisfy.
static REQUIRED_FIELD_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("rule_name", r"^[a-zA-Z0-9-_]{1,64}$"),
        (
            "log_type",
            r"^(traffic|threat|url|data|wildfire|tunnel|auth|sctp|hip|userid|gtp|iptag|decryption)$",
        ),
        ("description", r"^.{1,1024}$"),
        ("severity", r"^(informational|low|medium|high|critical)$"),
        ("source_zone", r"^[a-zA-Z0-9-_]{1,31}$"),
        ("destination_zone", r"^[a-zA-Z0-9-_]{1,31}$"),
        ("source_address", r"^(?:\d{1,3}\.){3}\d{1,3}(?:/\d{1,2})?$|^any$"),
        ("destination_address", r"^(?:\d{1,3}\.){3}\d{1,3}(?:/\d{1,2})?$|^any$"),
        ("application", r"^[a-zA-Z0-9-_]{1,32}$"),
        ("service", r"^(tcp|udp|icmp|application-default|any)$"),
    ]
    .into_iter()
    .map(|(field, pattern)| (field, Regex::new(pattern).unwrap()))
    .collect()
});

/// Penalty weight per required field; the ten weights sum to 100 so a rule
/// missing everything bottoms out.
fn field_weights() -> HashMap<String, f64> {
    [
        ("rule_name", 10.0),
        ("log_type", 15.0),
        ("description", 5.0),
        ("severity", 10.0),
        ("source_zone", 8.0),
        ("destination_zone", 8.0),
        ("source_address", 12.0),
        ("destination_address", 12.0),
        ("application", 10.0),
        ("service", 10.0),
    ]
    .into_iter()
    .map(|(field, weight)| (field.to_string(), weight))
    .collect()
}

/// Palo Alto Networks rule validator.
///
/// Rules are line-oriented `field: value` (or `field = value`) pairs; each
/// required field is matched against its own pattern and penalized by a
/// per-field weight rather than the flat severity table.
pub struct PaloAltoValidator {
    policy: ScoringPolicy,
}

impl PaloAltoValidator {
    pub fn new() -> Self {
        Self { policy: ScoringPolicy::with_field_weights(field_weights()) }
    }

    fn extract_fields(content: &str) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        for capture in FIELD_LINE_RE.captures_iter(content) {
            let name = capture[1].to_string();
            let value = capture[2].trim_matches(|c| c == '"' || c == '\'').to_string();
            fields.entry(name).or_insert(value);
        }
        fields
    }
}

impl Default for PaloAltoValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatValidator for PaloAltoValidator {
    fn info(&self) -> ValidatorInfo {
        ValidatorInfo { format: Format::Paloalto, name: "paloalto", version: "1.0.0" }
    }

    fn validate(&self, ctx: &ValidationContext, detection: &Detection) -> Result<ValidationResult> {
        let mut result = ValidationResult::new(detection);
        result.metadata.validator_version = self.info().version.to_string();

        let fields = Self::extract_fields(&detection.content);
        ctx.checkpoint()?;

        for (field, pattern) in REQUIRED_FIELD_PATTERNS.iter() {
            // log_type has its own issue codes and stays HIGH even when
            // present-but-invalid.
            let is_log_type = *field == "log_type";
            match fields.get(*field) {
                None if is_log_type => {
                    result.add_issue(ValidationIssue::semantic(
                        "Missing required log type",
                        Severity::High,
                        "log_type",
                        "PA001",
                        "Specify a valid log type (traffic, threat, url, ...)",
                    ));
                }
                None => {
                    result.add_issue(ValidationIssue::semantic(
                        format!("Missing required field: {field}"),
                        Severity::High,
                        *field,
                        "PA003",
                        format!("Add the required field: {field}"),
                    ));
                }
                Some(value) if !pattern.is_match(value) => {
                    if is_log_type {
                        result.add_issue(ValidationIssue::semantic(
                            format!("Invalid log type specified: {value}"),
                            Severity::High,
                            "log_type",
                            "PA002",
                            "Use one of the supported log types: traffic, threat, url, data, \
                             wildfire, tunnel, auth, sctp, hip, userid, gtp, iptag, decryption",
                        ));
                    } else {
                        result.add_issue(ValidationIssue::semantic(
                            format!("Invalid format for field: {field}"),
                            Severity::Medium,
                            *field,
                            "PA004",
                            format!("Update '{field}' to match the pattern: {}", pattern.as_str()),
                        ));
                    }
                }
                Some(_) => {}
            }
        }

        if let Some(rule_name) = fields.get("rule_name") {
            result.detail("rule_name", rule_name.clone());
        }
        result.detail("extracted_fields", fields.len());

        self.policy.finalize(&mut result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;

    const VALID_RULE: &str = r#"
rule_name: block-outbound-telnet
log_type: traffic
description: Blocks outbound telnet sessions from user zones
severity: high
source_zone: trust
destination_zone: untrust
source_address: 10.0.0.0/8
destination_address: any
application: telnet
service: tcp
"#;

    fn validate(content: &str) -> ValidationResult {
        let validator = PaloAltoValidator::new();
        let detection = Detection::new(content, Format::Paloalto);
        validator.validate(&ValidationContext::unbounded(), &detection).unwrap()
    }

    #[test]
    fn complete_rule_scores_full_confidence() {
        let result = validate(VALID_RULE);
        assert!(result.issues.is_empty(), "unexpected issues: {:?}", result.issues);
        assert_eq!(result.confidence_score, 100.0);
        assert_eq!(result.status, Status::Success);
    }

    #[test]
    fn missing_field_penalized_by_its_weight() {
        let content = VALID_RULE.replace("application: telnet\n", "");
        let result = validate(&content);
        let issue = result.issues.iter().find(|i| i.issue_code == "PA003").unwrap();
        assert_eq!(issue.location, "application");
        // HIGH on a weight-10 field: full weight.
        assert_eq!(result.confidence_score, 90.0);
        assert_eq!(result.status, Status::Warning);
    }

    #[test]
    fn malformed_field_penalized_at_half_weight() {
        let content = VALID_RULE.replace("severity: high", "severity: urgent");
        let result = validate(&content);
        let issue = result.issues.iter().find(|i| i.issue_code == "PA004").unwrap();
        assert_eq!(issue.location, "severity");
        // MEDIUM on a weight-10 field: half weight.
        assert_eq!(result.confidence_score, 95.0);
    }

    #[test]
    fn invalid_log_type_is_high() {
        let content = VALID_RULE.replace("log_type: traffic", "log_type: netflow");
        let result = validate(&content);
        let issue = result.issues.iter().find(|i| i.issue_code == "PA002").unwrap();
        assert_eq!(issue.severity, Severity::High);
        // HIGH on the weight-15 log_type field.
        assert_eq!(result.confidence_score, 85.0);
    }

    #[test]
    fn empty_rule_bottoms_out() {
        let result = validate("not a palo alto rule at all");
        assert_eq!(result.confidence_score, 0.0);
        assert_eq!(result.status, Status::Error);
    }

    #[test]
    fn cidr_and_any_addresses_accepted() {
        let content = VALID_RULE
            .replace("source_address: 10.0.0.0/8", "source_address: 192.168.1.5")
            .replace("destination_address: any", "destination_address: 172.16.0.0/12");
        let result = validate(&content);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn equals_separator_also_accepted() {
        let content = VALID_RULE.replace(": ", " = ");
        let result = validate(&content);
        assert!(result.issues.is_empty(), "unexpected issues: {:?}", result.issues);
    }
}
