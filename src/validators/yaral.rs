use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{FormatValidator, ValidationContext, ValidatorInfo};
use crate::config::YaralConfig;
use crate::error::Result;
use crate::model::{Detection, Format, Severity, ValidationIssue, ValidationResult};
use crate::scoring::ScoringPolicy;

static RULE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*rule\s+([A-Za-z0-9_]+)\s*\{.*\}\s*$").unwrap());

static STRING_DEF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\$[A-Za-z0-9_]+)\s*=").unwrap());

static META_VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([a-zA-Z_][a-zA-Z0-9_]*)\s*[:=]\s*"([^"]*)""#).unwrap());

static BOOLEAN_OPERATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(and|or|not)\b").unwrap());

static FUNCTION_CALL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+\(").unwrap());

const SECTION_LABELS: &[&str] = &["meta:", "strings:", "events:", "condition:"];

const REQUIRED_META_FIELDS: &[&str] = &["author", "description", "severity", "reference"];

const VALID_SEVERITIES: &[&str] = &["low", "medium", "high", "critical"];

fn section<'a>(content: &'a str, label: &str) -> Option<&'a str> {
    let start = content.find(label)? + label.len();
    let rest = &content[start..];
    let end = SECTION_LABELS
        .iter()
        .filter(|l| **l != label)
        .filter_map(|l| rest.find(l))
        .min()
        .unwrap_or_else(|| rest.rfind('}').unwrap_or(rest.len()));
    Some(&rest[..end])
}

/// Operator and function-call count of a condition expression.
fn condition_complexity(condition: &str) -> usize {
    let operators = BOOLEAN_OPERATOR_RE.find_iter(condition).count();
    let calls = FUNCTION_CALL_RE.find_iter(condition).count();
    operators + calls
}

/// Chronicle YARA-L rule validator.
pub struct YaralValidator {
    config: YaralConfig,
    policy: ScoringPolicy,
}

impl YaralValidator {
    pub fn new(config: YaralConfig) -> Self {
        Self { config, policy: ScoringPolicy::flat() }
    }

    fn check_meta(&self, content: &str, result: &mut ValidationResult) {
        let Some(meta) = section(content, "meta:") else {
            result.add_issue(ValidationIssue::semantic(
                "Missing meta section",
                Severity::High,
                "meta",
                "YARAL002",
                "Add a meta section with required fields: author, description, severity, reference",
            ));
            return;
        };

        for field in REQUIRED_META_FIELDS {
            if !has_meta_field(meta, field) {
                result.add_issue(ValidationIssue::semantic(
                    format!("Missing required meta field: {field}"),
                    Severity::High,
                    format!("meta.{field}"),
                    "YARAL003",
                    format!("Add required field '{field}' to the meta section"),
                ));
            }
        }

        if let Some(severity) = meta_value(meta, "severity") {
            if !VALID_SEVERITIES.contains(&severity.to_lowercase().trim()) {
                result.add_issue(ValidationIssue::semantic(
                    format!("Invalid severity value: {severity}"),
                    Severity::Medium,
                    "meta.severity",
                    "YARAL004",
                    "Use valid severity values: low, medium, high, critical",
                ));
            }
        }
    }

    fn check_strings(&self, content: &str, result: &mut ValidationResult) -> usize {
        let Some(strings) = section(content, "strings:").or_else(|| section(content, "events:"))
        else {
            return 0;
        };

        let mut identifiers = BTreeSet::new();
        for line in strings.lines() {
            let Some(capture) = STRING_DEF_RE.captures(line) else {
                continue;
            };
            let identifier = capture[1].to_string();
            if !identifiers.insert(identifier.clone()) {
                result.add_issue(ValidationIssue::semantic(
                    format!("Duplicate string identifier: {identifier}"),
                    Severity::High,
                    format!("strings.{identifier}"),
                    "YARAL005",
                    "Use unique identifiers for string definitions",
                ));
            }
        }

        identifiers.len()
    }

    fn check_condition(&self, content: &str, result: &mut ValidationResult) -> usize {
        let Some(condition) = section(content, "condition:") else {
            result.add_issue(ValidationIssue::semantic(
                "Missing condition section",
                Severity::High,
                "condition",
                "YARAL007",
                "Add a condition section with detection logic",
            ));
            return 0;
        };
        let condition = condition.trim();

        if condition.is_empty() {
            result.add_issue(ValidationIssue::semantic(
                "Missing condition section",
                Severity::High,
                "condition",
                "YARAL007",
                "Add a condition section with detection logic",
            ));
            return 0;
        }

        let complexity = condition_complexity(condition);
        if complexity > self.config.max_condition_complexity {
            result.add_issue(ValidationIssue::semantic(
                format!(
                    "Condition logic too complex: {complexity} exceeds ceiling of {}",
                    self.config.max_condition_complexity
                ),
                Severity::Medium,
                "condition",
                "YARAL009",
                "Simplify condition logic or split into multiple rules",
            ));
        }

        complexity
    }
}

fn has_meta_field(meta: &str, field: &str) -> bool {
    meta.lines().any(|line| {
        let trimmed = line.trim_start();
        trimmed
            .strip_prefix(field)
            .map(|rest| rest.trim_start().starts_with([':', '=']))
            .unwrap_or(false)
    })
}

fn meta_value<'a>(meta: &'a str, field: &str) -> Option<&'a str> {
    META_VALUE_RE
        .captures_iter(meta)
        .find(|c| &c[1] == field)
        .map(|c| c.get(2).map_or("", |m| m.as_str()))
}

impl FormatValidator for YaralValidator {
    fn info(&self) -> ValidatorInfo {
        ValidatorInfo { format: Format::Yaral, name: "yara-l", version: "1.0.0" }
    }

    fn validate(&self, ctx: &ValidationContext, detection: &Detection) -> Result<ValidationResult> {
        let mut result = ValidationResult::new(detection);
        result.metadata.validator_version = self.info().version.to_string();
        let content = detection.content.as_str();

        let Some(capture) = RULE_RE.captures(content) else {
            result.add_issue(ValidationIssue::structural(
                "Invalid YARA-L rule syntax",
                Severity::High,
                "rule",
                "YARAL001",
                "Ensure rule follows basic YARA-L syntax: rule rule_name { ... }",
            ));
            self.policy.finalize(&mut result);
            return Ok(result);
        };
        let rule_name = capture[1].to_string();

        ctx.checkpoint()?;

        self.check_meta(content, &mut result);
        let string_count = self.check_strings(content, &mut result);
        let complexity = self.check_condition(content, &mut result);

        result.detail("rule_name", rule_name);
        result.detail("has_strings", string_count > 0);
        result.detail("condition_complexity", complexity);

        self.policy.finalize(&mut result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;

    const VALID_RULE: &str = r#"
rule suspicious_logon_burst
{
    meta:
        author = "detections team"
        description = "Repeated failed logons followed by success"
        severity = "high"
        reference = "https://example.com/playbooks/logon-burst"
    strings:
        $fail = "4625"
        $success = "4624"
    condition:
        $fail and $success
}
"#;

    fn validate(content: &str) -> ValidationResult {
        validate_with(content, YaralConfig::default())
    }

    fn validate_with(content: &str, config: YaralConfig) -> ValidationResult {
        let validator = YaralValidator::new(config);
        let detection = Detection::new(content, Format::Yaral);
        validator.validate(&ValidationContext::unbounded(), &detection).unwrap()
    }

    #[test]
    fn complete_rule_passes() {
        let result = validate(VALID_RULE);
        assert!(result.issues.is_empty(), "unexpected issues: {:?}", result.issues);
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.format_specific_details["has_strings"], true);
    }

    #[test]
    fn missing_rule_block_is_structural_error() {
        let result = validate("meta: author = \"x\"");
        assert_eq!(result.issues[0].issue_code, "YARAL001");
        assert_eq!(result.status, Status::Error);
    }

    #[test]
    fn missing_meta_section_is_high() {
        let result = validate("rule r { strings: $a = \"x\" condition: $a }");
        let issue = result.issues.iter().find(|i| i.issue_code == "YARAL002").unwrap();
        assert_eq!(issue.severity, Severity::High);
    }

    #[test]
    fn each_missing_meta_field_reported() {
        let rule = r#"
rule r
{
    meta:
        author = "someone"
    strings:
        $a = "x"
    condition:
        $a
}
"#;
        let result = validate(rule);
        let missing: Vec<&str> = result
            .issues
            .iter()
            .filter(|i| i.issue_code == "YARAL003")
            .map(|i| i.location.as_str())
            .collect();
        assert_eq!(missing, vec!["meta.description", "meta.severity", "meta.reference"]);
    }

    #[test]
    fn invalid_severity_value_is_medium() {
        let rule = VALID_RULE.replace("severity = \"high\"", "severity = \"urgent\"");
        let result = validate(&rule);
        let issue = result.issues.iter().find(|i| i.issue_code == "YARAL004").unwrap();
        assert_eq!(issue.severity, Severity::Medium);
    }

    #[test]
    fn duplicate_string_identifiers_flagged_high() {
        let rule = VALID_RULE.replace("$success = \"4624\"", "$fail = \"4624\"");
        let result = validate(&rule);
        let issue = result.issues.iter().find(|i| i.issue_code == "YARAL005").unwrap();
        assert_eq!(issue.severity, Severity::High);
        assert!(issue.message.contains("$fail"));
    }

    #[test]
    fn complexity_ceiling_produces_medium_warning() {
        let config = YaralConfig { max_condition_complexity: 3 };
        let rule = VALID_RULE.replace(
            "$fail and $success",
            "$fail and $success and not count($fail) or count($success)",
        );
        let result = validate_with(&rule, config);
        let issue = result.issues.iter().find(|i| i.issue_code == "YARAL009").unwrap();
        assert_eq!(issue.severity, Severity::Medium);
    }

    #[test]
    fn missing_condition_is_high() {
        let rule = r#"
rule r
{
    meta:
        author = "a"
        description = "d"
        severity = "low"
        reference = "r"
    strings:
        $a = "x"
}
"#;
        let result = validate(rule);
        assert!(result.issues.iter().any(|i| i.issue_code == "YARAL007"));
    }
}
