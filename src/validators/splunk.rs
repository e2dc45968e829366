use once_cell::sync::Lazy;
use regex::Regex;

use super::{closest_candidate, FormatValidator, ValidationContext, ValidatorInfo};
use crate::config::SplunkConfig;
use crate::error::Result;
use crate::model::{Detection, Format, Severity, ValidationIssue, ValidationResult};
use crate::scoring::ScoringPolicy;

static LEADING_COMMAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(\||search\b|index\s*=)").unwrap());

static FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([A-Za-z0-9_.]+)\s*=\s*(?:"[^"]*"|'[^']*'|\S+)"#).unwrap());

static FUNCTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([a-zA-Z_][a-zA-Z0-9_]*)\s*\(").unwrap());

static TIME_RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"earliest\s*=\s*\S+\s+latest\s*=\s*\S+").unwrap());

const SUPPORTED_COMMANDS: &[&str] = &[
    "search", "where", "stats", "eval", "rename", "table", "dedup", "sort", "head", "tail",
    "top", "rare", "fields", "transaction", "rex", "lookup", "timechart",
];

const SUPPORTED_FUNCTIONS: &[&str] = &[
    "count", "sum", "avg", "min", "max", "earliest", "latest", "list", "values", "upper",
    "lower", "len", "substr", "if", "case", "coalesce", "round",
];

/// Pipeline commands that require a companion clause in the same stage.
const COMMAND_DEPENDENCIES: &[(&str, &str)] = &[("stats", "by"), ("rename", "as")];

/// CIM-compliant field names accepted when compliance checking is on.
const CIM_FIELDS: &[&str] = &[
    "src_ip", "dest_ip", "src_port", "dest_port", "user", "process", "index", "sourcetype",
    "earliest", "latest",
];

fn has_word(stage: &str, word: &str) -> bool {
    stage
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .any(|token| token.eq_ignore_ascii_case(word))
}

/// Splunk Search Processing Language validator.
pub struct SplunkValidator {
    config: SplunkConfig,
    policy: ScoringPolicy,
}

impl SplunkValidator {
    pub fn new(config: SplunkConfig) -> Self {
        Self { config, policy: ScoringPolicy::flat() }
    }

    fn check_structure(&self, content: &str, result: &mut ValidationResult) -> bool {
        if !LEADING_COMMAND_RE.is_match(content) {
            result.add_issue(ValidationIssue::structural(
                "Missing or invalid leading search command",
                Severity::High,
                "line:1",
                "SPL001",
                "Start the query with 'search', an 'index=' clause, or a generating '|' command",
            ));
            return false;
        }

        let depth = content.matches('|').count();
        if depth > self.config.max_pipeline_depth {
            result.add_issue(ValidationIssue::structural(
                format!(
                    "Pipeline depth {depth} exceeds maximum allowed ({})",
                    self.config.max_pipeline_depth
                ),
                Severity::Medium,
                format!("pipeline:{depth}"),
                "SPL002",
                "Simplify the search by reducing the number of pipeline stages",
            ));
        }

        true
    }

    fn check_commands(&self, content: &str, result: &mut ValidationResult) -> Vec<String> {
        let mut commands = Vec::new();

        for stage in content.split('|').skip(1) {
            let Some(command) = stage.split_whitespace().next() else {
                continue;
            };
            let command = command.to_lowercase();

            if !SUPPORTED_COMMANDS.contains(&command.as_str()) {
                let remediation = match closest_candidate(&command, SUPPORTED_COMMANDS.iter().copied())
                {
                    Some(suggestion) => format!("Did you mean '{suggestion}'?"),
                    None => "Use only supported SPL commands".to_string(),
                };
                result.add_issue(ValidationIssue::semantic(
                    format!("Unknown SPL command: {command}"),
                    Severity::Medium,
                    format!("command:{command}"),
                    "SPL003",
                    remediation,
                ));
            }

            for (dependent, needs) in COMMAND_DEPENDENCIES {
                if command == *dependent {
                    if !has_word(stage, needs) {
                        result.add_issue(ValidationIssue::semantic(
                            format!("Missing required '{needs}' clause for command '{command}'"),
                            Severity::High,
                            format!("command:{command}"),
                            "SPL004",
                            format!("Add the '{needs}' clause to the '{command}' stage"),
                        ));
                    }
                }
            }

            commands.push(command);
        }

        commands
    }

    fn check_functions(&self, content: &str, result: &mut ValidationResult) -> Vec<String> {
        let mut functions = Vec::new();

        for capture in FUNCTION_RE.captures_iter(content) {
            let name = capture[1].to_lowercase();
            if !SUPPORTED_FUNCTIONS.contains(&name.as_str()) {
                let remediation =
                    match closest_candidate(&name, SUPPORTED_FUNCTIONS.iter().copied()) {
                        Some(suggestion) => format!("Did you mean '{suggestion}'?"),
                        None => "Use only supported SPL functions".to_string(),
                    };
                result.add_issue(ValidationIssue::semantic(
                    format!("Unsupported function: {name}"),
                    Severity::Medium,
                    format!("function:{name}"),
                    "SPL005",
                    remediation,
                ));
            }
            functions.push(name);
        }

        functions
    }

    fn check_cim_fields(&self, content: &str, result: &mut ValidationResult) {
        for capture in FIELD_RE.captures_iter(content) {
            let field = &capture[1];
            if !CIM_FIELDS.contains(&field.to_lowercase().as_str()) {
                result.add_issue(ValidationIssue::semantic(
                    format!("Non-CIM compliant field name: {field}"),
                    Severity::Medium,
                    format!("field:{field}"),
                    "SPL006",
                    "Use CIM-compliant field names for better compatibility",
                ));
            }
        }
    }
}

impl FormatValidator for SplunkValidator {
    fn info(&self) -> ValidatorInfo {
        ValidatorInfo { format: Format::Splunk, name: "splunk-spl", version: "1.0.0" }
    }

    fn validate(&self, ctx: &ValidationContext, detection: &Detection) -> Result<ValidationResult> {
        let mut result = ValidationResult::new(detection);
        result.metadata.validator_version = self.info().version.to_string();
        let content = detection.content.as_str();

        if !self.check_structure(content, &mut result) {
            self.policy.finalize(&mut result);
            return Ok(result);
        }

        ctx.checkpoint()?;

        let commands = self.check_commands(content, &mut result);
        let functions = self.check_functions(content, &mut result);
        if self.config.cim_compliance {
            self.check_cim_fields(content, &mut result);
        }
        if self.config.time_range_required && !TIME_RANGE_RE.is_match(content) {
            result.add_issue(ValidationIssue::semantic(
                "Missing time range specification",
                Severity::High,
                "timerange",
                "SPL007",
                "Add 'earliest' and 'latest' time range parameters",
            ));
        }

        result.detail("pipeline_depth", content.matches('|').count());
        result.detail("commands", commands);
        result.detail("functions", functions);

        self.policy.finalize(&mut result);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;

    fn validate(content: &str) -> ValidationResult {
        validate_with(content, SplunkConfig::default())
    }

    fn validate_with(content: &str, config: SplunkConfig) -> ValidationResult {
        let validator = SplunkValidator::new(config);
        let detection = Detection::new(content, Format::Splunk);
        validator.validate(&ValidationContext::unbounded(), &detection).unwrap()
    }

    #[test]
    fn clean_search_scores_full_confidence() {
        let result = validate("search index=web status=500 | stats count by user");
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.confidence_score, 100.0);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn missing_leading_command_is_structural_error() {
        let result = validate("| oops");
        // generating pipe is accepted
        assert!(result.issues.iter().all(|i| i.issue_code != "SPL001"));

        let result = validate("stats count by user");
        assert_eq!(result.issues[0].issue_code, "SPL001");
        assert_eq!(result.status, Status::Error);
    }

    #[test]
    fn stats_without_by_flagged() {
        let result = validate("search index=web | stats count");
        assert!(result.issues.iter().any(|i| i.issue_code == "SPL004"));
        assert_eq!(result.issues[0].severity, Severity::High);
    }

    #[test]
    fn rename_without_as_flagged() {
        let result = validate("search index=web | rename status");
        assert!(result.issues.iter().any(|i| i.issue_code == "SPL004"));
    }

    #[test]
    fn unknown_function_gets_suggestion() {
        let result = validate("search index=web | stats cont(bytes) by user");
        let issue = result.issues.iter().find(|i| i.issue_code == "SPL005").unwrap();
        assert!(issue.remediation.contains("count"));
    }

    #[test]
    fn pipeline_depth_limit_enforced() {
        let config = SplunkConfig { max_pipeline_depth: 2, ..Default::default() };
        let result = validate_with(
            "search index=web | head 10 | tail 5 | sort status",
            config,
        );
        assert!(result.issues.iter().any(|i| i.issue_code == "SPL002"));
    }

    #[test]
    fn time_range_required_when_configured() {
        let config = SplunkConfig { time_range_required: true, ..Default::default() };
        let result = validate_with("search index=web", config.clone());
        assert!(result.issues.iter().any(|i| i.issue_code == "SPL007"));

        let result = validate_with("search index=web earliest=-24h latest=now", config);
        assert!(result.issues.iter().all(|i| i.issue_code != "SPL007"));
    }

    #[test]
    fn cim_compliance_flags_unmapped_fields() {
        let config = SplunkConfig { cim_compliance: true, ..Default::default() };
        let result = validate_with("search index=web source_ip=10.0.0.1", config);
        let issue = result.issues.iter().find(|i| i.issue_code == "SPL006").unwrap();
        assert!(issue.message.contains("source_ip"));
    }

    #[test]
    fn details_capture_pipeline_shape() {
        let result = validate("search index=web | stats count by user | sort count");
        assert_eq!(result.format_specific_details["pipeline_depth"], 2);
        assert_eq!(
            result.format_specific_details["commands"],
            serde_json::json!(["stats", "sort"])
        );
    }
}
