use once_cell::sync::Lazy;
use regex::Regex;

use super::{closest_candidate, FormatValidator, ValidationContext, ValidatorInfo};
use crate::error::Result;
use crate::model::{Detection, Format, Severity, ValidationIssue, ValidationResult};
use crate::scoring::ScoringPolicy;

static SELECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^\s*SELECT\s+(.+?)\s+FROM\b").unwrap());

static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z][A-Z0-9_]*)\(").unwrap());

static FIELD_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

static AS_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+AS\s+").unwrap());

const SUPPORTED_FUNCTIONS: &[&str] = &[
    "COUNT", "SUM", "AVG", "MIN", "MAX", "DATEFORMAT", "CONCAT", "UPPER", "LOWER", "STRLEN",
    "NOW", "START", "STOP",
];

/// AQL clause keywords in the order they must appear.
const CLAUSE_ORDER: &[&str] = &["SELECT", "FROM", "WHERE", "GROUP"];

/// IBM QRadar Ariel Query Language validator.
pub struct QradarValidator {
    policy: ScoringPolicy,
}

impl QradarValidator {
    pub fn new() -> Self {
        Self { policy: ScoringPolicy::flat() }
    }

    /// Every occurrence of a clause keyword must respect the canonical
    /// SELECT < FROM < WHERE < GROUP BY order; a keyword re-appearing after
    /// a later clause (e.g. a second FROM after GROUP BY) is a violation.
    fn check_clause_order(&self, content: &str, result: &mut ValidationResult) {
        let mut max_rank = 0usize;
        for token in content.split_whitespace() {
            let upper = token.to_uppercase();
            let Some(rank) = CLAUSE_ORDER.iter().position(|c| *c == upper) else {
                continue;
            };
            if rank + 1 < max_rank {
                let clause = if upper == "GROUP" { "GROUP BY" } else { upper.as_str() };
                result.add_issue(ValidationIssue::structural(
                    format!("Invalid clause ordering: '{clause}' appears out of order"),
                    Severity::High,
                    "query",
                    "AQL002",
                    "Order clauses as SELECT ... FROM ... [WHERE] [GROUP BY]",
                ));
                return;
            }
            max_rank = max_rank.max(rank + 1);
        }
    }

    fn check_field_names(&self, content: &str, result: &mut ValidationResult) {
        let Some(capture) = SELECT_RE.captures(content) else {
            return;
        };

        for field in capture[1].split(',') {
            let field = field.trim();
            if field == "*" || field.is_empty() || field.contains('(') {
                continue;
            }

            // Strip a trailing "AS alias".
            let field = AS_SPLIT_RE.split(field).next().unwrap_or(field).trim();

            if !FIELD_NAME_RE.is_match(field) {
                result.add_issue(ValidationIssue::semantic(
                    format!("Invalid field name: {field}"),
                    Severity::High,
                    format!("field:{field}"),
                    "AQL003",
                    "Field names must be alphanumeric with underscores",
                ));
            }
        }
    }

    fn check_functions(&self, content: &str, result: &mut ValidationResult) -> Vec<String> {
        let mut functions = Vec::new();

        for capture in FUNCTION_RE.captures_iter(content) {
            let name = capture[1].to_string();
            if !SUPPORTED_FUNCTIONS.contains(&name.as_str()) {
                let remediation =
                    match closest_candidate(&name, SUPPORTED_FUNCTIONS.iter().copied()) {
                        Some(suggestion) => format!("Did you mean '{suggestion}'?"),
                        None => "Use valid QRadar function names".to_string(),
                    };
                result.add_issue(ValidationIssue::semantic(
                    format!("Invalid function name: {name}"),
                    Severity::Medium,
                    format!("function:{name}"),
                    "AQL004",
                    remediation,
                ));
            }
            functions.push(name);
        }

        functions
    }
}

impl Default for QradarValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatValidator for QradarValidator {
    fn info(&self) -> ValidatorInfo {
        ValidatorInfo { format: Format::Qradar, name: "qradar-aql", version: "1.0.0" }
    }

    fn validate(&self, ctx: &ValidationContext, detection: &Detection) -> Result<ValidationResult> {
        let mut result = ValidationResult::new(detection);
        result.metadata.validator_version = self.info().version.to_string();
        let content = detection.content.as_str();

        if !SELECT_RE.is_match(content) {
            result.add_issue(ValidationIssue::structural(
                "Missing or invalid SELECT ... FROM statement",
                Severity::High,
                "query",
                "AQL001",
                "Ensure the query follows basic AQL structure: SELECT ... FROM ... [WHERE] [GROUP BY]",
            ));
            self.policy.finalize(&mut result);
            return Ok(result);
        }

        self.check_clause_order(content, &mut result);
        ctx.checkpoint()?;

        self.check_field_names(content, &mut result);
        let functions = self.check_functions(content, &mut result);

        result.detail("functions", functions);

        self.policy.finalize(&mut result);
        Ok(result)
    }
}
