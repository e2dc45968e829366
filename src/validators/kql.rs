use once_cell::sync::Lazy;
use regex::Regex;

use super::{closest_candidate, FormatValidator, ValidationContext, ValidatorInfo};
use crate::error::Result;
use crate::model::{Detection, Format, Severity, ValidationIssue, ValidationResult};
use crate::scoring::ScoringPolicy;

static TABLE_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap());

static TIME_WINDOW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"ago\(\s*\d+\s*[smhd]\s*\)|between\s*\(|startofday\(|endofday\(").unwrap()
});

static AGO_DURATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"ago\(\s*(\d+)\s*([smhd])\s*\)").unwrap());

static FUNCTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([a-z_][a-z0-9_]*)\(").unwrap());

const KNOWN_OPERATORS: &[&str] = &[
    "where", "project", "extend", "summarize", "join", "union", "parse", "take", "top",
    "sort", "order", "count", "distinct", "evaluate", "serialize", "render", "limit",
    "mv-expand", "project-away", "project-rename", "project-reorder", "make-series",
];

const KNOWN_FUNCTIONS: &[&str] = &[
    "ago", "now", "startofday", "endofday", "between", "contains", "strcat", "tostring",
    "toint", "tolower", "toupper", "trim", "extract", "isempty", "isnotempty", "replace",
    "split", "substring", "bin", "floor", "round", "count", "countif", "dcount", "sum",
    "avg", "min", "max", "parse_json", "format_datetime", "datetime_diff",
];

/// Characters that have no place in a plain KQL detection query.
const FORBIDDEN_CHARS: &[char] = &['`', ';'];

/// Azure Kusto Query Language validator.
pub struct KqlValidator {
    policy: ScoringPolicy,
}

impl KqlValidator {
    pub fn new() -> Self {
        Self { policy: ScoringPolicy::flat() }
    }

    fn check_structure(&self, content: &str, result: &mut ValidationResult) -> bool {
        if !has_balanced_delimiters(content) {
            result.add_issue(ValidationIssue::structural(
                "Unbalanced parentheses or brackets",
                Severity::High,
                "syntax",
                "KQL001",
                "Balance every '(', '[' and '{' with its closing delimiter",
            ));
            return false;
        }

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            if line.contains(FORBIDDEN_CHARS) {
                result.add_issue(ValidationIssue::structural(
                    "Invalid characters in query",
                    Severity::High,
                    "syntax",
                    "KQL002",
                    "Remove backticks and semicolons from the query",
                ));
                return false;
            }
        }

        let first_token = content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with("//"))
            .and_then(|line| line.split(&[' ', '|'][..]).next())
            .unwrap_or("");
        if !TABLE_NAME_RE.is_match(first_token) {
            result.add_issue(ValidationIssue::structural(
                format!("Invalid table reference: '{first_token}'"),
                Severity::High,
                "table",
                "KQL003",
                "Start the query with a valid table name identifier",
            ));
            return false;
        }

        true
    }

    fn check_operators(&self, content: &str, result: &mut ValidationResult) -> Vec<String> {
        let mut operators = Vec::new();

        // The head of each pipe segment is the operator.
        for segment in content.split('|').skip(1) {
            let Some(operator) = segment.split_whitespace().next() else {
                continue;
            };
            let operator = operator.to_lowercase();

            if !KNOWN_OPERATORS.contains(&operator.as_str()) {
                let remediation =
                    match closest_candidate(&operator, KNOWN_OPERATORS.iter().copied()) {
                        Some(suggestion) => format!("Did you mean '{suggestion}'?"),
                        None => "Use a known KQL tabular operator after each pipe".to_string(),
                    };
                result.add_issue(ValidationIssue::semantic(
                    format!("Unknown KQL operator: {operator}"),
                    Severity::Medium,
                    format!("operator:{operator}"),
                    "KQL004",
                    remediation,
                ));
            }

            operators.push(operator);
        }

        // Ordering heuristics: filtering early is both a correctness smell
        // and a cost problem when inverted.
        let first_where = operators.iter().position(|op| op == "where");
        let first_project = operators.iter().position(|op| op == "project");
        if let (Some(where_idx), Some(project_idx)) = (first_where, first_project) {
            if project_idx < where_idx {
                result.add_issue(ValidationIssue::semantic(
                    "'where' appears after 'project'",
                    Severity::Medium,
                    "operators",
                    "KQL006",
                    "Move 'where' before 'project' to filter before column selection",
                ));
            }
        }
        if operators.iter().any(|op| op == "summarize") && first_where.is_none() {
            result.add_issue(ValidationIssue::semantic(
                "'summarize' without a preceding 'where' filter",
                Severity::Low,
                "operators",
                "KQL007",
                "Add a 'where' stage before 'summarize' to reduce the scanned volume",
            ));
        }

        operators
    }

    fn check_time_window(&self, content: &str, result: &mut ValidationResult) {
        if !TIME_WINDOW_RE.is_match(content) {
            result.add_issue(ValidationIssue::semantic(
                "No time window specification found",
                Severity::High,
                "time_window",
                "KQL005",
                "Bound the query with ago(), between() or startofday()",
            ));
            return;
        }

        for capture in AGO_DURATION_RE.captures_iter(content) {
            let amount: u64 = capture[1].parse().unwrap_or(0);
            let hours = match &capture[2] {
                "s" => amount / 3600,
                "m" => amount / 60,
                "h" => amount,
                _ => amount * 24,
            };
            if hours > 24 {
                result.add_issue(ValidationIssue::semantic(
                    format!("Time window of {hours}h exceeds 24 hours"),
                    Severity::Low,
                    "time_window",
                    "KQL008",
                    "Consider narrowing the lookback window for query performance",
                ));
            }
        }
    }
}

impl Default for KqlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatValidator for KqlValidator {
    fn info(&self) -> ValidatorInfo {
        ValidatorInfo { format: Format::Kql, name: "azure-kql", version: "1.0.0" }
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

        let operators = self.check_operators(content, &mut result);
        self.check_time_window(content, &mut result);

        let functions: Vec<String> = FUNCTION_RE
            .captures_iter(content)
            .map(|c| c[1].to_string())
            .filter(|name| KNOWN_FUNCTIONS.contains(&name.as_str()))
            .collect();
        result.detail("operators", operators);
        result.detail("functions", functions);

        self.policy.finalize(&mut result);
        Ok(result)
    }
}

fn has_balanced_delimiters(content: &str) -> bool {
    let mut stack = Vec::new();
    for c in content.chars() {
        match c {
            '(' | '[' | '{' => stack.push(c),
            ')' => {
                if stack.pop() != Some('(') {
                    return false;
                }
            }
            ']' => {
                if stack.pop() != Some('[') {
                    return false;
                }
            }
            '}' => {
                if stack.pop() != Some('{') {
                    return false;
                }
            }
            _ => {}
        }
    }
    stack.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;

    fn validate(content: &str) -> ValidationResult {
        let validator = KqlValidator::new();
        let detection = Detection::new(content, Format::Kql);
        validator.validate(&ValidationContext::unbounded(), &detection).unwrap()
    }

    #[test]
    fn clean_query_passes() {
        let result = validate(
            "SecurityEvent\n| where TimeGenerated > ago(1h)\n| summarize count() by Account",
        );
        assert_eq!(result.status, Status::Success, "issues: {:?}", result.issues);
        assert_eq!(result.confidence_score, 100.0);
    }

    #[test]
    fn unbalanced_parens_are_structural() {
        let result = validate("SecurityEvent | where (TimeGenerated > ago(1h)");
        assert_eq!(result.issues[0].issue_code, "KQL001");
        assert_eq!(result.status, Status::Error);
    }

    #[test]
    fn forbidden_characters_rejected() {
        let result = validate("SecurityEvent | where x == 1;");
        assert_eq!(result.issues[0].issue_code, "KQL002");
    }

    #[test]
    fn invalid_table_reference_rejected() {
        let result = validate("123Table | where x == 1");
        assert_eq!(result.issues[0].issue_code, "KQL003");
        assert_eq!(result.status, Status::Error);
    }

    #[test]
    fn unknown_operator_gets_suggestion() {
        let result = validate("SecurityEvent | whre TimeGenerated > ago(1h)");
        let issue = result.issues.iter().find(|i| i.issue_code == "KQL004").unwrap();
        assert!(issue.remediation.contains("where"));
    }

    #[test]
    fn missing_time_window_flagged_high() {
        let result = validate("SecurityEvent | where EventID == 4625");
        let issue = result.issues.iter().find(|i| i.issue_code == "KQL005").unwrap();
        assert_eq!(issue.severity, Severity::High);
    }

    #[test]
    fn where_after_project_warned() {
        let result = validate(
            "SecurityEvent | project Account | where TimeGenerated > ago(1h)",
        );
        assert!(result.issues.iter().any(|i| i.issue_code == "KQL006"));
    }

    #[test]
    fn long_lookback_warned_low() {
        let result = validate("SecurityEvent | where TimeGenerated > ago(30d)");
        let issue = result.issues.iter().find(|i| i.issue_code == "KQL008").unwrap();
        assert_eq!(issue.severity, Severity::Low);
    }

    #[test]
    fn delimiter_balance_helper() {
        assert!(has_balanced_delimiters("a(b[c{d}e]f)g"));
        assert!(!has_balanced_delimiters("a(b]c"));
        assert!(!has_balanced_delimiters("(("));
    }
}
