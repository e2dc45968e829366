use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{FormatValidator, ValidationContext, ValidatorInfo};
use crate::error::Result;
use crate::model::{Detection, Format, Severity, ValidationIssue, ValidationResult};
use crate::scoring::ScoringPolicy;

static RULE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*(?:(?:global|private)\s+)*rule\s+([A-Za-z0-9_]+)\s*(?::[^{]*)?\{.*\}\s*$")
        .unwrap()
});

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]{0,127}$").unwrap());

static STRING_DEF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\$[A-Za-z0-9_]*)\s*=\s*(.+?)\s*$").unwrap());

static META_ENTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*[a-zA-Z_][a-zA-Z0-9_]*\s*=\s*(?:"[^"]*"|\d+|true|false)\s*$"#).unwrap());

static STRING_REF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$[A-Za-z0-9_]*\*?").unwrap());

static HEX_BODY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9A-Fa-f\s?()|\[\]-]*$").unwrap());

const SECTION_LABELS: &[&str] = &["meta:", "strings:", "condition:"];

/// Modifiers allowed after a text string literal.
const STRING_MODIFIERS: &[&str] =
    &["nocase", "wide", "ascii", "fullword", "xor", "base64", "base64wide", "private"];

const RESERVED_KEYWORDS: &[&str] = &[
    "all", "and", "any", "ascii", "at", "condition", "contains", "entrypoint", "false",
    "filesize", "fullword", "for", "global", "in", "import", "include", "int8", "int16",
    "int32", "int8be", "int16be", "int32be", "matches", "meta", "nocase", "not", "or", "of",
    "private", "rule", "strings", "them", "true", "uint8", "uint16", "uint32", "uint8be",
    "uint16be", "uint32be", "wide",
];

/// Slice out the body of a labelled section (up to the next label or the
/// rule's closing brace).
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

fn has_balanced_parentheses(s: &str) -> bool {
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

/// YARA rule validator.
pub struct YaraValidator {
    policy: ScoringPolicy,
}

impl YaraValidator {
    pub fn new() -> Self {
        Self { policy: ScoringPolicy::flat() }
    }

    fn check_identifier(&self, content: &str, result: &mut ValidationResult) -> Option<String> {
        static DECL_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"rule\s+([A-Za-z0-9_]+)").unwrap());

        let identifier = DECL_RE.captures(content).map(|c| c[1].to_string())?;

        let problem = if !IDENTIFIER_RE.is_match(&identifier) {
            Some("invalid identifier format")
        } else if RESERVED_KEYWORDS.contains(&identifier.to_lowercase().as_str()) {
            Some("identifier is a reserved keyword")
        } else {
            None
        };

        if let Some(problem) = problem {
            result.add_issue(ValidationIssue::semantic(
                format!("Invalid rule identifier '{identifier}': {problem}"),
                Severity::High,
                "identifier",
                "YARA002",
                "Use alphanumeric characters and underscores, start with a letter or \
                 underscore, at most 128 characters, and avoid reserved keywords",
            ));
        }

        Some(identifier)
    }

    fn check_meta(&self, content: &str, result: &mut ValidationResult) {
        let Some(meta) = section(content, "meta:") else {
            return;
        };
        for line in meta.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if !META_ENTRY_RE.is_match(line) {
                result.add_issue(ValidationIssue::semantic(
                    format!("Invalid meta entry: {line}"),
                    Severity::Medium,
                    "meta",
                    "YARA003",
                    "Meta entries follow the form: identifier = \"value\" | number | boolean",
                ));
            }
        }
    }

    /// Returns the set of defined string identifiers.
    fn check_strings(&self, content: &str, result: &mut ValidationResult) -> BTreeSet<String> {
        let mut defined = BTreeSet::new();
        let Some(strings) = section(content, "strings:") else {
            return defined;
        };

        for line in strings.lines() {
            let Some(capture) = STRING_DEF_RE.captures(line) else {
                continue;
            };
            let identifier = capture[1].to_string();
            let value = capture[2].trim();

            if !defined.insert(identifier.clone()) {
                result.add_issue(ValidationIssue::semantic(
                    format!("Duplicate string identifier: {identifier}"),
                    Severity::Medium,
                    format!("strings.{identifier}"),
                    "YARA005",
                    "Use unique identifiers for string definitions",
                ));
            }

            if let Some(problem) = check_string_literal(value) {
                result.add_issue(ValidationIssue::semantic(
                    format!("Invalid string literal for {identifier}: {problem}"),
                    Severity::Medium,
                    format!("strings.{identifier}"),
                    "YARA004",
                    "Strings must be \"text\", { hex bytes } or /regex/ with valid modifiers",
                ));
            }
        }

        defined
    }

    fn check_condition(
        &self,
        content: &str,
        defined: &BTreeSet<String>,
        result: &mut ValidationResult,
    ) {
        let Some(condition) = section(content, "condition:") else {
            result.add_issue(ValidationIssue::semantic(
                "Missing condition section",
                Severity::High,
                "condition",
                "YARA006",
                "Add a condition section with the rule's match logic",
            ));
            return;
        };
        let condition = condition.trim();

        if condition.is_empty() {
            result.add_issue(ValidationIssue::semantic(
                "Empty condition section",
                Severity::High,
                "condition",
                "YARA006",
                "Add a condition section with the rule's match logic",
            ));
            return;
        }

        if !has_balanced_parentheses(condition) {
            result.add_issue(ValidationIssue::semantic(
                "Unbalanced parentheses in condition",
                Severity::Medium,
                "condition",
                "YARA007",
                "Balance every '(' with a closing ')' in the condition",
            ));
        }

        for reference in STRING_REF_RE.find_iter(condition) {
            let reference = reference.as_str();
            let satisfied = if let Some(prefix) = reference.strip_suffix('*') {
                // Wildcard references match any defined identifier sharing
                // the prefix; a bare `$*` matches any string at all.
                defined.iter().any(|id| id.starts_with(prefix))
            } else {
                defined.contains(reference)
            };
            if !satisfied {
                result.add_issue(ValidationIssue::semantic(
                    format!("Referenced string not defined: {reference}"),
                    Severity::Medium,
                    format!("condition.{reference}"),
                    "YARA008",
                    "Define the referenced string in the strings section",
                ));
            }
        }
    }
}

fn check_string_literal(value: &str) -> Option<&'static str> {
    if let Some(rest) = value.strip_prefix('"') {
        let Some(close) = rest.rfind('"') else {
            return Some("unterminated text string");
        };
        let modifiers = rest[close + 1..].trim();
        if !modifiers.is_empty()
            && !modifiers
                .split_whitespace()
                .all(|m| STRING_MODIFIERS.contains(&m) || m.starts_with("xor("))
        {
            return Some("unknown string modifier");
        }
        None
    } else if let Some(rest) = value.strip_prefix('{') {
        let Some(body) = rest.strip_suffix('}') else {
            return Some("unterminated hex string");
        };
        if !HEX_BODY_RE.is_match(body) {
            return Some("invalid hex string contents");
        }
        None
    } else if let Some(rest) = value.strip_prefix('/') {
        let Some(close) = rest.rfind('/') else {
            return Some("unterminated regex string");
        };
        if close == 0 && rest.len() == 1 {
            return Some("empty regex string");
        }
        let modifiers = rest[close + 1..].trim();
        let valid_regex_modifier = |m: &str| {
            m.chars().all(|c| matches!(c, 'i' | 's')) || STRING_MODIFIERS.contains(&m)
        };
        if !modifiers.is_empty() && !modifiers.split_whitespace().all(valid_regex_modifier) {
            return Some("unknown regex modifier");
        }
        None
    } else {
        Some("unrecognized string literal form")
    }
}

impl Default for YaraValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatValidator for YaraValidator {
    fn info(&self) -> ValidatorInfo {
        ValidatorInfo { format: Format::Yara, name: "yara", version: "1.0.0" }
    }

    fn validate(&self, ctx: &ValidationContext, detection: &Detection) -> Result<ValidationResult> {
        let mut result = ValidationResult::new(detection);
        result.metadata.validator_version = self.info().version.to_string();
        let content = detection.content.as_str();

        if !RULE_RE.is_match(content) {
            result.add_issue(ValidationIssue::structural(
                "Invalid YARA rule structure",
                Severity::High,
                "rule",
                "YARA001",
                "Ensure rule follows the format: [private|global] rule name [: tag] { ... }",
            ));
            self.policy.finalize(&mut result);
            return Ok(result);
        }

        ctx.checkpoint()?;

        let identifier = self.check_identifier(content, &mut result);
        self.check_meta(content, &mut result);
        let defined = self.check_strings(content, &mut result);
        self.check_condition(content, &defined, &mut result);

        if let Some(identifier) = identifier {
            result.detail("rule_name", identifier);
        }
        result.detail("string_count", defined.len());

        self.policy.finalize(&mut result);
        Ok(result)
    }
}
