use crate::model::{Severity, ValidationResult};

/// Render a validation result as console output, issues grouped by severity.
pub fn render(result: &ValidationResult) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "\n  {} validation: {} (confidence {:.1})\n\n",
        result.format, result.status, result.confidence_score
    ));

    if result.issues.is_empty() {
        output.push_str("  No issues detected.\n\n");
        return output;
    }

    // Sort by severity (high first), preserving discovery order within a tier.
    let mut sorted: Vec<_> = result.issues.iter().collect();
    sorted.sort_by(|a, b| b.severity.cmp(&a.severity));

    output.push_str(&format!("  {} issue(s) detected:\n\n", result.issues.len()));

    for issue in sorted {
        let severity_tag = match issue.severity {
            Severity::High => "[HIGH]  ",
            Severity::Medium => "[MEDIUM]",
            Severity::Low => "[LOW]   ",
        };
        output.push_str(&format!("  {} {} {}\n", severity_tag, issue.issue_code, issue.message));
        output.push_str(&format!("           at {}\n", issue.location));
        if !issue.remediation.is_empty() {
            output.push_str(&format!("           fix: {}\n", issue.remediation));
        }
        output.push('\n');
    }

    output
}
