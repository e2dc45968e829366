use crate::error::{EngineError, Result};
use crate::model::ValidationResult;

/// Render a validation result as a pretty-printed JSON report.
pub fn render(result: &ValidationResult) -> Result<String> {
    serde_json::to_string_pretty(result).map_err(|e| EngineError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Detection, Format};

    #[test]
    fn report_contains_contract_fields() {
        let detection = Detection::new("SELECT a FROM events", Format::Qradar);
        let result = ValidationResult::new(&detection);
        let rendered = render(&result).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["status"], "success");
        assert!(parsed["confidence_score"].is_number());
        assert!(parsed["issues"].is_array());
        assert!(parsed["metadata"]["validation_time_ms"].is_number());
    }
}
