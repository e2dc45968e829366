use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Top-level engine configuration, loadable from `rulegate.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-call validation timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub validation_timeout_ms: u64,
    /// Results scoring below this get the synthetic low-confidence issue.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Turns on the optional compliance checks (currently Splunk CIM).
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub splunk: SplunkConfig,
    #[serde(default)]
    pub yaral: YaralConfig,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_min_confidence() -> f64 {
    95.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            validation_timeout_ms: default_timeout_ms(),
            min_confidence: default_min_confidence(),
            strict: false,
            splunk: SplunkConfig::default(),
            yaral: YaralConfig::default(),
        }
    }
}

/// Splunk SPL validator knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplunkConfig {
    #[serde(default = "default_max_pipeline_depth")]
    pub max_pipeline_depth: usize,
    /// Require an `earliest=... latest=...` time range clause.
    #[serde(default)]
    pub time_range_required: bool,
    /// Flag field names outside the CIM mapping table.
    #[serde(default)]
    pub cim_compliance: bool,
}

fn default_max_pipeline_depth() -> usize {
    10
}

impl Default for SplunkConfig {
    fn default() -> Self {
        Self {
            max_pipeline_depth: default_max_pipeline_depth(),
            time_range_required: false,
            cim_compliance: false,
        }
    }
}

/// YARA-L validator knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YaralConfig {
    /// Ceiling on condition complexity (boolean operators + function calls).
    #[serde(default = "default_max_condition_complexity")]
    pub max_condition_complexity: usize,
}

fn default_max_condition_complexity() -> usize {
    100
}

impl Default for YaralConfig {
    fn default() -> Self {
        Self {
            max_condition_complexity: default_max_condition_complexity(),
        }
    }
}

impl EngineConfig {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validation_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.validation_timeout_ms)
    }

    /// Effective Splunk settings once the global strict flag is folded in.
    pub fn effective_splunk(&self) -> SplunkConfig {
        let mut splunk = self.splunk.clone();
        splunk.cim_compliance = splunk.cim_compliance || self.strict;
        splunk
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# rulegate configuration

# Per-call validation timeout in milliseconds.
validation_timeout_ms = 30000

# Results scoring below this threshold get a low-confidence annotation.
min_confidence = 95.0

# Enable optional compliance checks (Splunk CIM field naming).
strict = false

[splunk]
max_pipeline_depth = 10
time_range_required = false
cim_compliance = false

[yaral]
max_condition_complexity = 100
"#
    }
}
