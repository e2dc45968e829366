//! Core data model shared by every validator.
//!
//! All validators consume a `Detection` and produce a `ValidationResult`.
//! This decouples format-specific grammar checks from the orchestration and
//! scoring layers.

pub mod issue;
pub mod result;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub use issue::{IssueKind, Severity, ValidationIssue};
pub use result::{ResultMetadata, Status, ValidationResult};

/// One of the eight supported detection-rule languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Splunk,
    Qradar,
    Sigma,
    Kql,
    Paloalto,
    Crowdstrike,
    Yara,
    Yaral,
}

impl Format {
    /// All supported formats, in registration order.
    pub const ALL: [Format; 8] = [
        Self::Splunk,
        Self::Qradar,
        Self::Sigma,
        Self::Kql,
        Self::Paloalto,
        Self::Crowdstrike,
        Self::Yara,
        Self::Yaral,
    ];

    pub fn from_str_lenient(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "splunk" | "spl" => Some(Self::Splunk),
            "qradar" | "aql" => Some(Self::Qradar),
            "sigma" => Some(Self::Sigma),
            "kql" | "azure" => Some(Self::Kql),
            "paloalto" | "palo_alto" | "palo-alto" => Some(Self::Paloalto),
            "crowdstrike" => Some(Self::Crowdstrike),
            "yara" => Some(Self::Yara),
            "yaral" | "yara-l" | "yara_l" => Some(Self::Yaral),
            _ => None,
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Splunk => write!(f, "splunk"),
            Self::Qradar => write!(f, "qradar"),
            Self::Sigma => write!(f, "sigma"),
            Self::Kql => write!(f, "kql"),
            Self::Paloalto => write!(f, "paloalto"),
            Self::Crowdstrike => write!(f, "crowdstrike"),
            Self::Yara => write!(f, "yara"),
            Self::Yaral => write!(f, "yaral"),
        }
    }
}

/// A candidate detection rule submitted for validation.
///
/// Immutable once handed to the engine: validators read the content and
/// declared format, never mutate them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub id: Uuid,
    /// Raw rule text in the declared format's grammar.
    pub content: String,
    /// Format the caller claims the content is written in.
    pub format: Format,
    pub created_at: DateTime<Utc>,
    /// Opaque caller-owned metadata, passed through untouched.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Detection {
    pub fn new(content: impl Into<String>, format: Format) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            format,
            created_at: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// SHA-256 fingerprint of the rule text, hex-encoded.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parses_aliases() {
        assert_eq!(Format::from_str_lenient("SPL"), Some(Format::Splunk));
        assert_eq!(Format::from_str_lenient("yara-l"), Some(Format::Yaral));
        assert_eq!(Format::from_str_lenient("Palo_Alto"), Some(Format::Paloalto));
        assert_eq!(Format::from_str_lenient("snort"), None);
    }

    #[test]
    fn format_display_round_trips() {
        for format in Format::ALL {
            assert_eq!(Format::from_str_lenient(&format.to_string()), Some(format));
        }
    }

    #[test]
    fn content_hash_is_stable() {
        let a = Detection::new("rule a { condition: true }", Format::Yara);
        let b = Detection::new("rule a { condition: true }", Format::Yara);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.id, b.id);
    }
}
