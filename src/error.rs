use std::time::Duration;

use thiserror::Error;

use crate::model::Format;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine-level failures.
///
/// Content-level problems (malformed YAML, missing fields, undefined string
/// references) are never represented here — they become issues on an
/// `ERROR`-status `ValidationResult`. This type is reserved for conditions
/// where the engine could not evaluate the rule at all.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unsupported detection format: {0}")]
    UnsupportedFormat(String),

    #[error("validator already registered for format: {0}")]
    DuplicateValidator(Format),

    #[error("validation timed out after {timeout:?} ({format})")]
    Timeout { format: Format, timeout: Duration },

    #[error("validation cancelled by caller")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether retrying the same call can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Cancelled)
    }
}
