//! Validator registry and orchestration.
//!
//! The registry is built once at startup and treated as read-only afterwards;
//! the engine shares it behind an `Arc`, so steady-state lookups take no lock.
//! Each validation call runs on its own worker thread and is raced against
//! the configured deadline while polling the caller's cancellation token.

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::model::{
    Detection, Format, IssueKind, Severity, Status, ValidationIssue, ValidationResult,
};
use crate::scoring::ScoringPolicy;
use crate::validators::{default_validators, CancelToken, FormatValidator, ValidationContext};

/// Maximum accepted detection content size (5 MB).
pub const MAX_DETECTION_SIZE: usize = 5 * 1024 * 1024;

/// How often the waiting side re-checks the cancellation token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Format → validator mapping, populated once at startup.
pub struct ValidatorRegistry {
    validators: HashMap<Format, Arc<dyn FormatValidator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self { validators: HashMap::new() }
    }

    /// Registry pre-populated with all eight built-in validators.
    pub fn with_defaults(config: &EngineConfig) -> Result<Self> {
        let mut registry = Self::new();
        for validator in default_validators(config) {
            registry.register(validator)?;
        }
        Ok(registry)
    }

    /// Register a validator. Re-registering a format is a configuration
    /// error, not a content error.
    pub fn register(&mut self, validator: Arc<dyn FormatValidator>) -> Result<()> {
        let info = validator.info();
        if self.validators.contains_key(&info.format) {
            return Err(EngineError::DuplicateValidator(info.format));
        }
        tracing::info!(
            format = %info.format,
            validator = info.name,
            version = info.version,
            "validator registered"
        );
        self.validators.insert(info.format, validator);
        Ok(())
    }

    pub fn get(&self, format: Format) -> Option<Arc<dyn FormatValidator>> {
        self.validators.get(&format).cloned()
    }

    pub fn formats(&self) -> Vec<Format> {
        self.validators.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-call overrides for a single validation.
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Overrides the configured validation timeout.
    pub timeout: Option<Duration>,
    /// Caller-supplied cancellation token; aborting it surfaces as
    /// `EngineError::Cancelled`, never as a zero-confidence result.
    pub cancel: Option<CancelToken>,
}

/// Validation orchestrator.
pub struct Engine {
    registry: Arc<ValidatorRegistry>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(registry: Arc<ValidatorRegistry>, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Engine with the default configuration and all built-in validators.
    pub fn with_defaults() -> Result<Self> {
        let config = EngineConfig::default();
        let registry = Arc::new(ValidatorRegistry::with_defaults(&config)?);
        Ok(Self::new(registry, config))
    }

    pub fn registry(&self) -> &ValidatorRegistry {
        &self.registry
    }

    /// Validate one detection with the configured timeout.
    pub fn validate(&self, detection: &Detection) -> Result<ValidationResult> {
        self.validate_with(detection, ValidateOptions::default())
    }

    /// Validate one detection with per-call overrides.
    pub fn validate_with(
        &self,
        detection: &Detection,
        options: ValidateOptions,
    ) -> Result<ValidationResult> {
        let format = detection.format;
        let Some(validator) = self.registry.get(format) else {
            return Err(EngineError::UnsupportedFormat(format.to_string()));
        };

        let started = Instant::now();

        if detection.content.len() > MAX_DETECTION_SIZE {
            let mut result = ValidationResult::new(detection);
            result.add_issue(ValidationIssue::structural(
                format!(
                    "Detection content exceeds maximum allowed size of {MAX_DETECTION_SIZE} bytes"
                ),
                Severity::High,
                "content",
                "ENG001",
                "Reduce the rule to a single detection of reasonable size",
            ));
            ScoringPolicy::flat().finalize(&mut result);
            return Ok(self.seal(detection, result, started));
        }

        let timeout = options.timeout.unwrap_or_else(|| self.config.validation_timeout());
        let cancel = options.cancel.unwrap_or_default();
        let ctx = ValidationContext::new(cancel.clone());

        tracing::debug!(format = %format, detection_id = %detection.id, "validation dispatched");

        let (tx, rx) = mpsc::channel();
        let worker_detection = detection.clone();
        thread::Builder::new()
            .name(format!("validate-{format}"))
            .spawn(move || {
                let outcome = validator.validate(&ctx, &worker_detection);
                // Receiver may be gone after a timeout; the partial result
                // is discarded with the channel.
                let _ = tx.send(outcome);
            })?;

        let deadline = started + timeout;
        let outcome = loop {
            if cancel.is_cancelled() {
                tracing::warn!(format = %format, "validation cancelled by caller");
                return Err(EngineError::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                cancel.cancel();
                tracing::warn!(format = %format, ?timeout, "validation timed out");
                return Err(EngineError::Timeout { format, timeout });
            }
            match rx.recv_timeout(CANCEL_POLL_INTERVAL.min(deadline - now)) {
                Ok(outcome) => break outcome,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(EngineError::Internal(
                        "validator worker exited without a result".to_string(),
                    ));
                }
            }
        };

        let result = self.seal(detection, outcome?, started);
        tracing::info!(
            format = %format,
            detection_id = %detection.id,
            status = %result.status,
            confidence_score = result.confidence_score,
            validation_time_ms = result.metadata.validation_time_ms,
            "validation completed"
        );
        Ok(result)
    }

    /// Validate a batch, one worker per detection. Returns one outcome per
    /// input, index-aligned; a failing entry never disturbs its neighbours.
    pub fn validate_batch(&self, detections: &[Detection]) -> Vec<Result<ValidationResult>> {
        tracing::info!(batch_size = detections.len(), "batch validation started");

        let mut outcomes: Vec<Option<Result<ValidationResult>>> =
            (0..detections.len()).map(|_| None).collect();

        thread::scope(|scope| {
            for (slot, detection) in outcomes.iter_mut().zip(detections) {
                scope.spawn(move || {
                    *slot = Some(self.validate(detection));
                });
            }
        });

        outcomes
            .into_iter()
            .map(|outcome| {
                outcome.unwrap_or_else(|| {
                    Err(EngineError::Internal("batch worker produced no outcome".to_string()))
                })
            })
            .collect()
    }

    /// Stamp timing/fingerprint metadata and apply the cross-cutting
    /// minimum-confidence policy.
    fn seal(
        &self,
        detection: &Detection,
        mut result: ValidationResult,
        started: Instant,
    ) -> ValidationResult {
        result.metadata.validation_time_ms = started.elapsed().as_millis() as u64;
        result.metadata.content_sha256 = detection.content_hash();

        if result.confidence_score < self.config.min_confidence {
            if result.status == Status::Success {
                result.status = Status::Warning;
            }
            result.add_issue(ValidationIssue::new(
                format!(
                    "Confidence score {:.2} below minimum threshold {:.2}",
                    result.confidence_score, self.config.min_confidence
                ),
                Severity::Medium,
                IssueKind::Policy,
                "confidence_check",
                "LOW_CONFIDENCE",
                "Review reported issues to improve confidence, or validate manually",
            ));
        }

        result
    }
}
