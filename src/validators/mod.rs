//! Format-specific validators.
//!
//! Each validator implements the same two-phase pipeline: a structural check
//! (is the content even parseable as the declared grammar?) followed by
//! semantic checks (required sections, field vocabularies, cross-references).
//! A structural failure short-circuits the semantic phase, records one
//! HIGH-severity issue, and returns an `ERROR`-status result — never a hard
//! error. Hard errors are reserved for the engine (unsupported format,
//! timeout, cancellation).

pub mod crowdstrike;
pub mod kql;
pub mod paloalto;
pub mod qradar;
pub mod sigma;
pub mod splunk;
pub mod yara;
pub mod yaral;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::model::{Detection, Format, ValidationResult};

/// Identity a validator reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorInfo {
    pub format: Format,
    pub name: &'static str,
    pub version: &'static str,
}

/// Cooperative cancellation flag shared between the caller and a running
/// validation. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-call context handed to a validator.
///
/// Validators are CPU-bound and must not block on I/O; the only discipline
/// asked of them is to call `checkpoint` between phases so a cancelled or
/// timed-out call stops doing work promptly.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    cancel: CancelToken,
}

impl ValidationContext {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    /// Context that can never be cancelled, for direct validator use.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Bail out if the caller has cancelled this validation.
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }
}

/// A format validator judges one detection rule against its grammar.
pub trait FormatValidator: Send + Sync {
    /// Identity of this validator (format, name, version).
    fn info(&self) -> ValidatorInfo;

    /// Validate a detection. `Err` is reserved for engine-level conditions
    /// (cancellation); content problems always come back as issues on an
    /// `Ok` result.
    fn validate(&self, ctx: &ValidationContext, detection: &Detection) -> Result<ValidationResult>;
}

/// The full validator set, one per supported format.
pub fn default_validators(config: &EngineConfig) -> Vec<Arc<dyn FormatValidator>> {
    vec![
        Arc::new(splunk::SplunkValidator::new(config.effective_splunk())),
        Arc::new(qradar::QradarValidator::new()),
        Arc::new(sigma::SigmaValidator::new()),
        Arc::new(kql::KqlValidator::new()),
        Arc::new(paloalto::PaloAltoValidator::new()),
        Arc::new(crowdstrike::CrowdstrikeValidator::new()),
        Arc::new(yara::YaraValidator::new()),
        Arc::new(yaral::YaralValidator::new(config.yaral.clone())),
    ]
}

/// Closest allowlisted name within edit distance 2, for did-you-mean
/// remediation text.
pub(crate) fn closest_candidate<'a, I>(name: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let lower = name.to_lowercase();
    candidates
        .into_iter()
        .map(|candidate| (levenshtein::levenshtein(&lower, &candidate.to_lowercase()), candidate))
        .filter(|(distance, _)| *distance > 0 && *distance <= 2)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_shares_state_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn checkpoint_fails_after_cancel() {
        let token = CancelToken::new();
        let ctx = ValidationContext::new(token.clone());
        assert!(ctx.checkpoint().is_ok());
        token.cancel();
        assert!(matches!(ctx.checkpoint(), Err(EngineError::Cancelled)));
    }

    #[test]
    fn closest_candidate_suggests_within_distance_two() {
        let functions = ["count", "sum", "avg", "values"];
        assert_eq!(closest_candidate("cont", functions), Some("count"));
        assert_eq!(closest_candidate("SUM", functions), None); // exact match, no suggestion
        assert_eq!(closest_candidate("zzzzzz", functions), None);
    }

    #[test]
    fn default_set_covers_every_format() {
        let config = EngineConfig::default();
        let validators = default_validators(&config);
        let mut formats: Vec<Format> = validators.iter().map(|v| v.info().format).collect();
        formats.sort_by_key(|f| f.to_string());
        let mut expected: Vec<Format> = Format::ALL.to_vec();
        expected.sort_by_key(|f| f.to_string());
        assert_eq!(formats, expected);
    }
}
