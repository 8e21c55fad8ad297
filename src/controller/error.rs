//! Error types for the DbCluster controller

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::crd::Tier;

/// Error variants are named with the `Error` suffix for clarity (e.g., `KubeError`, `ValidationError`).
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Metadata tier API error: {0}")]
    MetadataApiError(#[from] reqwest::Error),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A pipeline collaborator broke its contract with the controller
    #[error("Internal error: {0}")]
    InternalError(String),

    /// Expected, recoverable-by-waiting condition. Not an operational fault.
    #[error("{message}")]
    Requeue {
        reason: &'static str,
        message: String,
    },

    /// Failure of one pipeline stage, annotated with the stage that produced it
    #[error("{stage} sync error: {source}")]
    StageError {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Build a requeue-signaling error
    pub fn requeue(reason: &'static str, message: impl Into<String>) -> Self {
        Error::Requeue {
            reason,
            message: message.into(),
        }
    }

    /// Annotate an error with the pipeline stage it came from
    pub fn stage(stage: Stage, source: Error) -> Self {
        Error::StageError {
            stage,
            source: Box::new(source),
        }
    }

    /// Whether this error only asks for the pass to be retried later
    pub fn is_requeue(&self) -> bool {
        matches!(self, Error::Requeue { .. })
    }

    /// Stage that produced this error, if it was annotated
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Error::StageError { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Check if this error indicates a resource was not found
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::KubeError(e) => matches!(e, kube::Error::Api(api_err) if api_err.code == 404),
            Error::StageError { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::KubeError(e) => match e {
                kube::Error::Api(api_err) => {
                    // 4xx errors (except 409 Conflict, 429 TooManyRequests) are usually not retryable
                    let code = api_err.code;
                    if (400..500).contains(&code) {
                        return code == 409 || code == 429;
                    }
                    true
                }
                _ => true,
            },
            Error::Requeue { .. } => true,
            Error::StageError { source, .. } => source.is_retryable(),
            // The metadata tier may simply not be serving yet
            Error::MetadataApiError(_) => true,
            Error::InvalidConfig(_) => false,
            Error::ValidationError(_) => false,
            Error::InternalError(_) => false,
            Error::SerializationError(_) => false,
            Error::MissingObjectKey(_) => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A step of the reconciliation pipeline, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    ReclaimPolicy,
    TierMembers(Tier),
    Meta,
    OrphanPods,
}

impl Stage {
    /// CamelCase form used as condition and event reason
    pub fn reason(&self) -> &'static str {
        match self {
            Stage::ReclaimPolicy => "ReclaimPolicySyncFailed",
            Stage::TierMembers(Tier::Metadata) => "MetadataTierSyncFailed",
            Stage::TierMembers(Tier::Storage) => "StorageTierSyncFailed",
            Stage::TierMembers(Tier::Query) => "QueryTierSyncFailed",
            Stage::Meta => "MetaSyncFailed",
            Stage::OrphanPods => "OrphanPodCleanFailed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::ReclaimPolicy => write!(f, "reclaim policy manager"),
            Stage::TierMembers(tier) => write!(f, "{} member manager", tier),
            Stage::Meta => write!(f, "meta manager"),
            Stage::OrphanPods => write!(f, "orphan pod cleaner"),
        }
    }
}

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);

        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        let capped_delay = delay_with_jitter.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay)
    }

    /// Get the delay for an error, with different handling for retryable vs non-retryable
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        if error.is_retryable() {
            self.delay_for_attempt(attempt)
        } else {
            // Non-retryable errors wait for manual intervention
            self.max_delay
        }
    }
}
