//! Error types for SMSGuard

use crate::types::{FailureKind, ProviderFailureRecord};
use std::time::Duration;

/// Result type alias using SMSGuard's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for SMSGuard operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An annotation source failed internally
    #[error("provider '{source_id}' failed: {cause}")]
    ProviderFailure { source_id: String, cause: String },

    /// An annotation source exceeded its bounded wait
    #[error("provider '{source_id}' timed out after {}ms", .timeout.as_millis())]
    ProviderTimeout { source_id: String, timeout: Duration },

    /// Every candidate source failed or timed out
    #[error("all {} annotation providers failed", .0.len())]
    AllProvidersFailed(Vec<ProviderFailureRecord>),

    /// Configuration errors, including explicit selection of an unready provider
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The caller abandoned the request
    #[error("annotation request cancelled")]
    Cancelled,

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new provider failure
    pub fn provider(source_id: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::ProviderFailure {
            source_id: source_id.into(),
            cause: cause.to_string(),
        }
    }

    /// Create a new provider timeout
    pub fn timeout(source_id: impl Into<String>, timeout: Duration) -> Self {
        Self::ProviderTimeout {
            source_id: source_id.into(),
            timeout,
        }
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Convert a per-provider error into the record kept on an `AnnotationResult`.
    ///
    /// Errors that are not attributable to a provider are recorded against
    /// `source_id` as failures.
    pub fn to_failure_record(&self, source_id: &str) -> ProviderFailureRecord {
        match self {
            Self::ProviderTimeout { source_id, timeout } => ProviderFailureRecord {
                source_id: source_id.clone(),
                kind: FailureKind::Timeout,
                reason: format!("no response within {}ms", timeout.as_millis()),
            },
            Self::ProviderFailure { source_id, cause } => ProviderFailureRecord {
                source_id: source_id.clone(),
                kind: FailureKind::Failure,
                reason: cause.clone(),
            },
            other => ProviderFailureRecord {
                source_id: source_id.to_string(),
                kind: FailureKind::Failure,
                reason: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_record() {
        let err = Error::timeout("cloud", Duration::from_millis(1500));
        let record = err.to_failure_record("ignored");

        assert_eq!(record.source_id, "cloud");
        assert_eq!(record.kind, FailureKind::Timeout);
        assert!(record.reason.contains("1500"));
    }

    #[test]
    fn test_provider_failure_display() {
        let err = Error::provider("local-model", "weights missing");
        assert_eq!(err.to_string(), "provider 'local-model' failed: weights missing");

        let record = err.to_failure_record("ignored");
        assert_eq!(record.kind, FailureKind::Failure);
        assert_eq!(record.reason, "weights missing");
    }

    #[test]
    fn test_unattributed_error_record() {
        let err = Error::internal("task panicked");
        let record = err.to_failure_record("on-device");

        assert_eq!(record.source_id, "on-device");
        assert!(record.reason.contains("task panicked"));
    }
}
