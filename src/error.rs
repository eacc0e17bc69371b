//! Pipeline error types with retry classification.
//!
//! [`PipelineError`] is the central error type for the indexer. Each variant
//! carries a numeric code and a retry classification that the worker runtime
//! turns into a queue disposition (delete, release for redelivery, or
//! dead-letter).

use crate::domain::MarketId;

/// A transaction matched a marketplace's instruction signature but its
/// content did not have the expected shape.
///
/// Decoding failures are reported per item: the offending transaction is
/// skipped and its siblings in the same batch are still indexed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot decode {market} transaction {signature}: {reason}")]
pub struct DecodingFailure {
    /// Signature of the transaction that failed to decode.
    pub signature: String,
    /// Marketplace whose parser rejected the transaction.
    pub market: MarketId,
    /// Human-readable description of the mismatch.
    pub reason: String,
}

/// A stream write that still had failed records after local retries.
///
/// `failed` holds indices into the slice handed to the publisher, so the
/// caller knows exactly which records never became durable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} of {total} records failed to publish: {reason}", failed.len())]
pub struct PublishFailure {
    /// Indices (into the published slice) of records that were not written.
    pub failed: Vec<usize>,
    /// Total number of records in the publish call.
    pub total: usize,
    /// Last error reported by the stream sink.
    pub reason: String,
}

/// Indexer error enum with retry classification.
///
/// # Error Code Ranges
///
/// | Range     | Category      | Retryable                  |
/// |-----------|---------------|----------------------------|
/// | 1000–1999 | Input         | No (except decoding)       |
/// | 2000–2999 | Collaborators | Yes, via queue redelivery  |
/// | 3000–3999 | Execution     | Yes, via queue redelivery  |
/// | 4000–4999 | Setup         | No                         |
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invocation parameters did not match the routine's schema.
    #[error("invalid params for routine {routine_type}: {reason}")]
    ParamsInvalid {
        /// Routine the parameters were addressed to.
        routine_type: String,
        /// Why validation rejected them.
        reason: String,
    },

    /// No routine is registered under the given type.
    #[error("unknown routine type: {0}")]
    UnknownRoutine(String),

    /// A routine tried to enqueue work for a routine type that has no queue
    /// binding.
    #[error("no queue bound for routine type: {0}")]
    UnboundRoutine(String),

    /// A marketplace transaction could not be decoded.
    #[error(transparent)]
    Decoding(#[from] DecodingFailure),

    /// A normalized event violated a model invariant.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// The chain-query collaborator was unavailable or returned nothing.
    #[error("fetch failed for {target}: {reason}")]
    Fetch {
        /// Signature or authority being fetched.
        target: String,
        /// Underlying failure.
        reason: String,
    },

    /// Stream write failed after local retries.
    #[error(transparent)]
    Publish(#[from] PublishFailure),

    /// A routine exceeded its time budget.
    #[error("routine {routine_type} timed out after {elapsed_ms} ms")]
    Timeout {
        /// Routine that timed out.
        routine_type: String,
        /// Wall-clock time spent before the deadline fired.
        elapsed_ms: u64,
    },

    /// The timeout handler itself did not finish within its grace period.
    #[error("fatal: {0}")]
    Fatal(String),

    /// Queue backend failure.
    #[error("queue error: {0}")]
    Queue(String),

    /// Storage backend failure (dedupe store, stream table).
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid or inconsistent configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON encoding or decoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Builds a [`PipelineError::ParamsInvalid`] for the given routine.
    #[must_use]
    pub fn params_invalid(routine_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParamsInvalid {
            routine_type: routine_type.into(),
            reason: reason.into(),
        }
    }

    /// Builds a [`PipelineError::Fetch`] for the given target.
    #[must_use]
    pub fn fetch(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::ParamsInvalid { .. } => 1001,
            Self::UnknownRoutine(_) => 1002,
            Self::Decoding(_) => 1003,
            Self::InvalidEvent(_) => 1004,
            Self::Fetch { .. } => 2001,
            Self::Publish(_) => 2002,
            Self::Queue(_) => 2003,
            Self::Storage(_) => 2004,
            Self::UnboundRoutine(_) => 2005,
            Self::Internal(_) => 3000,
            Self::Timeout { .. } => 3001,
            Self::Fatal(_) => 3002,
            Self::Config(_) => 4001,
            Self::Serialization(_) => 4002,
        }
    }

    /// Returns `true` if redelivering the same message may succeed.
    ///
    /// Malformed input and unknown routines never get better on retry;
    /// everything that depends on a collaborator or on timing might.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::ParamsInvalid { .. }
                | Self::UnknownRoutine(_)
                | Self::Config(_)
                | Self::Serialization(_)
        )
    }

    /// Returns a short snake_case label for logs and alert metadata.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ParamsInvalid { .. } => "params_invalid",
            Self::UnknownRoutine(_) => "unknown_routine",
            Self::UnboundRoutine(_) => "unbound_routine",
            Self::Decoding(_) => "decoding_failure",
            Self::InvalidEvent(_) => "invalid_event",
            Self::Fetch { .. } => "fetch_failure",
            Self::Publish(_) => "publish_failure",
            Self::Timeout { .. } => "timeout",
            Self::Fatal(_) => "fatal",
            Self::Queue(_) => "queue",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn params_invalid_is_not_retryable() {
        let err = PipelineError::params_invalid("sme_indexer", "signatures must not be empty");
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), 1001);
        assert_eq!(err.kind(), "params_invalid");
    }

    #[test]
    fn collaborator_failures_are_retryable() {
        assert!(PipelineError::fetch("abc", "connection refused").is_retryable());
        let publish = PipelineError::from(PublishFailure {
            failed: vec![1, 3],
            total: 5,
            reason: "throttled".to_string(),
        });
        assert!(publish.is_retryable());
        assert_eq!(publish.error_code(), 2002);
        assert!(PipelineError::Fatal("handler hung".to_string()).is_retryable());
    }

    #[test]
    fn unbound_follow_up_is_distinct_from_unknown_routine() {
        let unbound = PipelineError::UnboundRoutine("asset_index".to_string());
        assert!(unbound.is_retryable());
        assert_eq!(unbound.error_code(), 2005);
        assert_eq!(unbound.kind(), "unbound_routine");
        assert!(!PipelineError::UnknownRoutine("asset_index".to_string()).is_retryable());
    }

    #[test]
    fn publish_failure_message_counts_failed_records() {
        let failure = PublishFailure {
            failed: vec![1, 3],
            total: 5,
            reason: "throttled".to_string(),
        };
        assert_eq!(
            failure.to_string(),
            "2 of 5 records failed to publish: throttled"
        );
    }

    #[test]
    fn decoding_failure_display_names_market() {
        let failure = DecodingFailure {
            signature: "sig1".to_string(),
            market: MarketId::MagicEden,
            reason: "instruction data too short".to_string(),
        };
        let err = PipelineError::from(failure);
        assert_eq!(
            err.to_string(),
            "cannot decode MagicEden transaction sig1: instruction data too short"
        );
        assert_eq!(err.kind(), "decoding_failure");
    }
}
