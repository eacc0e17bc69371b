//! Invocation wire body and its decoded form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::PipelineError;

fn empty_params() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Queue message body: `{routine_type, params, timeout_seconds?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Routine the message is addressed to.
    pub routine_type: String,
    /// Routine parameters; always a JSON object.
    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
    /// Overrides the routine's default time budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl InvocationRequest {
    /// Creates a request with no timeout override.
    #[must_use]
    pub fn new(routine_type: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            routine_type: routine_type.into(),
            params,
            timeout_seconds: None,
        }
    }

    /// Sets the per-message timeout override.
    #[must_use]
    pub const fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    /// Lowers the per-message timeout to at most `max_seconds`.
    ///
    /// Returns the requested value when it had to be lowered.
    pub fn cap_timeout(&mut self, max_seconds: u64) -> Option<u64> {
        let requested = self.timeout_seconds.filter(|s| *s > max_seconds)?;
        self.timeout_seconds = Some(max_seconds);
        Some(requested)
    }

    /// Decodes and checks a queue message body.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Serialization`] for bodies that are not the
    /// expected JSON shape, and [`PipelineError::ParamsInvalid`] when the
    /// routine type is empty, `params` is not an object, or the timeout is
    /// zero.
    pub fn from_body(body: &str) -> Result<Self, PipelineError> {
        let request: Self = serde_json::from_str(body)?;
        request.check()?;
        Ok(request)
    }

    /// Encodes the request as a queue message body.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Serialization`] if encoding fails.
    pub fn to_body(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string(self)?)
    }

    fn check(&self) -> Result<(), PipelineError> {
        if self.routine_type.trim().is_empty() {
            return Err(PipelineError::params_invalid("", "routine_type is empty"));
        }
        if !self.params.is_object() {
            return Err(PipelineError::params_invalid(
                self.routine_type.as_str(),
                "params must be a JSON object",
            ));
        }
        if self.timeout_seconds == Some(0) {
            return Err(PipelineError::params_invalid(
                self.routine_type.as_str(),
                "timeout_seconds must be positive",
            ));
        }
        Ok(())
    }
}

/// A decoded request plus delivery metadata.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Unique id for log correlation.
    pub id: Uuid,
    /// Decoded message body.
    pub request: InvocationRequest,
    /// How many times the queue has delivered this message (1 on first
    /// delivery).
    pub attempt: u32,
    /// When the worker received the message.
    pub received_at: DateTime<Utc>,
}

impl Invocation {
    /// Wraps a request received for the `attempt`-th time.
    #[must_use]
    pub fn new(request: InvocationRequest, attempt: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            attempt,
            received_at: Utc::now(),
        }
    }

    /// Returns the addressed routine type.
    #[must_use]
    pub fn routine_type(&self) -> &str {
        &self.request.routine_type
    }

    /// Short SHA-256 digest of the parameters, used to correlate alerts
    /// about the same input without logging it in full.
    #[must_use]
    pub fn params_digest(&self) -> String {
        let digest = Sha256::digest(self.request.params.to_string().as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(16);
        hex
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_minimal_body() {
        let Ok(request) = InvocationRequest::from_body(r#"{"routine_type":"collection_scan"}"#)
        else {
            panic!("decode failed");
        };
        assert_eq!(request.routine_type, "collection_scan");
        assert_eq!(request.params, json!({}));
        assert_eq!(request.timeout_seconds, None);
    }

    #[test]
    fn decodes_timeout_override() {
        let body = r#"{"routine_type":"sme_indexer","params":{"signatures":["a"]},"timeout_seconds":30}"#;
        let Ok(request) = InvocationRequest::from_body(body) else {
            panic!("decode failed");
        };
        assert_eq!(request.timeout_seconds, Some(30));
    }

    #[test]
    fn rejects_non_object_params() {
        let Err(err) = InvocationRequest::from_body(r#"{"routine_type":"x","params":[1]}"#) else {
            panic!("expected rejection");
        };
        assert_eq!(err.kind(), "params_invalid");
    }

    #[test]
    fn rejects_zero_timeout() {
        let body = r#"{"routine_type":"x","params":{},"timeout_seconds":0}"#;
        assert!(InvocationRequest::from_body(body).is_err());
    }

    #[test]
    fn timeout_is_capped_only_when_above_limit() {
        let mut long = InvocationRequest::new("x", json!({})).with_timeout_seconds(3600);
        assert_eq!(long.cap_timeout(30), Some(3600));
        assert_eq!(long.timeout_seconds, Some(30));

        let mut short = InvocationRequest::new("x", json!({})).with_timeout_seconds(10);
        assert_eq!(short.cap_timeout(30), None);
        assert_eq!(short.timeout_seconds, Some(10));

        let mut unset = InvocationRequest::new("x", json!({}));
        assert_eq!(unset.cap_timeout(30), None);
        assert_eq!(unset.timeout_seconds, None);
    }

    #[test]
    fn malformed_json_is_serialization_error() {
        let Err(err) = InvocationRequest::from_body("not json") else {
            panic!("expected rejection");
        };
        assert_eq!(err.kind(), "serialization");
        assert!(!err.is_retryable());
    }

    #[test]
    fn body_omits_missing_timeout() {
        let request = InvocationRequest::new("sme_indexer", json!({"signatures": ["s"]}));
        let Ok(body) = request.to_body() else {
            panic!("encode failed");
        };
        assert!(!body.contains("timeout_seconds"));
    }

    #[test]
    fn digest_depends_only_on_params() {
        let a = Invocation::new(InvocationRequest::new("x", json!({"k": 1})), 1);
        let b = Invocation::new(InvocationRequest::new("x", json!({"k": 1})), 3);
        let c = Invocation::new(InvocationRequest::new("x", json!({"k": 2})), 1);
        assert_eq!(a.params_digest(), b.params_digest());
        assert_ne!(a.params_digest(), c.params_digest());
        assert_eq!(a.params_digest().len(), 16);
        assert_ne!(a.id, b.id);
    }
}
