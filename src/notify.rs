//! Best-effort error notification.
//!
//! Notifiers never fail the caller: `notify` has no error return, and a
//! notifier that cannot deliver logs the problem and moves on.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::routine::Invocation;

/// Context attached to a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationMetadata {
    /// Routine the failure happened in, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routine_type: Option<String>,
    /// Invocation id for log correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<Uuid>,
    /// Delivery attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Short digest of the invocation parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params_digest: Option<String>,
    /// Queue the message came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    /// Transaction signature for per-item failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl NotificationMetadata {
    /// Metadata describing `invocation`.
    #[must_use]
    pub fn for_invocation(invocation: &Invocation) -> Self {
        Self {
            routine_type: Some(invocation.routine_type().to_string()),
            invocation_id: Some(invocation.id),
            attempt: Some(invocation.attempt),
            params_digest: Some(invocation.params_digest()),
            ..Self::default()
        }
    }

    /// Metadata naming only a routine.
    #[must_use]
    pub fn for_routine(routine_type: impl Into<String>) -> Self {
        Self {
            routine_type: Some(routine_type.into()),
            ..Self::default()
        }
    }

    /// Adds the source queue.
    #[must_use]
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Adds a transaction signature.
    #[must_use]
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }
}

/// Receives `(error, metadata)` pairs.
#[async_trait]
pub trait ErrorNotifier: Send + Sync + fmt::Debug {
    /// Reports `error`. Must not panic and must not block for long.
    async fn notify(&self, error: &PipelineError, metadata: &NotificationMetadata);
}

/// Notifier that only writes structured log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl ErrorNotifier for LogNotifier {
    async fn notify(&self, error: &PipelineError, metadata: &NotificationMetadata) {
        tracing::error!(
            error_code = error.error_code(),
            kind = error.kind(),
            routine_type = metadata.routine_type.as_deref().unwrap_or_default(),
            invocation_id = ?metadata.invocation_id,
            attempt = ?metadata.attempt,
            params_digest = metadata.params_digest.as_deref().unwrap_or_default(),
            signature = metadata.signature.as_deref().unwrap_or_default(),
            "{error}"
        );
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    error_code: u32,
    kind: &'static str,
    message: String,
    timestamp: String,
    #[serde(flatten)]
    metadata: &'a NotificationMetadata,
}

/// Notifier posting JSON alerts to an HTTP endpoint, and logging them.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// Creates a notifier posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot build webhook client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ErrorNotifier for WebhookNotifier {
    async fn notify(&self, error: &PipelineError, metadata: &NotificationMetadata) {
        LogNotifier.notify(error, metadata).await;
        let payload = WebhookPayload {
            error_code: error.error_code(),
            kind: error.kind(),
            message: error.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            metadata,
        };
        match self.http.post(&self.url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                tracing::warn!(status = resp.status().as_u16(), "alert webhook rejected notification");
            }
            Err(err) => tracing::warn!(error = %err, "alert webhook unreachable"),
        }
    }
}

/// A notification captured by [`MemoryNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedNotification {
    /// [`PipelineError::kind`] of the reported error.
    pub kind: &'static str,
    /// Rendered error message.
    pub message: String,
    /// Attached metadata.
    pub metadata: NotificationMetadata,
}

/// Notifier that keeps every notification in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    captured: Mutex<Vec<CapturedNotification>>,
}

impl MemoryNotifier {
    /// Creates an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far.
    pub async fn captured(&self) -> Vec<CapturedNotification> {
        self.captured.lock().await.clone()
    }

    /// Notifications of the given kind.
    pub async fn of_kind(&self, kind: &str) -> Vec<CapturedNotification> {
        self.captured
            .lock()
            .await
            .iter()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ErrorNotifier for MemoryNotifier {
    async fn notify(&self, error: &PipelineError, metadata: &NotificationMetadata) {
        self.captured.lock().await.push(CapturedNotification {
            kind: error.kind(),
            message: error.to_string(),
            metadata: metadata.clone(),
        });
    }
}
