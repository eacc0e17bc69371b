//! Routes invocations to the queues their routines are bound to.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{QueueBindings, QueueClient, ReceivedMessage};
use crate::error::PipelineError;
use crate::routine::InvocationRequest;

/// Front door to the queue backends.
///
/// Bindings whose `endpoint_override` has a registered client use that
/// client; every other queue goes through the default client.
#[derive(Debug, Clone)]
pub struct QueueRouter {
    bindings: QueueBindings,
    default_client: Arc<dyn QueueClient>,
    endpoint_clients: Arc<HashMap<String, Arc<dyn QueueClient>>>,
}

impl QueueRouter {
    /// Creates a router sending everything through `client`.
    #[must_use]
    pub fn new(bindings: QueueBindings, client: Arc<dyn QueueClient>) -> Self {
        Self {
            bindings,
            default_client: client,
            endpoint_clients: Arc::new(HashMap::new()),
        }
    }

    /// Registers the client serving queues with `endpoint` as override.
    #[must_use]
    pub fn with_endpoint_client(
        mut self,
        endpoint: impl Into<String>,
        client: Arc<dyn QueueClient>,
    ) -> Self {
        Arc::make_mut(&mut self.endpoint_clients).insert(endpoint.into(), client);
        self
    }

    /// The binding table.
    #[must_use]
    pub const fn bindings(&self) -> &QueueBindings {
        &self.bindings
    }

    /// The override endpoint whose client serves `queue_url`, if any.
    ///
    /// `None` means the default client serves the queue, including when
    /// the binding names an endpoint nobody registered a client for.
    #[must_use]
    pub fn endpoint_serving(&self, queue_url: &str) -> Option<&str> {
        self.bindings
            .binding_for_queue(queue_url)
            .and_then(|b| b.endpoint_override.as_deref())
            .filter(|endpoint| self.endpoint_clients.contains_key(*endpoint))
    }

    fn client_for(&self, queue_url: &str) -> Arc<dyn QueueClient> {
        self.endpoint_serving(queue_url)
            .and_then(|endpoint| self.endpoint_clients.get(endpoint))
            .map_or_else(|| Arc::clone(&self.default_client), Arc::clone)
    }

    /// Enqueues an invocation of `routine_type` with `params`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnboundRoutine`] if the routine has no
    /// binding, or the backend's error if the send fails.
    pub async fn dispatch(
        &self,
        routine_type: &str,
        params: serde_json::Value,
    ) -> Result<String, PipelineError> {
        self.dispatch_request(&InvocationRequest::new(routine_type, params))
            .await
    }

    /// Enqueues a prepared request.
    ///
    /// # Errors
    ///
    /// Same as [`QueueRouter::dispatch`].
    pub async fn dispatch_request(
        &self,
        request: &InvocationRequest,
    ) -> Result<String, PipelineError> {
        let binding = self
            .bindings
            .for_routine(&request.routine_type)
            .ok_or_else(|| PipelineError::UnboundRoutine(request.routine_type.clone()))?;
        let body = request.to_body()?;
        let message_id = self
            .client_for(&binding.queue_url)
            .send(&binding.queue_url, &body)
            .await?;
        tracing::debug!(
            routine_type = %request.routine_type,
            queue = %binding.queue_url,
            %message_id,
            "invocation dispatched"
        );
        Ok(message_id)
    }

    /// Receives up to `max` messages from `queue_url`.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub async fn receive(
        &self,
        queue_url: &str,
        max: usize,
        visibility: Duration,
    ) -> Result<Vec<ReceivedMessage>, PipelineError> {
        self.client_for(queue_url)
            .receive(queue_url, max, visibility)
            .await
    }

    /// Deletes a processed message.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub async fn ack(&self, queue_url: &str, message: &ReceivedMessage) -> Result<(), PipelineError> {
        self.client_for(queue_url)
            .delete(queue_url, &message.receipt)
            .await
    }

    /// Makes a message visible again after `delay`.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub async fn release(
        &self,
        queue_url: &str,
        message: &ReceivedMessage,
        delay: Duration,
    ) -> Result<(), PipelineError> {
        self.client_for(queue_url)
            .release(queue_url, &message.receipt, delay)
            .await
    }

    /// Moves a message to the dead-letter queue of `queue_url`.
    ///
    /// Returns `false`, leaving the message untouched, when the queue has
    /// no dead-letter queue.
    ///
    /// # Errors
    ///
    /// Returns the backend's error. The original is only deleted after the
    /// copy was sent.
    pub async fn dead_letter(
        &self,
        queue_url: &str,
        message: &ReceivedMessage,
    ) -> Result<bool, PipelineError> {
        let Some(dead_letter_url) = self
            .bindings
            .binding_for_queue(queue_url)
            .and_then(|b| b.dead_letter_url.as_deref())
        else {
            return Ok(false);
        };
        self.client_for(dead_letter_url)
            .send(dead_letter_url, &message.body)
            .await?;
        self.ack(queue_url, message).await?;
        tracing::warn!(
            queue = queue_url,
            dead_letter = dead_letter_url,
            message_id = %message.message_id,
            receive_count = message.receive_count,
            "message dead-lettered"
        );
        Ok(true)
    }
}
