//! Queue abstraction, bindings and routing.
//!
//! Queues are addressed by URL. A [`QueueBindings`] table maps each routine
//! type to the queue its invocations travel on; the [`QueueRouter`] is the
//! only component that talks to [`QueueClient`] implementations.

pub mod binding;
pub mod memory;
pub mod message;
pub mod router;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

pub use binding::{QueueBinding, QueueBindings};
pub use memory::MemoryQueue;
pub use message::ReceivedMessage;
pub use router::QueueRouter;

use crate::error::PipelineError;

/// Visibility-timeout message queue.
///
/// A received message stays invisible for the visibility timeout and is
/// redelivered unless it is deleted first.
#[async_trait]
pub trait QueueClient: Send + Sync + fmt::Debug {
    /// Enqueues `body`, returning the message id.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Queue`] if the backend rejects the message.
    async fn send(&self, queue_url: &str, body: &str) -> Result<String, PipelineError>;

    /// Receives up to `max` visible messages and hides them for
    /// `visibility`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Queue`] if the backend is unreachable.
    async fn receive(
        &self,
        queue_url: &str,
        max: usize,
        visibility: Duration,
    ) -> Result<Vec<ReceivedMessage>, PipelineError>;

    /// Deletes a received message.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Queue`] if the receipt is unknown or the
    /// backend is unreachable.
    async fn delete(&self, queue_url: &str, receipt: &str) -> Result<(), PipelineError>;

    /// Makes a received message visible again after `delay`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Queue`] if the receipt is unknown or the
    /// backend is unreachable.
    async fn release(
        &self,
        queue_url: &str,
        receipt: &str,
        delay: Duration,
    ) -> Result<(), PipelineError>;
}
