//! In-memory visibility-timeout queue.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::{QueueClient, ReceivedMessage};
use crate::error::PipelineError;

#[derive(Debug, Clone)]
struct Stored {
    message_id: String,
    body: String,
    receive_count: u32,
    visible_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    waiting: Vec<Stored>,
    in_flight: HashMap<String, Stored>,
}

impl QueueState {
    /// Returns expired deliveries to the waiting list.
    fn reclaim(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, m)| m.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        for receipt in expired {
            if let Some(message) = self.in_flight.remove(&receipt) {
                self.waiting.push(message);
            }
        }
    }
}

/// Queue backend living in process memory.
///
/// Queues are created on first use. Used for local runs and tests.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, QueueState>>,
}

impl MemoryQueue {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages waiting or in flight on `queue_url`.
    pub async fn len(&self, queue_url: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue_url)
            .map_or(0, |q| q.waiting.len() + q.in_flight.len())
    }

    /// Returns `true` if `queue_url` holds no message.
    pub async fn is_empty(&self, queue_url: &str) -> bool {
        self.len(queue_url).await == 0
    }

    /// Messages currently received and not yet deleted or released.
    pub async fn in_flight(&self, queue_url: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue_url)
            .map_or(0, |q| q.in_flight.len())
    }

    /// Bodies of every message on `queue_url`, waiting ones first.
    pub async fn bodies(&self, queue_url: &str) -> Vec<String> {
        self.queues
            .lock()
            .await
            .get(queue_url)
            .map(|q| {
                q.waiting
                    .iter()
                    .chain(q.in_flight.values())
                    .map(|m| m.body.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn send(&self, queue_url: &str, body: &str) -> Result<String, PipelineError> {
        let message_id = Uuid::new_v4().to_string();
        self.queues
            .lock()
            .await
            .entry(queue_url.to_string())
            .or_default()
            .waiting
            .push(Stored {
                message_id: message_id.clone(),
                body: body.to_string(),
                receive_count: 0,
                visible_at: Instant::now(),
            });
        Ok(message_id)
    }

    async fn receive(
        &self,
        queue_url: &str,
        max: usize,
        visibility: Duration,
    ) -> Result<Vec<ReceivedMessage>, PipelineError> {
        let mut queues = self.queues.lock().await;
        let Some(queue) = queues.get_mut(queue_url) else {
            return Ok(Vec::new());
        };
        let now = Instant::now();
        queue.reclaim(now);

        let mut received = Vec::new();
        let mut index = 0;
        while received.len() < max && index < queue.waiting.len() {
            let visible = queue
                .waiting
                .get(index)
                .is_some_and(|m| m.visible_at <= now);
            if !visible {
                index += 1;
                continue;
            }
            let mut message = queue.waiting.remove(index);
            message.receive_count += 1;
            message.visible_at = now + visibility;
            let receipt = Uuid::new_v4().to_string();
            received.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                receipt: receipt.clone(),
                body: message.body.clone(),
                receive_count: message.receive_count,
            });
            queue.in_flight.insert(receipt, message);
        }
        Ok(received)
    }

    async fn delete(&self, queue_url: &str, receipt: &str) -> Result<(), PipelineError> {
        let mut queues = self.queues.lock().await;
        queues
            .get_mut(queue_url)
            .and_then(|q| q.in_flight.remove(receipt))
            .map(|_| ())
            .ok_or_else(|| PipelineError::Queue(format!("unknown receipt on {queue_url}")))
    }

    async fn release(
        &self,
        queue_url: &str,
        receipt: &str,
        delay: Duration,
    ) -> Result<(), PipelineError> {
        let mut queues = self.queues.lock().await;
        let queue = queues
            .get_mut(queue_url)
            .ok_or_else(|| PipelineError::Queue(format!("unknown queue {queue_url}")))?;
        let mut message = queue
            .in_flight
            .remove(receipt)
            .ok_or_else(|| PipelineError::Queue(format!("unknown receipt on {queue_url}")))?;
        message.visible_at = Instant::now() + delay;
        queue.waiting.push(message);
        Ok(())
    }
}
