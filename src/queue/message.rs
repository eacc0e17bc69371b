//! Received queue message.

/// A message handed out by [`QueueClient::receive`](super::QueueClient::receive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Backend message id, stable across deliveries.
    pub message_id: String,
    /// Handle for deleting or releasing this delivery.
    pub receipt: String,
    /// Raw body.
    pub body: String,
    /// Deliveries so far, including this one.
    pub receive_count: u32,
}
