//! Stream record and per-record write status.

use uuid::Uuid;

use crate::domain::SecondaryMarketEvent;
use crate::error::PipelineError;

/// One record handed to a [`StreamSink`](super::StreamSink).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    /// Random partition key; consumers get no per-key ordering.
    pub partition_key: String,
    /// Flat camelCase JSON encoding of the event.
    pub data: Vec<u8>,
}

impl StreamRecord {
    /// Encodes `event` under a fresh UUID v4 partition key.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Serialization`] if the event cannot be
    /// encoded.
    pub fn from_event(event: &SecondaryMarketEvent) -> Result<Self, PipelineError> {
        Ok(Self {
            partition_key: Uuid::new_v4().to_string(),
            data: event.to_stream_bytes()?,
        })
    }

    /// Decodes the payload back into an event.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Serialization`] if the payload is not an
    /// event.
    pub fn decode_event(&self) -> Result<SecondaryMarketEvent, PipelineError> {
        Ok(serde_json::from_slice(&self.data)?)
    }
}

/// Sink verdict for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    /// Durably written.
    Accepted {
        /// Sink-assigned sequence number.
        sequence: String,
    },
    /// Not written; may be retried.
    Rejected {
        /// Sink-reported reason (throttling, internal failure).
        reason: String,
    },
}

impl RecordStatus {
    /// Returns `true` for [`RecordStatus::Accepted`].
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}
