//! Stream publishing: records, sinks, the retrying publisher and the dedupe
//! stage in front of it.
//!
//! ```text
//! events ─► DedupePublishStage ─► StreamPublisher ─► StreamSink ─► stream
//!               │    ▲                  │ retries only rejected records
//!               ▼    │ record identities│
//!             DedupeStore ◄─────────────┘ after durable write
//! ```

pub mod dedupe;
pub mod memory;
pub mod publisher;
pub mod record;
pub mod retry;

use std::fmt;

use async_trait::async_trait;

pub use dedupe::{DedupePublishStage, DedupeStore, RecentIdentityCache, StageReport};
pub use memory::MemoryStream;
pub use publisher::StreamPublisher;
pub use record::{RecordStatus, StreamRecord};
pub use retry::RetryPolicy;

use crate::error::PipelineError;

/// Durable append-only stream.
///
/// A call may partially succeed: the sink reports one [`RecordStatus`] per
/// input record, in input order.
#[async_trait]
pub trait StreamSink: Send + Sync + fmt::Debug {
    /// Appends `records` to `stream`.
    ///
    /// # Errors
    ///
    /// Returns an error when the whole call failed and no record was
    /// written.
    async fn put_records(
        &self,
        stream: &str,
        records: &[StreamRecord],
    ) -> Result<Vec<RecordStatus>, PipelineError>;
}
