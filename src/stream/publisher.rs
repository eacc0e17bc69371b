//! Batched stream publisher with per-record retry.

use std::sync::Arc;

use super::{RecordStatus, RetryPolicy, StreamRecord, StreamSink};
use crate::domain::SecondaryMarketEvent;
use crate::error::PublishFailure;

/// Publishes events to one stream.
///
/// Events are encoded independently under random partition keys and sent in
/// batches of at most `batch_size`. When a batch partially fails only the
/// rejected records are resent, with exponential backoff, until the retry
/// policy is exhausted.
#[derive(Debug, Clone)]
pub struct StreamPublisher {
    sink: Arc<dyn StreamSink>,
    stream_name: String,
    batch_size: usize,
    retry: RetryPolicy,
}

impl StreamPublisher {
    /// Creates a publisher. A zero `batch_size` is treated as 1.
    #[must_use]
    pub fn new(
        sink: Arc<dyn StreamSink>,
        stream_name: impl Into<String>,
        batch_size: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            sink,
            stream_name: stream_name.into(),
            batch_size: batch_size.max(1),
            retry,
        }
    }

    /// Name of the target stream.
    #[must_use]
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Publishes `events`, returning how many were written.
    ///
    /// # Errors
    ///
    /// Returns a [`PublishFailure`] whose `failed` holds the indices (into
    /// `events`) of every record that could not be encoded or was still
    /// rejected after the last retry. All other records were written.
    pub async fn publish(&self, events: &[SecondaryMarketEvent]) -> Result<usize, PublishFailure> {
        let mut failed = Vec::new();
        let mut last_reason = None;
        let mut encoded = Vec::with_capacity(events.len());

        for (index, event) in events.iter().enumerate() {
            match StreamRecord::from_event(event) {
                Ok(record) => encoded.push((index, record)),
                Err(err) => {
                    tracing::warn!(index, error = %err, "dropping unencodable event");
                    last_reason = Some(err.to_string());
                    failed.push(index);
                }
            }
        }

        let mut published = 0usize;
        let mut pending = encoded.into_iter().peekable();
        while pending.peek().is_some() {
            let (indices, records): (Vec<usize>, Vec<StreamRecord>) =
                pending.by_ref().take(self.batch_size).unzip();
            let batch = self.put_with_retry(indices, records).await;
            published += batch.written;
            failed.extend(batch.failed);
            if batch.reason.is_some() {
                last_reason = batch.reason;
            }
        }

        if failed.is_empty() {
            tracing::debug!(stream = %self.stream_name, published, "events published");
            return Ok(published);
        }
        failed.sort_unstable();
        Err(PublishFailure {
            failed,
            total: events.len(),
            reason: last_reason.unwrap_or_else(|| "rejected by stream".to_string()),
        })
    }

    async fn put_with_retry(
        &self,
        mut indices: Vec<usize>,
        mut records: Vec<StreamRecord>,
    ) -> BatchResult {
        let mut written = 0usize;
        let mut reason = None;
        let mut retry = 0u32;

        loop {
            let result = self.sink.put_records(&self.stream_name, &records).await;
            match result {
                Ok(statuses) if statuses.len() == records.len() => {
                    let mut retry_indices = Vec::new();
                    let mut retry_records = Vec::new();
                    for ((index, record), status) in indices.into_iter().zip(records).zip(statuses)
                    {
                        match status {
                            RecordStatus::Accepted { .. } => written += 1,
                            RecordStatus::Rejected { reason: why } => {
                                reason = Some(why);
                                retry_indices.push(index);
                                retry_records.push(record);
                            }
                        }
                    }
                    indices = retry_indices;
                    records = retry_records;
                }
                Ok(statuses) => {
                    reason = Some(format!(
                        "sink returned {} statuses for {} records",
                        statuses.len(),
                        records.len()
                    ));
                }
                Err(err) => reason = Some(err.to_string()),
            }

            if records.is_empty() {
                return BatchResult {
                    written,
                    failed: Vec::new(),
                    reason: None,
                };
            }
            if retry >= self.retry.max_retries {
                tracing::error!(
                    stream = %self.stream_name,
                    failed = records.len(),
                    retries = retry,
                    "records still rejected after retries"
                );
                return BatchResult {
                    written,
                    failed: indices,
                    reason,
                };
            }

            let delay = self.retry.delay_for(retry);
            tracing::warn!(
                stream = %self.stream_name,
                rejected = records.len(),
                retry = retry + 1,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "retrying rejected records"
            );
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }
}

#[derive(Debug)]
struct BatchResult {
    written: usize,
    failed: Vec<usize>,
    reason: Option<String>,
}
