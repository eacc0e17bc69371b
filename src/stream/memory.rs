//! In-memory stream sink with failure injection.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{RecordStatus, StreamRecord, StreamSink};
use crate::domain::SecondaryMarketEvent;
use crate::error::PipelineError;

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<String, Vec<StreamRecord>>,
    next_sequence: u64,
    /// Per upcoming call: positions (within that call) to reject.
    failure_plan: VecDeque<HashSet<usize>>,
    failing_calls: u32,
    call_sizes: Vec<usize>,
}

/// Stream sink that keeps records in memory.
///
/// Tests script partial failures with [`MemoryStream::reject_next_call_at`]
/// and whole-call failures with [`MemoryStream::fail_next_calls`].
#[derive(Debug, Default)]
pub struct MemoryStream {
    inner: Mutex<Inner>,
}

impl MemoryStream {
    /// Creates an empty stream sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the records at `positions` of the next scripted call.
    ///
    /// Calls are scripted in order; each scripted entry applies to exactly
    /// one `put_records` call.
    pub async fn reject_next_call_at(&self, positions: impl IntoIterator<Item = usize>) {
        self.inner
            .lock()
            .await
            .failure_plan
            .push_back(positions.into_iter().collect());
    }

    /// Fails the next `calls` calls outright.
    pub async fn fail_next_calls(&self, calls: u32) {
        self.inner.lock().await.failing_calls = calls;
    }

    /// Records durably written to `stream`, in write order.
    pub async fn records(&self, stream: &str) -> Vec<StreamRecord> {
        self.inner
            .lock()
            .await
            .streams
            .get(stream)
            .cloned()
            .unwrap_or_default()
    }

    /// Events written to `stream`, decoded. Undecodable records are
    /// skipped.
    pub async fn events(&self, stream: &str) -> Vec<SecondaryMarketEvent> {
        self.records(stream)
            .await
            .iter()
            .filter_map(|r| r.decode_event().ok())
            .collect()
    }

    /// Number of records in each `put_records` call so far.
    pub async fn call_sizes(&self) -> Vec<usize> {
        self.inner.lock().await.call_sizes.clone()
    }
}

#[async_trait]
impl StreamSink for MemoryStream {
    async fn put_records(
        &self,
        stream: &str,
        records: &[StreamRecord],
    ) -> Result<Vec<RecordStatus>, PipelineError> {
        let mut inner = self.inner.lock().await;
        inner.call_sizes.push(records.len());

        if inner.failing_calls > 0 {
            inner.failing_calls -= 1;
            return Err(PipelineError::Storage("stream unavailable".to_string()));
        }

        let rejected = inner.failure_plan.pop_front().unwrap_or_default();
        let mut statuses = Vec::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            if rejected.contains(&position) {
                statuses.push(RecordStatus::Rejected {
                    reason: "ProvisionedThroughputExceeded".to_string(),
                });
                continue;
            }
            inner.next_sequence += 1;
            let sequence = inner.next_sequence.to_string();
            inner
                .streams
                .entry(stream.to_string())
                .or_default()
                .push(record.clone());
            statuses.push(RecordStatus::Accepted { sequence });
        }
        Ok(statuses)
    }
}
