//! Dedupe-then-publish stage.
//!
//! Identities are recorded only after their events were durably written, so
//! the store never claims an identity whose event was lost. The opposite
//! error (an identity missing from the store) only causes a duplicate
//! record, which downstream consumers tolerate.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::StreamPublisher;
use crate::domain::{DedupeIdentity, SecondaryMarketEvent};
use crate::error::PipelineError;

/// Membership store of already-published identities.
///
/// Must tolerate concurrent `seen` and `record` calls from many workers.
#[async_trait]
pub trait DedupeStore: Send + Sync + fmt::Debug {
    /// Returns the subset of `identities` that was recorded before.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn seen(
        &self,
        identities: &[DedupeIdentity],
    ) -> Result<HashSet<DedupeIdentity>, PipelineError>;

    /// Marks `identities` as published.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn record(&self, identities: &[DedupeIdentity]) -> Result<(), PipelineError>;
}

#[derive(Debug, Default)]
struct CacheInner {
    members: HashSet<DedupeIdentity>,
    order: VecDeque<DedupeIdentity>,
}

/// Bounded in-process store remembering the most recent identities.
///
/// Evicts oldest first. Eviction only loses dedupe coverage for old
/// identities; it never reports an unseen identity as seen.
#[derive(Debug)]
pub struct RecentIdentityCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl RecentIdentityCache {
    /// Creates a cache holding at most `capacity` identities (at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Number of identities currently held.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.members.len()
    }

    /// Returns `true` if no identity is held.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.members.is_empty()
    }
}

#[async_trait]
impl DedupeStore for RecentIdentityCache {
    async fn seen(
        &self,
        identities: &[DedupeIdentity],
    ) -> Result<HashSet<DedupeIdentity>, PipelineError> {
        let inner = self.inner.lock().await;
        Ok(identities
            .iter()
            .filter(|id| inner.members.contains(*id))
            .cloned()
            .collect())
    }

    async fn record(&self, identities: &[DedupeIdentity]) -> Result<(), PipelineError> {
        let mut inner = self.inner.lock().await;
        for id in identities {
            if inner.members.insert(id.clone()) {
                inner.order.push_back(id.clone());
            }
        }
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.members.remove(&oldest);
            }
        }
        Ok(())
    }
}

/// Counters produced by one pass of the stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Events handed to the stage.
    pub received: usize,
    /// Events dropped as duplicates (in-batch or previously published).
    pub duplicates: usize,
    /// Events written to the stream.
    pub published: usize,
}

/// Drops already-published events, publishes the rest and records their
/// identities.
#[derive(Debug, Clone)]
pub struct DedupePublishStage {
    store: Arc<dyn DedupeStore>,
    publisher: StreamPublisher,
}

impl DedupePublishStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(store: Arc<dyn DedupeStore>, publisher: StreamPublisher) -> Self {
        Self { store, publisher }
    }

    /// Runs one batch through dedupe and publishing.
    ///
    /// Events with an empty transaction hash bypass dedupe and are always
    /// published. A store that cannot be reached is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Publish`] if some survivors were not
    /// written. Identities of the survivors that were written are recorded
    /// before returning, so a redelivery only republishes the failed ones.
    pub async fn process(
        &self,
        events: Vec<SecondaryMarketEvent>,
    ) -> Result<StageReport, PipelineError> {
        let received = events.len();
        let mut batch_ids = HashSet::new();
        let mut candidates = Vec::with_capacity(received);
        for event in events {
            let id = event.dedupe_identity();
            if let Some(ref id) = id
                && !batch_ids.insert(id.clone())
            {
                continue;
            }
            candidates.push((id, event));
        }

        let lookup: Vec<DedupeIdentity> = candidates
            .iter()
            .filter_map(|(id, _)| id.clone())
            .collect();
        let seen = if lookup.is_empty() {
            HashSet::new()
        } else {
            self.store.seen(&lookup).await.unwrap_or_else(|err| {
                tracing::warn!(error = %err, "dedupe store unavailable, treating batch as novel");
                HashSet::new()
            })
        };

        let (ids, survivors): (Vec<Option<DedupeIdentity>>, Vec<SecondaryMarketEvent>) =
            candidates
                .into_iter()
                .filter(|(id, _)| id.as_ref().is_none_or(|id| !seen.contains(id)))
                .unzip();
        let duplicates = received - survivors.len();
        if survivors.is_empty() {
            tracing::debug!(received, duplicates, "batch fully deduplicated");
            return Ok(StageReport {
                received,
                duplicates,
                published: 0,
            });
        }

        let outcome = self.publisher.publish(&survivors).await;
        let failed: HashSet<usize> = match &outcome {
            Ok(_) => HashSet::new(),
            Err(failure) => failure.failed.iter().copied().collect(),
        };
        let written: Vec<DedupeIdentity> = ids
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !failed.contains(index))
            .filter_map(|(_, id)| id)
            .collect();
        if !written.is_empty()
            && let Err(err) = self.store.record(&written).await
        {
            tracing::warn!(
                error = %err,
                identities = written.len(),
                "cannot record published identities"
            );
        }

        let published = outcome?;
        tracing::info!(received, duplicates, published, "batch published");
        Ok(StageReport {
            received,
            duplicates,
            published,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{BlockchainId, EventType, MarketId};
    use crate::stream::{MemoryStream, RetryPolicy, StreamSink};

    fn event(hash: &str, token: &str) -> SecondaryMarketEvent {
        SecondaryMarketEvent::new(
            MarketId::MagicEden,
            EventType::Sale,
            token,
            1,
            "owner",
            0,
            hash,
        )
        .with_buyer("buyer")
    }

    fn stage(sink: &Arc<MemoryStream>, store: Arc<RecentIdentityCache>) -> DedupePublishStage {
        let sink: Arc<dyn StreamSink> = Arc::clone(sink) as Arc<dyn StreamSink>;
        let publisher = StreamPublisher::new(sink, "sme", 100, RetryPolicy::immediate(0));
        DedupePublishStage::new(store, publisher)
    }

    fn id(hash: &str) -> DedupeIdentity {
        let Some(id) = DedupeIdentity::new(BlockchainId::Solana, hash) else {
            panic!("empty hash");
        };
        id
    }

    #[tokio::test]
    async fn cache_evicts_oldest() {
        let cache = RecentIdentityCache::new(2);
        let _ = cache.record(&[id("a"), id("b"), id("c")]).await;
        assert_eq!(cache.len().await, 2);
        let Ok(seen) = cache.seen(&[id("a"), id("b"), id("c")]).await else {
            panic!("seen failed");
        };
        assert!(!seen.contains(&id("a")));
        assert!(seen.contains(&id("c")));
    }

    #[tokio::test]
    async fn publishes_each_identity_once() {
        let sink = Arc::new(MemoryStream::new());
        let store = Arc::new(RecentIdentityCache::new(100));
        let stage = stage(&sink, Arc::clone(&store));

        let first = stage
            .process(vec![event("h1", "A"), event("h1", "A"), event("h2", "B")])
            .await;
        assert_eq!(
            first.ok(),
            Some(StageReport {
                received: 3,
                duplicates: 1,
                published: 2
            })
        );

        let second = stage.process(vec![event("h1", "A"), event("h3", "C")]).await;
        assert_eq!(second.ok().map(|r| r.published), Some(1));
        assert_eq!(sink.records("sme").await.len(), 3);
    }

    #[tokio::test]
    async fn empty_hash_is_always_published() {
        let sink = Arc::new(MemoryStream::new());
        let store = Arc::new(RecentIdentityCache::new(100));
        let stage = stage(&sink, Arc::clone(&store));

        for _ in 0..2 {
            let report = stage.process(vec![event("", "A"), event("", "A")]).await;
            assert_eq!(report.ok().map(|r| r.published), Some(2));
        }
        assert_eq!(sink.records("sme").await.len(), 4);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn failed_records_are_not_remembered() {
        let sink = Arc::new(MemoryStream::new());
        let store = Arc::new(RecentIdentityCache::new(100));
        let stage = stage(&sink, Arc::clone(&store));
        sink.reject_next_call_at([1]).await;

        let Err(PipelineError::Publish(failure)) =
            stage.process(vec![event("h1", "A"), event("h2", "B")]).await
        else {
            panic!("expected publish failure");
        };
        assert_eq!(failure.failed, vec![1]);

        let retry = stage.process(vec![event("h1", "A"), event("h2", "B")]).await;
        assert_eq!(
            retry.ok(),
            Some(StageReport {
                received: 2,
                duplicates: 1,
                published: 1
            })
        );
        let tokens: Vec<String> = sink
            .events("sme")
            .await
            .into_iter()
            .map(|e| e.token_key)
            .collect();
        assert_eq!(tokens, vec!["A", "B"]);
    }
}
