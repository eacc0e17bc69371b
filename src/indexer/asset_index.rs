//! `asset_index`: turn asset addresses into transaction batches.
//!
//! Receives the address chunks fanned out by `collection_scan`, lists the
//! recent signatures of each asset and dispatches them to `sme_indexer`.
//! Signatures shared by several assets in the chunk are sent once.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::json;

use super::transaction_batch::{self, MAX_SIGNATURES};
use crate::chain::ChainClient;
use crate::error::PipelineError;
use crate::queue::QueueRouter;
use crate::routine::{Routine, RoutineStatus};

/// Routine type of the asset indexer.
pub const ROUTINE_TYPE: &str = "asset_index";

/// Parameters: `{"addresses": ["..."]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetIndexParams {
    /// Asset (mint) addresses.
    pub addresses: Vec<String>,
}

/// Lists the history of each asset and enqueues it for indexing.
#[derive(Debug)]
pub struct AssetIndexRoutine {
    chain: Arc<dyn ChainClient>,
    router: QueueRouter,
    signature_limit: usize,
    fetch_concurrency: usize,
    timeout: Duration,
}

impl AssetIndexRoutine {
    /// Creates the routine with 100 signatures per asset, a fetch
    /// concurrency of 8 and a five minute budget.
    #[must_use]
    pub fn new(chain: Arc<dyn ChainClient>, router: QueueRouter) -> Self {
        Self {
            chain,
            router,
            signature_limit: 100,
            fetch_concurrency: 8,
            timeout: Duration::from_secs(300),
        }
    }

    /// Sets how many recent signatures are listed per asset (at least 1).
    #[must_use]
    pub fn with_signature_limit(mut self, limit: usize) -> Self {
        self.signature_limit = limit.max(1);
        self
    }

    /// Sets how many assets are listed concurrently (at least 1).
    #[must_use]
    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency.max(1);
        self
    }

    /// Sets the default time budget.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Routine for AssetIndexRoutine {
    type Params = AssetIndexParams;

    fn routine_type(&self) -> &'static str {
        ROUTINE_TYPE
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }

    fn validate(&self, params: &AssetIndexParams) -> Result<(), String> {
        if params.addresses.is_empty() {
            return Err("addresses must not be empty".to_string());
        }
        if params.addresses.iter().any(|a| a.trim().is_empty()) {
            return Err("addresses must not contain empty entries".to_string());
        }
        Ok(())
    }

    async fn run(&self, params: &AssetIndexParams) -> Result<RoutineStatus, PipelineError> {
        let limit = self.signature_limit;
        let histories: Vec<Vec<String>> = stream::iter(params.addresses.clone())
            .map(|address| {
                let chain = Arc::clone(&self.chain);
                async move { chain.signatures_for_address(&address, limit).await }
            })
            .buffered(self.fetch_concurrency)
            .try_collect()
            .await?;

        let mut seen = HashSet::new();
        let signatures: Vec<String> = histories
            .into_iter()
            .flatten()
            .filter(|sig| seen.insert(sig.clone()))
            .collect();
        if signatures.is_empty() {
            return Ok(RoutineStatus::NothingToDo);
        }

        let mut batches = 0usize;
        for chunk in signatures.chunks(MAX_SIGNATURES) {
            self.router
                .dispatch(transaction_batch::ROUTINE_TYPE, json!({ "signatures": chunk }))
                .await?;
            batches += 1;
        }
        tracing::info!(
            assets = params.addresses.len(),
            signatures = signatures.len(),
            batches,
            "asset histories enqueued"
        );
        Ok(RoutineStatus::Success)
    }

    async fn on_timeout(
        &self,
        params: &AssetIndexParams,
        elapsed: Duration,
    ) -> Result<RoutineStatus, PipelineError> {
        tracing::warn!(
            assets = params.addresses.len(),
            "asset index interrupted, requesting redelivery"
        );
        Err(PipelineError::Timeout {
            routine_type: ROUTINE_TYPE.to_string(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        })
    }
}
