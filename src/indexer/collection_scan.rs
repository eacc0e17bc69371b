//! `collection_scan`: enumerate a collection and fan out follow-up work.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::chain::ChainClient;
use crate::error::PipelineError;
use crate::queue::QueueRouter;
use crate::routine::{Routine, RoutineStatus};

/// Routine type of the collection scanner.
pub const ROUTINE_TYPE: &str = "collection_scan";

/// Follow-up routine type used when none is configured.
pub const DEFAULT_FOLLOW_UP: &str = super::asset_index::ROUTINE_TYPE;

/// Parameters: `{"update_authority": "..."}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionScanParams {
    /// Update authority shared by the collection's assets.
    pub update_authority: String,
}

/// Enumerates the assets of a collection through the chain client and
/// dispatches them in chunks of `{"addresses": [..]}` to the follow-up
/// routine.
#[derive(Debug)]
pub struct CollectionScanRoutine {
    chain: Arc<dyn ChainClient>,
    router: QueueRouter,
    follow_up: String,
    chunk_size: usize,
    timeout: Duration,
}

impl CollectionScanRoutine {
    /// Creates the scanner with chunks of 100 addresses and a ten minute
    /// budget.
    #[must_use]
    pub fn new(chain: Arc<dyn ChainClient>, router: QueueRouter) -> Self {
        Self {
            chain,
            router,
            follow_up: DEFAULT_FOLLOW_UP.to_string(),
            chunk_size: 100,
            timeout: Duration::from_secs(600),
        }
    }

    /// Sets the follow-up routine type.
    #[must_use]
    pub fn with_follow_up(mut self, routine_type: impl Into<String>) -> Self {
        self.follow_up = routine_type.into();
        self
    }

    /// Sets how many addresses go into one follow-up message (at least 1).
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sets the default time budget.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks that the follow-up routine has a queue to go to.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the follow-up routine is not
    /// bound to any queue.
    pub fn ensure_follow_up_bound(&self) -> Result<(), PipelineError> {
        if self.router.bindings().for_routine(&self.follow_up).is_none() {
            return Err(PipelineError::Config(format!(
                "collection_scan follow-up routine {} has no queue binding",
                self.follow_up
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Routine for CollectionScanRoutine {
    type Params = CollectionScanParams;

    fn routine_type(&self) -> &'static str {
        ROUTINE_TYPE
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }

    fn validate(&self, params: &CollectionScanParams) -> Result<(), String> {
        if params.update_authority.trim().is_empty() {
            return Err("update_authority must not be empty".to_string());
        }
        Ok(())
    }

    async fn run(&self, params: &CollectionScanParams) -> Result<RoutineStatus, PipelineError> {
        let addresses = self
            .chain
            .enumerate_collection(&params.update_authority)
            .await?;
        if addresses.is_empty() {
            tracing::info!(authority = %params.update_authority, "collection is empty");
            return Ok(RoutineStatus::NothingToDo);
        }

        let mut dispatched = 0usize;
        for chunk in addresses.chunks(self.chunk_size) {
            self.router
                .dispatch(&self.follow_up, json!({ "addresses": chunk }))
                .await?;
            dispatched += 1;
        }
        tracing::info!(
            authority = %params.update_authority,
            assets = addresses.len(),
            messages = dispatched,
            follow_up = %self.follow_up,
            "collection scanned"
        );
        Ok(RoutineStatus::Success)
    }

    async fn on_timeout(
        &self,
        params: &CollectionScanParams,
        elapsed: Duration,
    ) -> Result<RoutineStatus, PipelineError> {
        tracing::warn!(
            authority = %params.update_authority,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "collection scan abandoned"
        );
        Ok(RoutineStatus::Abandoned)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::chain::MemoryChainClient;
    use crate::queue::{MemoryQueue, QueueBindings, QueueClient};
    use crate::routine::InvocationRequest;

    fn setup() -> (Arc<MemoryChainClient>, Arc<MemoryQueue>, CollectionScanRoutine) {
        let chain = Arc::new(MemoryChainClient::new());
        let queue = Arc::new(MemoryQueue::new());
        let Ok(bindings) = QueueBindings::parse("asset_index=asset-q,mint_index=mint-q", None, None)
        else {
            panic!("bindings");
        };
        let router = QueueRouter::new(bindings, Arc::clone(&queue) as Arc<dyn QueueClient>);
        let routine = CollectionScanRoutine::new(Arc::clone(&chain) as Arc<dyn ChainClient>, router)
            .with_chunk_size(100);
        (chain, queue, routine)
    }

    fn params(authority: &str) -> CollectionScanParams {
        CollectionScanParams {
            update_authority: authority.to_string(),
        }
    }

    #[tokio::test]
    async fn dispatches_addresses_in_chunks() {
        let (chain, queue, routine) = setup();
        let addresses: Vec<String> = (0..250).map(|i| format!("mint{i}")).collect();
        chain.insert_collection("auth", addresses).await;

        let status = routine.run(&params("auth")).await;
        assert_eq!(status.ok(), Some(RoutineStatus::Success));

        let bodies = queue.bodies("asset-q").await;
        assert_eq!(bodies.len(), 3);
        let sizes: Vec<usize> = bodies
            .iter()
            .filter_map(|b| InvocationRequest::from_body(b).ok())
            .filter_map(|r| r.params["addresses"].as_array().map(Vec::len))
            .collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn follow_up_routine_is_configurable() {
        let (chain, queue, routine) = setup();
        let routine = routine.with_follow_up("mint_index");
        chain.insert_collection("auth", vec!["m".to_string()]).await;
        let _ = routine.run(&params("auth")).await;
        assert_eq!(queue.len("mint-q").await, 1);
        assert!(queue.is_empty("asset-q").await);
    }

    #[tokio::test]
    async fn empty_collection_is_nothing_to_do() {
        let (_, queue, routine) = setup();
        let status = routine.run(&params("nobody")).await;
        assert_eq!(status.ok(), Some(RoutineStatus::NothingToDo));
        assert!(queue.is_empty("asset-q").await);
    }

    #[tokio::test]
    async fn enumeration_failure_is_fetch_failure() {
        let (chain, _, routine) = setup();
        chain.fail_on("auth").await;
        let Err(err) = routine.run(&params("auth")).await else {
            panic!("expected failure");
        };
        assert_eq!(err.kind(), "fetch_failure");
    }

    #[tokio::test]
    async fn timeout_abandons_scan() {
        let (_, _, routine) = setup();
        let status = routine
            .on_timeout(&params("auth"), Duration::from_secs(600))
            .await;
        assert_eq!(status.ok(), Some(RoutineStatus::Abandoned));
    }

    #[test]
    fn rejects_blank_authority() {
        let (_, _, routine) = setup();
        assert!(routine.validate(&params("  ")).is_err());
    }

    #[test]
    fn unbound_follow_up_is_a_config_error() {
        let (_, _, routine) = setup();
        assert!(routine.ensure_follow_up_bound().is_ok());
        let Err(err) = routine.with_follow_up("ghost").ensure_follow_up_bound() else {
            panic!("expected config error");
        };
        assert_eq!(err.kind(), "config");
    }
}
