//! `sme_indexer`: index a batch of transactions.
//!
//! Fetches every signature (bounded concurrency, input order preserved),
//! parses each transaction with the marketplace parser selected by the
//! program it touches, and hands the events to the dedupe+publish stage.
//!
//! A decoding failure skips only its own transaction and is reported to the
//! error notifier. A fetch failure fails the whole invocation so the queue
//! redelivers it; already-published events are filtered by dedupe on the
//! next attempt.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Deserialize;

use crate::chain::ChainClient;
use crate::error::PipelineError;
use crate::notify::{ErrorNotifier, NotificationMetadata};
use crate::parser::{ParserRegistry, RawTransaction};
use crate::routine::{Routine, RoutineStatus};
use crate::stream::DedupePublishStage;

/// Routine type of the transaction-batch indexer.
pub const ROUTINE_TYPE: &str = "sme_indexer";

/// Upper bound on signatures per invocation.
pub const MAX_SIGNATURES: usize = 1_000;

/// Parameters: `{"signatures": ["..."]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionBatchParams {
    /// Transaction signatures to index.
    pub signatures: Vec<String>,
}

/// Indexes batches of transaction signatures.
#[derive(Debug)]
pub struct TransactionBatchRoutine {
    chain: Arc<dyn ChainClient>,
    parsers: ParserRegistry,
    stage: DedupePublishStage,
    notifier: Arc<dyn ErrorNotifier>,
    fetch_concurrency: usize,
    timeout: Duration,
}

impl TransactionBatchRoutine {
    /// Creates the routine with a fetch concurrency of 8 and a five minute
    /// budget.
    #[must_use]
    pub fn new(
        chain: Arc<dyn ChainClient>,
        parsers: ParserRegistry,
        stage: DedupePublishStage,
        notifier: Arc<dyn ErrorNotifier>,
    ) -> Self {
        Self {
            chain,
            parsers,
            stage,
            notifier,
            fetch_concurrency: 8,
            timeout: Duration::from_secs(300),
        }
    }

    /// Sets how many transactions are fetched concurrently (at least 1).
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

    async fn fetch_all(&self, signatures: &[String]) -> Result<Vec<RawTransaction>, PipelineError> {
        stream::iter(signatures.to_vec())
            .map(|signature| {
                let chain = Arc::clone(&self.chain);
                async move { chain.fetch_transaction(&signature).await }
            })
            .buffered(self.fetch_concurrency)
            .try_collect()
            .await
    }
}

#[async_trait]
impl Routine for TransactionBatchRoutine {
    type Params = TransactionBatchParams;

    fn routine_type(&self) -> &'static str {
        ROUTINE_TYPE
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }

    fn validate(&self, params: &TransactionBatchParams) -> Result<(), String> {
        if params.signatures.is_empty() {
            return Err("signatures must not be empty".to_string());
        }
        if params.signatures.len() > MAX_SIGNATURES {
            return Err(format!(
                "at most {MAX_SIGNATURES} signatures per invocation, got {}",
                params.signatures.len()
            ));
        }
        if params.signatures.iter().any(|s| s.trim().is_empty()) {
            return Err("signatures must not contain empty entries".to_string());
        }
        Ok(())
    }

    async fn run(&self, params: &TransactionBatchParams) -> Result<RoutineStatus, PipelineError> {
        let transactions = self.fetch_all(&params.signatures).await?;

        let mut events = Vec::with_capacity(transactions.len());
        let mut skipped = 0usize;
        let mut not_applicable = 0usize;
        for tx in &transactions {
            match self.parsers.parse(tx) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => not_applicable += 1,
                Err(failure) => {
                    skipped += 1;
                    tracing::warn!(
                        signature = %failure.signature,
                        market = %failure.market,
                        reason = %failure.reason,
                        "skipping undecodable transaction"
                    );
                    let metadata = NotificationMetadata::for_routine(ROUTINE_TYPE)
                        .with_signature(failure.signature.as_str());
                    self.notifier
                        .notify(&PipelineError::Decoding(failure), &metadata)
                        .await;
                }
            }
        }

        let parsed = events.len();
        let report = self.stage.process(events).await?;
        tracing::info!(
            signatures = params.signatures.len(),
            parsed,
            not_applicable,
            skipped,
            duplicates = report.duplicates,
            published = report.published,
            "transaction batch indexed"
        );

        Ok(if skipped > 0 {
            RoutineStatus::PartialSuccess
        } else if parsed == 0 {
            RoutineStatus::NothingToDo
        } else {
            RoutineStatus::Success
        })
    }

    async fn on_timeout(
        &self,
        params: &TransactionBatchParams,
        elapsed: Duration,
    ) -> Result<RoutineStatus, PipelineError> {
        tracing::warn!(
            signatures = params.signatures.len(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "transaction batch interrupted, requesting redelivery"
        );
        Err(PipelineError::Timeout {
            routine_type: ROUTINE_TYPE.to_string(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        })
    }
}
