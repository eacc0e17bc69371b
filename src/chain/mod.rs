//! Chain-query collaborator.
//!
//! [`ChainClient`] is the indexer's only view of a blockchain: fetch one
//! transaction by signature, list the recent signatures touching an
//! address, or enumerate the assets of a collection.
//! Failures surface as [`PipelineError::Fetch`] and are retried through
//! queue redelivery.

pub mod memory;
pub mod solana_rpc;

use std::fmt;

use async_trait::async_trait;

pub use memory::MemoryChainClient;
pub use solana_rpc::SolanaRpcClient;

use crate::error::PipelineError;
use crate::parser::RawTransaction;

/// Source of raw transactions and collection membership.
#[async_trait]
pub trait ChainClient: Send + Sync + fmt::Debug {
    /// Fetches and normalizes the transaction with the given signature.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Fetch`] if the node is unreachable or does
    /// not know the transaction.
    async fn fetch_transaction(&self, signature: &str) -> Result<RawTransaction, PipelineError>;

    /// Lists the asset addresses whose metadata names `authority` as update
    /// authority.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Fetch`] if the node is unreachable.
    async fn enumerate_collection(&self, authority: &str) -> Result<Vec<String>, PipelineError>;

    /// Lists up to `limit` signatures of successful transactions touching
    /// `address`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Fetch`] if the node is unreachable.
    async fn signatures_for_address(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<String>, PipelineError>;
}
