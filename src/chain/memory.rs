//! In-memory chain client for local runs and tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ChainClient;
use crate::error::PipelineError;
use crate::parser::RawTransaction;

/// Chain client serving transactions and collections from memory.
///
/// Signatures registered with [`MemoryChainClient::fail_on`] simulate an
/// unavailable node.
#[derive(Debug, Default)]
pub struct MemoryChainClient {
    transactions: RwLock<HashMap<String, RawTransaction>>,
    collections: RwLock<HashMap<String, Vec<String>>>,
    signatures: RwLock<HashMap<String, Vec<String>>>,
    unavailable: RwLock<HashSet<String>>,
}

impl MemoryChainClient {
    /// Creates an empty client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a transaction under its signature.
    pub async fn insert_transaction(&self, tx: RawTransaction) {
        self.transactions
            .write()
            .await
            .insert(tx.signature.clone(), tx);
    }

    /// Stores the asset addresses of a collection.
    pub async fn insert_collection(&self, authority: impl Into<String>, addresses: Vec<String>) {
        self.collections
            .write()
            .await
            .insert(authority.into(), addresses);
    }

    /// Stores the signatures touching `address`, newest first.
    pub async fn insert_signatures(&self, address: impl Into<String>, signatures: Vec<String>) {
        self.signatures
            .write()
            .await
            .insert(address.into(), signatures);
    }

    /// Makes every fetch of `target` (signature, address or authority) fail.
    pub async fn fail_on(&self, target: impl Into<String>) {
        self.unavailable.write().await.insert(target.into());
    }

    async fn check_available(&self, target: &str) -> Result<(), PipelineError> {
        if self.unavailable.read().await.contains(target) {
            return Err(PipelineError::fetch(target, "node unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MemoryChainClient {
    async fn fetch_transaction(&self, signature: &str) -> Result<RawTransaction, PipelineError> {
        self.check_available(signature).await?;
        self.transactions
            .read()
            .await
            .get(signature)
            .cloned()
            .ok_or_else(|| PipelineError::fetch(signature, "transaction not found"))
    }

    async fn enumerate_collection(&self, authority: &str) -> Result<Vec<String>, PipelineError> {
        self.check_available(authority).await?;
        Ok(self
            .collections
            .read()
            .await
            .get(authority)
            .cloned()
            .unwrap_or_default())
    }

    async fn signatures_for_address(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<String>, PipelineError> {
        self.check_available(address).await?;
        Ok(self
            .signatures
            .read()
            .await
            .get(address)
            .map(|sigs| sigs.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_inserted_transaction() {
        let client = MemoryChainClient::new();
        client.insert_transaction(RawTransaction::new("sig1")).await;
        let Ok(tx) = client.fetch_transaction("sig1").await else {
            panic!("expected transaction");
        };
        assert_eq!(tx.signature, "sig1");
    }

    #[tokio::test]
    async fn missing_transaction_is_fetch_failure() {
        let client = MemoryChainClient::new();
        let Err(err) = client.fetch_transaction("nope").await else {
            panic!("expected failure");
        };
        assert_eq!(err.kind(), "fetch_failure");
    }

    #[tokio::test]
    async fn unavailable_target_fails() {
        let client = MemoryChainClient::new();
        client.insert_transaction(RawTransaction::new("sig1")).await;
        client.fail_on("sig1").await;
        assert!(client.fetch_transaction("sig1").await.is_err());
    }

    #[tokio::test]
    async fn unknown_collection_is_empty() {
        let client = MemoryChainClient::new();
        let addresses = client.enumerate_collection("auth").await;
        assert!(matches!(addresses, Ok(ref a) if a.is_empty()));
    }

    #[tokio::test]
    async fn signatures_are_capped_at_limit() {
        let client = MemoryChainClient::new();
        let sigs = (0..5).map(|i| format!("s{i}")).collect();
        client.insert_signatures("mint", sigs).await;
        let Ok(found) = client.signatures_for_address("mint", 3).await else {
            panic!("expected signatures");
        };
        assert_eq!(found, vec!["s0", "s1", "s2"]);
    }
}
