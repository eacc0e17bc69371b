//! Dedupe identity of a secondary market event.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::BlockchainId;

/// `(blockchain_id, transaction_hash)` pair identifying one logical
/// occurrence.
///
/// Two events with equal identities are the same occurrence delivered more
/// than once. Events with an empty transaction hash have no identity and are
/// never deduplicated; [`DedupeIdentity::new`] returns `None` for them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupeIdentity {
    blockchain_id: BlockchainId,
    transaction_hash: String,
}

impl DedupeIdentity {
    /// Builds an identity, or `None` when the hash is empty.
    #[must_use]
    pub fn new(blockchain_id: BlockchainId, transaction_hash: impl Into<String>) -> Option<Self> {
        let transaction_hash = transaction_hash.into();
        if transaction_hash.is_empty() {
            return None;
        }
        Some(Self {
            blockchain_id,
            transaction_hash,
        })
    }

    /// Returns the chain component.
    #[must_use]
    pub const fn blockchain_id(&self) -> BlockchainId {
        self.blockchain_id
    }

    /// Returns the transaction hash component.
    #[must_use]
    pub fn transaction_hash(&self) -> &str {
        &self.transaction_hash
    }
}

impl fmt::Display for DedupeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.blockchain_id, self.transaction_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn empty_hash_has_no_identity() {
        assert!(DedupeIdentity::new(BlockchainId::Solana, "").is_none());
    }

    #[test]
    fn same_hash_on_different_chains_differs() {
        let a = DedupeIdentity::new(BlockchainId::Solana, "h1");
        let b = DedupeIdentity::new(BlockchainId::Terra, "h1");
        assert_ne!(a, b);
    }

    #[test]
    fn collapses_in_hash_set() {
        let mut set = HashSet::new();
        set.insert(DedupeIdentity::new(BlockchainId::Solana, "h1"));
        set.insert(DedupeIdentity::new(BlockchainId::Solana, "h1"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn display_is_chain_prefixed() {
        let id = DedupeIdentity::new(BlockchainId::Solana, "abc");
        assert_eq!(id.map(|i| i.to_string()).unwrap_or_default(), "solana:abc");
    }
}
