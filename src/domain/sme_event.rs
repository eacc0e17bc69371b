//! Canonical secondary market event.
//!
//! Every marketplace parser normalizes its raw transactions into a
//! [`SecondaryMarketEvent`]. The stream wire format is the event serialized
//! as a flat JSON object with camelCase field names; downstream consumers
//! depend on that shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{BlockchainId, DedupeIdentity, MarketId};
use crate::error::PipelineError;

/// Kind of marketplace action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventType {
    /// Unclassified activity. The only type allowed an empty token key.
    #[default]
    Unknown,
    /// Token put up for sale.
    Listing,
    /// Listing withdrawn.
    Delisting,
    /// Token sold to a buyer.
    Sale,
    /// Asking price of an active listing changed.
    PriceUpdate,
}

/// Canonical record of one marketplace action.
///
/// `price` is denominated in the chain's smallest unit (lamports on Solana)
/// and never converted to floating point at this layer. `timestamp` is the
/// approximate unix time of the source transaction; events from different
/// parsers are not ordered relative to each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryMarketEvent {
    /// Source chain.
    pub blockchain_id: BlockchainId,
    /// Marketplace the action happened on.
    pub market_id: MarketId,
    /// Kind of action.
    pub event_type: EventType,
    /// Mint or contract address of the traded asset.
    pub token_key: String,
    /// Price in the chain's smallest unit.
    pub price: u64,
    /// Seller or lister account.
    pub owner: String,
    /// Buyer account; empty unless `event_type` is [`EventType::Sale`].
    #[serde(default)]
    pub buyer: String,
    /// Approximate unix time (seconds) of the source transaction.
    pub timestamp: i64,
    /// Source transaction identifier; empty only for legacy events.
    #[serde(default)]
    pub transaction_hash: String,
    /// Marketplace-specific extras with no defined schema.
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl SecondaryMarketEvent {
    /// Creates an event with an empty buyer and no extra data.
    ///
    /// The chain is derived from the marketplace.
    #[must_use]
    pub fn new(
        market_id: MarketId,
        event_type: EventType,
        token_key: impl Into<String>,
        price: u64,
        owner: impl Into<String>,
        timestamp: i64,
        transaction_hash: impl Into<String>,
    ) -> Self {
        Self {
            blockchain_id: market_id.blockchain(),
            market_id,
            event_type,
            token_key: token_key.into(),
            price,
            owner: owner.into(),
            buyer: String::new(),
            timestamp,
            transaction_hash: transaction_hash.into(),
            data: BTreeMap::new(),
        }
    }

    /// Sets the buyer account.
    #[must_use]
    pub fn with_buyer(mut self, buyer: impl Into<String>) -> Self {
        self.buyer = buyer.into();
        self
    }

    /// Adds a marketplace-specific extra field.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Returns the dedupe identity, or `None` when the transaction hash is
    /// empty and the event must be treated as always novel.
    #[must_use]
    pub fn dedupe_identity(&self) -> Option<DedupeIdentity> {
        DedupeIdentity::new(self.blockchain_id, self.transaction_hash.as_str())
    }

    /// Checks the model invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidEvent`] if the token key is empty on a
    /// classified event, a non-sale carries a buyer, or the chain does not
    /// match the marketplace.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.event_type != EventType::Unknown && self.token_key.is_empty() {
            return Err(PipelineError::InvalidEvent(format!(
                "{:?} event without token key",
                self.event_type
            )));
        }
        if self.event_type != EventType::Sale && !self.buyer.is_empty() {
            return Err(PipelineError::InvalidEvent(format!(
                "{:?} event must not carry a buyer",
                self.event_type
            )));
        }
        if self.market_id.blockchain() != self.blockchain_id {
            return Err(PipelineError::InvalidEvent(format!(
                "market {} does not operate on {}",
                self.market_id, self.blockchain_id
            )));
        }
        Ok(())
    }

    /// Encodes the event in the stream wire format.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Serialization`] if encoding fails.
    pub fn to_stream_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn sale() -> SecondaryMarketEvent {
        SecondaryMarketEvent::new(
            MarketId::MagicEden,
            EventType::Sale,
            "Tok1",
            1_000_000_000,
            "ownerX",
            1_650_000_000,
            "abc123",
        )
        .with_buyer("buyerY")
    }

    #[test]
    fn wire_format_is_flat_camel_case() {
        let Ok(bytes) = sale().to_stream_bytes() else {
            panic!("encoding failed");
        };
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
            panic!("not json");
        };
        assert_eq!(value["blockchainId"], "Solana");
        assert_eq!(value["marketId"], "MagicEden");
        assert_eq!(value["eventType"], "Sale");
        assert_eq!(value["tokenKey"], "Tok1");
        assert_eq!(value["price"], 1_000_000_000u64);
        assert_eq!(value["transactionHash"], "abc123");
        assert!(value.get("token_key").is_none());
    }

    #[test]
    fn identity_uses_chain_and_hash() {
        let Some(id) = sale().dedupe_identity() else {
            panic!("expected identity");
        };
        assert_eq!(id.blockchain_id(), BlockchainId::Solana);
        assert_eq!(id.transaction_hash(), "abc123");
    }

    #[test]
    fn legacy_event_has_no_identity() {
        let mut event = sale();
        event.transaction_hash.clear();
        assert!(event.dedupe_identity().is_none());
    }

    #[test]
    fn listing_with_buyer_is_invalid() {
        let event = SecondaryMarketEvent::new(
            MarketId::Solanart,
            EventType::Listing,
            "Tok1",
            5,
            "owner",
            0,
            "h",
        )
        .with_buyer("someone");
        assert!(event.validate().is_err());
    }

    #[test]
    fn unknown_event_may_omit_token() {
        let event =
            SecondaryMarketEvent::new(MarketId::Solsea, EventType::Unknown, "", 0, "", 0, "h");
        assert!(event.validate().is_ok());

        let listing =
            SecondaryMarketEvent::new(MarketId::Solsea, EventType::Listing, "", 0, "o", 0, "h");
        assert!(listing.validate().is_err());
    }

    #[test]
    fn decodes_with_missing_optional_fields() {
        let json = r#"{"blockchainId":"Solana","marketId":"AlphaArt","eventType":"Listing",
            "tokenKey":"T","price":7,"owner":"o","timestamp":1}"#;
        let Ok(event) = serde_json::from_str::<SecondaryMarketEvent>(json) else {
            panic!("decode failed");
        };
        assert!(event.buyer.is_empty());
        assert!(event.transaction_hash.is_empty());
        assert!(event.data.is_empty());
    }
}
