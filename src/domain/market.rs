//! Blockchain and marketplace identifiers.
//!
//! [`BlockchainId`] names the source chain and [`MarketId`] the secondary
//! marketplace. Both serialize as their variant names (`"Solana"`,
//! `"MagicEden"`) on the stream wire format.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Source chain of a secondary market event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BlockchainId {
    /// Solana mainnet.
    Solana,
    /// Terra classic.
    Terra,
    /// Ethereum mainnet.
    Ethereum,
}

impl BlockchainId {
    /// Returns the lowercase identifier used in storage keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Solana => "solana",
            Self::Terra => "terra",
            Self::Ethereum => "ethereum",
        }
    }
}

impl fmt::Display for BlockchainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secondary marketplace on which an event happened.
///
/// Marketplaces are scoped to a chain; see [`MarketId::blockchain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarketId {
    /// Magic Eden (v2 auction house program).
    MagicEden,
    /// Alpha Art.
    AlphaArt,
    /// Digital Eyes.
    DigitalEyes,
    /// Solanart.
    Solanart,
    /// Solsea.
    Solsea,
}

impl MarketId {
    /// Returns the chain this marketplace operates on.
    #[must_use]
    pub const fn blockchain(self) -> BlockchainId {
        match self {
            Self::MagicEden | Self::AlphaArt | Self::DigitalEyes | Self::Solanart | Self::Solsea => {
                BlockchainId::Solana
            }
        }
    }

    /// Returns the variant name as a static string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MagicEden => "MagicEden",
            Self::AlphaArt => "AlphaArt",
            Self::DigitalEyes => "DigitalEyes",
            Self::Solanart => "Solanart",
            Self::Solsea => "Solsea",
        }
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solana_markets_belong_to_solana() {
        for market in [
            MarketId::MagicEden,
            MarketId::AlphaArt,
            MarketId::DigitalEyes,
            MarketId::Solanart,
            MarketId::Solsea,
        ] {
            assert_eq!(market.blockchain(), BlockchainId::Solana);
        }
    }

    #[test]
    fn serializes_as_variant_name() {
        let json = serde_json::to_string(&MarketId::MagicEden).unwrap_or_default();
        assert_eq!(json, "\"MagicEden\"");
        let json = serde_json::to_string(&BlockchainId::Solana).unwrap_or_default();
        assert_eq!(json, "\"Solana\"");
    }

    #[test]
    fn display_matches_storage_key() {
        assert_eq!(BlockchainId::Terra.to_string(), "terra");
        assert_eq!(MarketId::DigitalEyes.to_string(), "DigitalEyes");
    }
}
