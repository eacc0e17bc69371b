//! Marketplace parsers: raw transactions to secondary market events.
//!
//! Each supported `(blockchain, marketplace)` pair is a variant of the closed
//! [`MarketplaceParser`] enum. [`ParserRegistry`] resolves the parser once per
//! transaction from the marketplace program it touches; nothing inspects the
//! payload's runtime type.
//!
//! A parser returns:
//! - `Ok(Some(event))` for a recognized market action,
//! - `Ok(None)` when the transaction is not a market action of that
//!   marketplace (a valid "not applicable" result),
//! - `Err(DecodingFailure)` when a recognized instruction is malformed.

pub mod alpha_art;
pub mod digital_eyes;
pub mod layout;
pub mod magic_eden;
pub mod solanart;
pub mod solsea;
pub mod transaction;

use std::collections::HashMap;

pub use transaction::{RawInstruction, RawTransaction};

use crate::domain::{BlockchainId, MarketId, SecondaryMarketEvent};
use crate::error::DecodingFailure;

/// One marketplace parser per supported `(blockchain, marketplace)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketplaceParser {
    /// Magic Eden v2 (Anchor discriminators).
    MagicEden,
    /// Solanart (one-byte tags).
    Solanart,
    /// Alpha Art (one-byte tags).
    AlphaArt,
    /// Digital Eyes (log-line classification).
    DigitalEyes,
    /// Solsea (log-line classification).
    Solsea,
}

impl MarketplaceParser {
    /// Every parser this build knows about.
    pub const ALL: [Self; 5] = [
        Self::MagicEden,
        Self::Solanart,
        Self::AlphaArt,
        Self::DigitalEyes,
        Self::Solsea,
    ];

    /// Returns the marketplace this parser handles.
    #[must_use]
    pub const fn market(self) -> MarketId {
        match self {
            Self::MagicEden => MarketId::MagicEden,
            Self::Solanart => MarketId::Solanart,
            Self::AlphaArt => MarketId::AlphaArt,
            Self::DigitalEyes => MarketId::DigitalEyes,
            Self::Solsea => MarketId::Solsea,
        }
    }

    /// Returns the chain this parser handles.
    #[must_use]
    pub const fn blockchain(self) -> BlockchainId {
        self.market().blockchain()
    }

    /// Returns the on-chain program id of the marketplace.
    #[must_use]
    pub const fn program_id(self) -> &'static str {
        match self {
            Self::MagicEden => magic_eden::PROGRAM_ID,
            Self::Solanart => solanart::PROGRAM_ID,
            Self::AlphaArt => alpha_art::PROGRAM_ID,
            Self::DigitalEyes => digital_eyes::PROGRAM_ID,
            Self::Solsea => solsea::PROGRAM_ID,
        }
    }

    /// Parses `tx` with this marketplace's heuristics.
    ///
    /// Transactions that failed on chain are never market actions.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodingFailure`] if a recognized instruction is
    /// malformed.
    pub fn parse(self, tx: &RawTransaction) -> Result<Option<SecondaryMarketEvent>, DecodingFailure> {
        if !tx.succeeded {
            return Ok(None);
        }
        match self {
            Self::MagicEden => magic_eden::parse(tx),
            Self::Solanart => solanart::parse(tx),
            Self::AlphaArt => alpha_art::parse(tx),
            Self::DigitalEyes => digital_eyes::parse(tx),
            Self::Solsea => solsea::parse(tx),
        }
    }
}

/// Read-only parser selection table.
///
/// Built once at startup and shared without locking.
#[derive(Debug, Clone)]
pub struct ParserRegistry {
    by_market: HashMap<(BlockchainId, MarketId), MarketplaceParser>,
    by_program: HashMap<&'static str, MarketplaceParser>,
}

impl ParserRegistry {
    /// Creates a registry containing the given parsers.
    #[must_use]
    pub fn new(parsers: &[MarketplaceParser]) -> Self {
        let by_market = parsers
            .iter()
            .map(|p| ((p.blockchain(), p.market()), *p))
            .collect();
        let by_program = parsers.iter().map(|p| (p.program_id(), *p)).collect();
        Self {
            by_market,
            by_program,
        }
    }

    /// Creates a registry with every supported parser.
    #[must_use]
    pub fn with_all() -> Self {
        Self::new(&MarketplaceParser::ALL)
    }

    /// Looks up the parser for a `(blockchain, marketplace)` pair.
    #[must_use]
    pub fn get(&self, blockchain: BlockchainId, market: MarketId) -> Option<MarketplaceParser> {
        self.by_market.get(&(blockchain, market)).copied()
    }

    /// Selects the parser of the first known marketplace program invoked by
    /// `tx`, skipping unrelated instructions.
    #[must_use]
    pub fn select(&self, tx: &RawTransaction) -> Option<MarketplaceParser> {
        tx.instructions
            .iter()
            .find_map(|ix| self.by_program.get(ix.program_id.as_str()).copied())
    }

    /// Selects the matching parser and parses `tx`.
    ///
    /// Returns `Ok(None)` when `tx` touches no known marketplace.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodingFailure`] if the selected parser rejects the
    /// transaction's layout.
    pub fn parse(&self, tx: &RawTransaction) -> Result<Option<SecondaryMarketEvent>, DecodingFailure> {
        match self.select(tx) {
            Some(parser) => parser.parse(tx),
            None => Ok(None),
        }
    }

    /// Returns the number of registered parsers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_market.len()
    }

    /// Returns `true` if no parser is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_market.is_empty()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_all()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::EventType;

    #[test]
    fn program_ids_are_unique() {
        let registry = ParserRegistry::with_all();
        assert_eq!(registry.len(), MarketplaceParser::ALL.len());
        assert_eq!(registry.by_program.len(), MarketplaceParser::ALL.len());
    }

    #[test]
    fn looks_up_by_chain_and_market() {
        let registry = ParserRegistry::with_all();
        assert_eq!(
            registry.get(BlockchainId::Solana, MarketId::Solsea),
            Some(MarketplaceParser::Solsea)
        );
        assert_eq!(registry.get(BlockchainId::Terra, MarketId::Solsea), None);
    }

    #[test]
    fn selects_by_touched_program() {
        let registry = ParserRegistry::with_all();
        let tx = RawTransaction::new("s")
            .with_instruction(RawInstruction::new("Memo", vec![], b"hi"))
            .with_instruction(RawInstruction::new(solanart::PROGRAM_ID, vec![], &[2]));
        assert_eq!(registry.select(&tx), Some(MarketplaceParser::Solanart));
    }

    #[test]
    fn unrelated_transaction_is_not_applicable() {
        let registry = ParserRegistry::with_all();
        let tx = RawTransaction::new("s")
            .with_instruction(RawInstruction::new("Memo", vec![], b"hi"));
        assert_eq!(registry.parse(&tx), Ok(None));
    }

    #[test]
    fn failed_transaction_is_not_applicable() {
        let registry = ParserRegistry::with_all();
        let mut tx = magic_eden::tests::sale_tx("s", "Tok", 1, "o", "b");
        tx.succeeded = false;
        assert_eq!(registry.parse(&tx), Ok(None));
    }

    #[test]
    fn restricted_registry_ignores_other_markets() {
        let registry = ParserRegistry::new(&[MarketplaceParser::Solsea]);
        let tx = magic_eden::tests::sale_tx("s", "Tok", 1, "o", "b");
        assert_eq!(registry.parse(&tx), Ok(None));

        let full = ParserRegistry::with_all();
        let Ok(Some(event)) = full.parse(&tx) else {
            panic!("expected sale");
        };
        assert_eq!(event.event_type, EventType::Sale);
    }
}
