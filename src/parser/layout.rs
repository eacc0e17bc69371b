//! Shared helpers for reading marketplace instruction layouts.
//!
//! Every parser decodes the same primitives: little-endian integers at
//! fixed offsets, accounts at fixed positions, Anchor discriminators and
//! `Program log: Instruction: <Name>` lines. [`InstructionDecoder`] wraps
//! them so that every shape mismatch becomes a [`DecodingFailure`] naming
//! the transaction and marketplace.

use chrono::Utc;
use sha2::{Digest, Sha256};

use super::{RawInstruction, RawTransaction};
use crate::domain::{EventType, MarketId, SecondaryMarketEvent};
use crate::error::DecodingFailure;

/// Prefix the runtime puts in front of Anchor instruction names in logs.
pub const INSTRUCTION_LOG_PREFIX: &str = "Program log: Instruction: ";

/// Computes the 8-byte Anchor discriminator of instruction `name`
/// (`sha256("global:<name>")[..8]`).
#[must_use]
pub fn anchor_discriminator(name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("global:{name}").as_bytes());
    let mut out = [0u8; 8];
    for (slot, byte) in out.iter_mut().zip(digest.iter()) {
        *slot = *byte;
    }
    out
}

/// Iterates over the instruction names announced in the transaction logs.
pub fn logged_instruction_names(tx: &RawTransaction) -> impl Iterator<Item = &str> {
    tx.log_messages
        .iter()
        .filter_map(|line| line.strip_prefix(INSTRUCTION_LOG_PREFIX))
        .map(str::trim)
}

/// Decoding context for one transaction of one marketplace.
#[derive(Debug, Clone, Copy)]
pub struct InstructionDecoder<'a> {
    tx: &'a RawTransaction,
    market: MarketId,
}

impl<'a> InstructionDecoder<'a> {
    /// Creates a decoder for `tx` on behalf of `market`.
    #[must_use]
    pub const fn new(tx: &'a RawTransaction, market: MarketId) -> Self {
        Self { tx, market }
    }

    /// Builds a [`DecodingFailure`] for this transaction.
    #[must_use]
    pub fn failure(&self, reason: impl Into<String>) -> DecodingFailure {
        DecodingFailure {
            signature: self.tx.signature.clone(),
            market: self.market,
            reason: reason.into(),
        }
    }

    /// Decodes the instruction data bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodingFailure`] if the data is not valid base58.
    pub fn data(&self, ix: &RawInstruction) -> Result<Vec<u8>, DecodingFailure> {
        ix.decode_data()
            .map_err(|e| self.failure(format!("instruction data is not base58: {e}")))
    }

    /// Reads a little-endian `u64` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodingFailure`] if the data is too short.
    pub fn u64_le(&self, data: &[u8], offset: usize) -> Result<u64, DecodingFailure> {
        let bytes = offset
            .checked_add(8)
            .and_then(|end| data.get(offset..end))
            .ok_or_else(|| {
                self.failure(format!(
                    "expected u64 at offset {offset}, data is {} bytes",
                    data.len()
                ))
            })?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Returns the account at `index` of the instruction.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodingFailure`] if the instruction has fewer accounts.
    pub fn account(&self, ix: &'a RawInstruction, index: usize) -> Result<&'a str, DecodingFailure> {
        match ix.account(index) {
            Some(account) if !account.is_empty() => Ok(account),
            _ => Err(self.failure(format!(
                "expected account #{index}, instruction has {}",
                ix.accounts.len()
            ))),
        }
    }

    /// Assembles and validates an event for this transaction.
    ///
    /// The timestamp falls back to the current time when the node did not
    /// report a block time.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodingFailure`] if the assembled event violates a model
    /// invariant.
    pub fn event(
        &self,
        event_type: EventType,
        token_key: &str,
        price: u64,
        owner: &str,
        buyer: Option<&str>,
    ) -> Result<SecondaryMarketEvent, DecodingFailure> {
        let timestamp = self.tx.block_time.unwrap_or_else(|| Utc::now().timestamp());
        let mut event = SecondaryMarketEvent::new(
            self.market,
            event_type,
            token_key,
            price,
            owner,
            timestamp,
            self.tx.signature.as_str(),
        )
        .with_data("slot", serde_json::Value::from(self.tx.slot));
        if let Some(buyer) = buyer {
            event = event.with_buyer(buyer);
        }
        event.validate().map_err(|e| self.failure(e.to_string()))?;
        Ok(event)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn discriminator_is_stable_and_distinct() {
        assert_eq!(anchor_discriminator("sell"), anchor_discriminator("sell"));
        assert_ne!(anchor_discriminator("sell"), anchor_discriminator("cancel_sell"));
    }

    #[test]
    fn reads_u64_little_endian() {
        let tx = RawTransaction::new("sig");
        let decoder = InstructionDecoder::new(&tx, MarketId::Solanart);
        let mut data = vec![7u8];
        data.extend_from_slice(&1_000_000_000u64.to_le_bytes());
        assert_eq!(decoder.u64_le(&data, 1).ok(), Some(1_000_000_000));
    }

    #[test]
    fn short_data_is_a_decoding_failure() {
        let tx = RawTransaction::new("sig");
        let decoder = InstructionDecoder::new(&tx, MarketId::Solanart);
        let Err(failure) = decoder.u64_le(&[0, 1, 2], 1) else {
            panic!("expected failure");
        };
        assert_eq!(failure.signature, "sig");
        assert_eq!(failure.market, MarketId::Solanart);
    }

    #[test]
    fn missing_account_is_a_decoding_failure() {
        let tx = RawTransaction::new("sig");
        let ix = RawInstruction::new("p", vec!["a".to_string()], &[]);
        let decoder = InstructionDecoder::new(&tx, MarketId::AlphaArt);
        assert_eq!(decoder.account(&ix, 0).ok(), Some("a"));
        assert!(decoder.account(&ix, 1).is_err());
    }

    #[test]
    fn extracts_logged_instruction_names() {
        let tx = RawTransaction::new("sig")
            .with_log("Program 111 invoke [1]")
            .with_log("Program log: Instruction: Transfer")
            .with_log("Program log: Instruction: Exchange ");
        let names: Vec<&str> = logged_instruction_names(&tx).collect();
        assert_eq!(names, vec!["Transfer", "Exchange"]);
    }
}
