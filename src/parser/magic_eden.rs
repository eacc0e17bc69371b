//! Magic Eden v2 parser.
//!
//! Magic Eden v2 is an Anchor program: the first 8 bytes of the instruction
//! data are the discriminator of the instruction name. Three instructions
//! map to market events:
//!
//! | Instruction       | Event     | Price offset | Accounts                       |
//! |-------------------|-----------|--------------|--------------------------------|
//! | `sell`            | Listing   | 10           | wallet #0, mint #4             |
//! | `cancel_sell`     | Delisting | 8            | wallet #0, mint #3             |
//! | `execute_sale_v2` | Sale      | 10           | buyer #0, seller #1, mint #4   |
//!
//! `sell` and `execute_sale_v2` carry two bump bytes before the price.

use std::sync::LazyLock;

use super::RawTransaction;
use super::layout::{InstructionDecoder, anchor_discriminator};
use crate::domain::{EventType, MarketId, SecondaryMarketEvent};
use crate::error::DecodingFailure;

/// Magic Eden v2 program id.
pub const PROGRAM_ID: &str = "M2mx93ekt1fmXSVkTrUL9xVFHkmME8HTUi5Cyc5aF7K";

static SELL: LazyLock<[u8; 8]> = LazyLock::new(|| anchor_discriminator("sell"));
static CANCEL_SELL: LazyLock<[u8; 8]> = LazyLock::new(|| anchor_discriminator("cancel_sell"));
static EXECUTE_SALE_V2: LazyLock<[u8; 8]> =
    LazyLock::new(|| anchor_discriminator("execute_sale_v2"));

const BUMPED_PRICE_OFFSET: usize = 10;
const CANCEL_PRICE_OFFSET: usize = 8;

/// Parses the first Magic Eden market instruction of `tx`.
///
/// # Errors
///
/// Returns a [`DecodingFailure`] if a recognized instruction has short data
/// or missing accounts.
pub fn parse(tx: &RawTransaction) -> Result<Option<SecondaryMarketEvent>, DecodingFailure> {
    let decoder = InstructionDecoder::new(tx, MarketId::MagicEden);
    for ix in tx.instructions_for(PROGRAM_ID) {
        let data = decoder.data(ix)?;
        let Some(discriminator) = data.get(..8) else {
            continue;
        };

        if discriminator == SELL.as_slice() {
            let price = decoder.u64_le(&data, BUMPED_PRICE_OFFSET)?;
            let wallet = decoder.account(ix, 0)?;
            let mint = decoder.account(ix, 4)?;
            return decoder
                .event(EventType::Listing, mint, price, wallet, None)
                .map(Some);
        }
        if discriminator == CANCEL_SELL.as_slice() {
            let price = decoder.u64_le(&data, CANCEL_PRICE_OFFSET)?;
            let wallet = decoder.account(ix, 0)?;
            let mint = decoder.account(ix, 3)?;
            return decoder
                .event(EventType::Delisting, mint, price, wallet, None)
                .map(Some);
        }
        if discriminator == EXECUTE_SALE_V2.as_slice() {
            let price = decoder.u64_le(&data, BUMPED_PRICE_OFFSET)?;
            let buyer = decoder.account(ix, 0)?;
            let seller = decoder.account(ix, 1)?;
            let mint = decoder.account(ix, 4)?;
            return decoder
                .event(EventType::Sale, mint, price, seller, Some(buyer))
                .map(Some);
        }
    }
    Ok(None)
}

#[cfg(test)]
#[allow(clippy::panic)]
pub(crate) mod tests {
    use super::*;
    use crate::parser::RawInstruction;

    fn accounts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    fn bumped(name: &str, price: u64) -> Vec<u8> {
        let mut data = anchor_discriminator(name).to_vec();
        data.extend_from_slice(&[254, 253]);
        data.extend_from_slice(&price.to_le_bytes());
        data.extend_from_slice(&1u64.to_le_bytes());
        data
    }

    /// Builds a Magic Eden `execute_sale_v2` transaction.
    pub(crate) fn sale_tx(
        signature: &str,
        mint: &str,
        price: u64,
        seller: &str,
        buyer: &str,
    ) -> RawTransaction {
        RawTransaction::new(signature)
            .with_block_time(1_650_000_000)
            .with_instruction(RawInstruction::new(
                PROGRAM_ID,
                accounts(&[buyer, seller, "notary", "tokenAccount", mint]),
                &bumped("execute_sale_v2", price),
            ))
    }

    #[test]
    fn parses_sale() {
        let tx = sale_tx("abc123", "Tok1", 1_000_000_000, "ownerX", "buyerY");
        let Ok(Some(event)) = parse(&tx) else {
            panic!("expected sale");
        };
        assert_eq!(event.event_type, EventType::Sale);
        assert_eq!(event.token_key, "Tok1");
        assert_eq!(event.price, 1_000_000_000);
        assert_eq!(event.owner, "ownerX");
        assert_eq!(event.buyer, "buyerY");
        assert_eq!(event.transaction_hash, "abc123");
        assert_eq!(event.timestamp, 1_650_000_000);
    }

    #[test]
    fn parses_listing_after_unrelated_instruction() {
        let tx = RawTransaction::new("sig")
            .with_instruction(RawInstruction::new(
                "ComputeBudget111111111111111111111111111111",
                vec![],
                &[2, 0, 0, 0, 0],
            ))
            .with_instruction(RawInstruction::new(
                PROGRAM_ID,
                accounts(&["wallet", "notary", "ta", "ata", "Mint9"]),
                &bumped("sell", 42),
            ));
        let Ok(Some(event)) = parse(&tx) else {
            panic!("expected listing");
        };
        assert_eq!(event.event_type, EventType::Listing);
        assert_eq!(event.owner, "wallet");
        assert_eq!(event.token_key, "Mint9");
        assert!(event.buyer.is_empty());
    }

    #[test]
    fn parses_delisting() {
        let mut data = anchor_discriminator("cancel_sell").to_vec();
        data.extend_from_slice(&77u64.to_le_bytes());
        let tx = RawTransaction::new("sig").with_instruction(RawInstruction::new(
            PROGRAM_ID,
            accounts(&["wallet", "notary", "ta", "Mint3"]),
            &data,
        ));
        let Ok(Some(event)) = parse(&tx) else {
            panic!("expected delisting");
        };
        assert_eq!(event.event_type, EventType::Delisting);
        assert_eq!(event.price, 77);
        assert_eq!(event.token_key, "Mint3");
    }

    #[test]
    fn unknown_instruction_is_not_applicable() {
        let tx = RawTransaction::new("sig").with_instruction(RawInstruction::new(
            PROGRAM_ID,
            accounts(&["wallet"]),
            &anchor_discriminator("deposit"),
        ));
        assert_eq!(parse(&tx), Ok(None));
    }

    #[test]
    fn truncated_sale_is_a_decoding_failure() {
        let mut data = anchor_discriminator("execute_sale_v2").to_vec();
        data.push(1);
        let tx = RawTransaction::new("bad").with_instruction(RawInstruction::new(
            PROGRAM_ID,
            accounts(&["b", "s", "n", "t", "m"]),
            &data,
        ));
        let Err(failure) = parse(&tx) else {
            panic!("expected decoding failure");
        };
        assert_eq!(failure.signature, "bad");
        assert_eq!(failure.market, MarketId::MagicEden);
    }
}
