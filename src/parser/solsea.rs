//! Solsea parser.
//!
//! Solsea logs its instruction names and lays out data Anchor-style: an
//! 8-byte discriminator followed by the price as a little-endian `u64`.
//!
//! | Logged name   | Event       | Accounts                       |
//! |---------------|-------------|--------------------------------|
//! | `Sell`        | Listing     | seller #0, mint #2             |
//! | `Buy`         | Sale        | buyer #0, seller #1, mint #3   |
//! | `Unlist`      | Delisting   | seller #0, mint #2 (no price)  |
//! | `ChangePrice` | PriceUpdate | seller #0, mint #1             |

use super::RawTransaction;
use super::layout::{InstructionDecoder, logged_instruction_names};
use crate::domain::{EventType, MarketId, SecondaryMarketEvent};
use crate::error::DecodingFailure;

/// Solsea program id.
pub const PROGRAM_ID: &str = "617jbWo616ggkDxvW1Le8pV38XLbVSyWY8ae6QUmGBAU";

const PRICE_OFFSET: usize = 8;

fn classify(name: &str) -> Option<EventType> {
    match name {
        "Sell" => Some(EventType::Listing),
        "Buy" => Some(EventType::Sale),
        "Unlist" => Some(EventType::Delisting),
        "ChangePrice" => Some(EventType::PriceUpdate),
        _ => None,
    }
}

/// Parses the Solsea instruction of `tx`, classified by its logs.
///
/// # Errors
///
/// Returns a [`DecodingFailure`] if the logged instruction's data or
/// accounts do not match the expected layout.
pub fn parse(tx: &RawTransaction) -> Result<Option<SecondaryMarketEvent>, DecodingFailure> {
    let Some(event_type) = logged_instruction_names(tx).find_map(classify) else {
        return Ok(None);
    };
    let Some(ix) = tx.instructions_for(PROGRAM_ID).next() else {
        return Ok(None);
    };

    let decoder = InstructionDecoder::new(tx, MarketId::Solsea);
    let data = decoder.data(ix)?;
    let seller_index = usize::from(event_type == EventType::Sale);
    let mint_index = match event_type {
        EventType::Sale => 3,
        EventType::PriceUpdate => 1,
        _ => 2,
    };
    let price = match event_type {
        EventType::Delisting => 0,
        _ => decoder.u64_le(&data, PRICE_OFFSET)?,
    };
    let seller = decoder.account(ix, seller_index)?;
    let mint = decoder.account(ix, mint_index)?;
    let buyer = match event_type {
        EventType::Sale => Some(decoder.account(ix, 0)?),
        _ => None,
    };
    decoder
        .event(event_type, mint, price, seller, buyer)
        .map(Some)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::parser::RawInstruction;

    fn priced(price: u64) -> Vec<u8> {
        let mut data = vec![0u8; 8];
        data.extend_from_slice(&price.to_le_bytes());
        data
    }

    fn ix(accounts: &[&str], data: &[u8]) -> RawInstruction {
        RawInstruction::new(
            PROGRAM_ID,
            accounts.iter().map(|s| (*s).to_string()).collect(),
            data,
        )
    }

    #[test]
    fn parses_sale() {
        let tx = RawTransaction::new("s")
            .with_instruction(ix(&["buyer", "seller", "escrow", "MintS"], &priced(640)))
            .with_log("Program log: Instruction: Buy");
        let Ok(Some(event)) = parse(&tx) else {
            panic!("expected sale");
        };
        assert_eq!(event.event_type, EventType::Sale);
        assert_eq!(event.owner, "seller");
        assert_eq!(event.buyer, "buyer");
        assert_eq!(event.token_key, "MintS");
        assert_eq!(event.price, 640);
    }

    #[test]
    fn parses_price_update() {
        let tx = RawTransaction::new("s")
            .with_instruction(ix(&["seller", "MintP"], &priced(5)))
            .with_log("Program log: Instruction: ChangePrice");
        let Ok(Some(event)) = parse(&tx) else {
            panic!("expected price update");
        };
        assert_eq!(event.event_type, EventType::PriceUpdate);
        assert_eq!(event.token_key, "MintP");
        assert_eq!(event.price, 5);
    }

    #[test]
    fn unlist_ignores_price() {
        let tx = RawTransaction::new("s")
            .with_instruction(ix(&["seller", "escrow", "MintU"], &[0u8; 8]))
            .with_log("Program log: Instruction: Unlist");
        let Ok(Some(event)) = parse(&tx) else {
            panic!("expected delisting");
        };
        assert_eq!(event.event_type, EventType::Delisting);
        assert_eq!(event.price, 0);
    }

    #[test]
    fn log_without_instruction_is_not_applicable() {
        let tx = RawTransaction::new("s").with_log("Program log: Instruction: Buy");
        assert_eq!(parse(&tx), Ok(None));
    }
}
