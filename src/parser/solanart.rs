//! Solanart parser.
//!
//! Solanart is a native program whose first data byte selects the
//! instruction; prices follow as a little-endian `u64` at offset 1.
//!
//! | Tag | Event       | Accounts                                |
//! |-----|-------------|-----------------------------------------|
//! | 0   | Listing     | seller #0, mint #3                      |
//! | 1   | Sale        | buyer #0, seller #2, mint #4            |
//! | 2   | Delisting   | seller #0, mint #3 (no price)           |
//! | 3   | PriceUpdate | seller #0, mint #2                      |

use super::RawTransaction;
use super::layout::InstructionDecoder;
use crate::domain::{EventType, MarketId, SecondaryMarketEvent};
use crate::error::DecodingFailure;

/// Solanart program id.
pub const PROGRAM_ID: &str = "CJsLwbP1iu5DuUikHEJnLfANgKy6stB2uFgvBBHoyxwz";

const TAG_LIST: u8 = 0;
const TAG_BUY: u8 = 1;
const TAG_CANCEL: u8 = 2;
const TAG_UPDATE_PRICE: u8 = 3;
const PRICE_OFFSET: usize = 1;

/// Parses the first Solanart market instruction of `tx`.
///
/// # Errors
///
/// Returns a [`DecodingFailure`] if a recognized instruction has short data
/// or missing accounts.
pub fn parse(tx: &RawTransaction) -> Result<Option<SecondaryMarketEvent>, DecodingFailure> {
    let decoder = InstructionDecoder::new(tx, MarketId::Solanart);
    for ix in tx.instructions_for(PROGRAM_ID) {
        let data = decoder.data(ix)?;
        let Some(&tag) = data.first() else {
            continue;
        };

        let event = match tag {
            TAG_LIST => {
                let price = decoder.u64_le(&data, PRICE_OFFSET)?;
                let seller = decoder.account(ix, 0)?;
                let mint = decoder.account(ix, 3)?;
                decoder.event(EventType::Listing, mint, price, seller, None)?
            }
            TAG_BUY => {
                let price = decoder.u64_le(&data, PRICE_OFFSET)?;
                let buyer = decoder.account(ix, 0)?;
                let seller = decoder.account(ix, 2)?;
                let mint = decoder.account(ix, 4)?;
                decoder.event(EventType::Sale, mint, price, seller, Some(buyer))?
            }
            TAG_CANCEL => {
                let seller = decoder.account(ix, 0)?;
                let mint = decoder.account(ix, 3)?;
                decoder.event(EventType::Delisting, mint, 0, seller, None)?
            }
            TAG_UPDATE_PRICE => {
                let price = decoder.u64_le(&data, PRICE_OFFSET)?;
                let seller = decoder.account(ix, 0)?;
                let mint = decoder.account(ix, 2)?;
                decoder.event(EventType::PriceUpdate, mint, price, seller, None)?
            }
            _ => continue,
        };
        return Ok(Some(event));
    }
    Ok(None)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::parser::RawInstruction;

    fn tagged(tag: u8, price: u64) -> Vec<u8> {
        let mut data = vec![tag];
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
    fn parses_listing() {
        let tx = RawTransaction::new("s")
            .with_instruction(ix(&["seller", "ta", "sale", "MintA"], &tagged(TAG_LIST, 500)));
        let Ok(Some(event)) = parse(&tx) else {
            panic!("expected listing");
        };
        assert_eq!(event.event_type, EventType::Listing);
        assert_eq!(event.price, 500);
        assert_eq!(event.owner, "seller");
        assert_eq!(event.token_key, "MintA");
    }

    #[test]
    fn parses_sale() {
        let tx = RawTransaction::new("s").with_instruction(ix(
            &["buyer", "bta", "seller", "sale", "MintB"],
            &tagged(TAG_BUY, 2_500_000_000),
        ));
        let Ok(Some(event)) = parse(&tx) else {
            panic!("expected sale");
        };
        assert_eq!(event.event_type, EventType::Sale);
        assert_eq!(event.buyer, "buyer");
        assert_eq!(event.owner, "seller");
        assert_eq!(event.price, 2_500_000_000);
    }

    #[test]
    fn parses_price_update() {
        let tx = RawTransaction::new("s")
            .with_instruction(ix(&["seller", "sale", "MintC"], &tagged(TAG_UPDATE_PRICE, 9)));
        let Ok(Some(event)) = parse(&tx) else {
            panic!("expected price update");
        };
        assert_eq!(event.event_type, EventType::PriceUpdate);
        assert_eq!(event.token_key, "MintC");
    }

    #[test]
    fn delisting_needs_no_price() {
        let tx = RawTransaction::new("s")
            .with_instruction(ix(&["seller", "ta", "sale", "MintD"], &[TAG_CANCEL]));
        let Ok(Some(event)) = parse(&tx) else {
            panic!("expected delisting");
        };
        assert_eq!(event.event_type, EventType::Delisting);
        assert_eq!(event.price, 0);
    }

    #[test]
    fn unknown_tag_is_not_applicable() {
        let tx = RawTransaction::new("s").with_instruction(ix(&["a"], &[42]));
        assert_eq!(parse(&tx), Ok(None));
    }

    #[test]
    fn sale_missing_mint_fails() {
        let tx = RawTransaction::new("s")
            .with_instruction(ix(&["buyer", "bta", "seller"], &tagged(TAG_BUY, 1)));
        assert!(parse(&tx).is_err());
    }
}
