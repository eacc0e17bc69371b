//! Alpha Art parser.
//!
//! Alpha Art selects the instruction with its first data byte and stores
//! the price as a little-endian `u64` right after it.
//!
//! | Tag | Event     | Accounts                      |
//! |-----|-----------|-------------------------------|
//! | 0   | Listing   | owner #0, mint #2             |
//! | 1   | Sale      | buyer #0, seller #1, mint #3  |
//! | 2   | Delisting | owner #0, mint #2             |

use super::RawTransaction;
use super::layout::InstructionDecoder;
use crate::domain::{EventType, MarketId, SecondaryMarketEvent};
use crate::error::DecodingFailure;

/// Alpha Art program id.
pub const PROGRAM_ID: &str = "HZaWndaNWHFDd9Dhk5pqUUtsmoBCqzb1MLu3NAh1VX6B";

/// Parses the first Alpha Art market instruction of `tx`.
///
/// # Errors
///
/// Returns a [`DecodingFailure`] if a recognized instruction has short data
/// or missing accounts.
pub fn parse(tx: &RawTransaction) -> Result<Option<SecondaryMarketEvent>, DecodingFailure> {
    let decoder = InstructionDecoder::new(tx, MarketId::AlphaArt);
    for ix in tx.instructions_for(PROGRAM_ID) {
        let data = decoder.data(ix)?;
        let event = match data.first() {
            Some(0) => {
                let price = decoder.u64_le(&data, 1)?;
                let owner = decoder.account(ix, 0)?;
                let mint = decoder.account(ix, 2)?;
                decoder.event(EventType::Listing, mint, price, owner, None)?
            }
            Some(1) => {
                let price = decoder.u64_le(&data, 1)?;
                let buyer = decoder.account(ix, 0)?;
                let seller = decoder.account(ix, 1)?;
                let mint = decoder.account(ix, 3)?;
                decoder.event(EventType::Sale, mint, price, seller, Some(buyer))?
            }
            Some(2) => {
                let owner = decoder.account(ix, 0)?;
                let mint = decoder.account(ix, 2)?;
                decoder.event(EventType::Delisting, mint, 0, owner, None)?
            }
            _ => continue,
        };
        return Ok(Some(event));
    }
    Ok(None)
}
