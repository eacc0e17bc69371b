//! Digital Eyes parser.
//!
//! Digital Eyes runs an escrow program whose instruction kind is only
//! visible in the program logs (`Program log: Instruction: <Name>`). The
//! price sits after a one-byte tag in the instruction data.
//!
//! | Logged name        | Event     | Accounts                          |
//! |--------------------|-----------|-----------------------------------|
//! | `InitializeEscrow` | Listing   | seller #0, mint #3                |
//! | `Exchange`         | Sale      | buyer #0, seller #2, mint #4      |
//! | `CancelEscrow`     | Delisting | seller #0, mint #3 (no price)     |

use super::RawTransaction;
use super::layout::{InstructionDecoder, logged_instruction_names};
use crate::domain::{EventType, MarketId, SecondaryMarketEvent};
use crate::error::DecodingFailure;

/// Digital Eyes program id.
pub const PROGRAM_ID: &str = "A7p8451ktDCHq5yYaHczeLMYsjRsAkzc3hCXcSrwYHU7";

fn classify(name: &str) -> Option<EventType> {
    match name {
        "InitializeEscrow" => Some(EventType::Listing),
        "Exchange" => Some(EventType::Sale),
        "CancelEscrow" => Some(EventType::Delisting),
        _ => None,
    }
}

/// Parses the Digital Eyes instruction of `tx`, classified by its logs.
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

    let decoder = InstructionDecoder::new(tx, MarketId::DigitalEyes);
    let data = decoder.data(ix)?;
    let event = match event_type {
        EventType::Sale => {
            let price = decoder.u64_le(&data, 1)?;
            let buyer = decoder.account(ix, 0)?;
            let seller = decoder.account(ix, 2)?;
            let mint = decoder.account(ix, 4)?;
            decoder.event(EventType::Sale, mint, price, seller, Some(buyer))?
        }
        EventType::Delisting => {
            let seller = decoder.account(ix, 0)?;
            let mint = decoder.account(ix, 3)?;
            decoder.event(EventType::Delisting, mint, 0, seller, None)?
        }
        other => {
            let price = decoder.u64_le(&data, 1)?;
            let seller = decoder.account(ix, 0)?;
            let mint = decoder.account(ix, 3)?;
            decoder.event(other, mint, price, seller, None)?
        }
    };
    Ok(Some(event))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::parser::RawInstruction;

    fn priced(price: u64) -> Vec<u8> {
        let mut data = vec![0u8];
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
    fn classifies_by_log_line() {
        let tx = RawTransaction::new("s")
            .with_instruction(ix(&["buyer", "bta", "seller", "escrow", "MintE"], &priced(12)))
            .with_log("Program log: Instruction: Transfer")
            .with_log("Program log: Instruction: Exchange");
        let Ok(Some(event)) = parse(&tx) else {
            panic!("expected sale");
        };
        assert_eq!(event.event_type, EventType::Sale);
        assert_eq!(event.owner, "seller");
        assert_eq!(event.buyer, "buyer");
        assert_eq!(event.token_key, "MintE");
        assert_eq!(event.price, 12);
    }

    #[test]
    fn parses_listing() {
        let tx = RawTransaction::new("s")
            .with_instruction(ix(&["seller", "ta", "escrow", "MintL"], &priced(99)))
            .with_log("Program log: Instruction: InitializeEscrow");
        let Ok(Some(event)) = parse(&tx) else {
            panic!("expected listing");
        };
        assert_eq!(event.event_type, EventType::Listing);
        assert_eq!(event.price, 99);
    }

    #[test]
    fn no_known_log_is_not_applicable() {
        let tx = RawTransaction::new("s")
            .with_instruction(ix(&["seller"], &priced(1)))
            .with_log("Program log: Instruction: Transfer");
        assert_eq!(parse(&tx), Ok(None));
    }

    #[test]
    fn logged_sale_with_short_data_fails() {
        let tx = RawTransaction::new("s")
            .with_instruction(ix(&["b", "bta", "s", "e", "m"], &[0, 1]))
            .with_log("Program log: Instruction: Exchange");
        assert!(parse(&tx).is_err());
    }
}
