//! Normalized raw transaction handed to marketplace parsers.
//!
//! The chain client decodes the RPC wire format into [`RawTransaction`];
//! parsers only ever see this shape. Account indices are already resolved
//! to base58 addresses and instruction data is kept base58-encoded, as the
//! RPC node returns it.

use serde::{Deserialize, Serialize};

/// One instruction of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInstruction {
    /// Program invoked by the instruction.
    pub program_id: String,
    /// Account addresses passed to the instruction, in order.
    #[serde(default)]
    pub accounts: Vec<String>,
    /// Base58-encoded instruction data.
    #[serde(default)]
    pub data: String,
}

impl RawInstruction {
    /// Creates an instruction from raw data bytes.
    #[must_use]
    pub fn new(program_id: impl Into<String>, accounts: Vec<String>, data: &[u8]) -> Self {
        Self {
            program_id: program_id.into(),
            accounts,
            data: bs58::encode(data).into_string(),
        }
    }

    /// Decodes the base58 instruction data.
    ///
    /// # Errors
    ///
    /// Returns the base58 decoding error if the data is not valid base58.
    pub fn decode_data(&self) -> Result<Vec<u8>, bs58::decode::Error> {
        bs58::decode(&self.data).into_vec()
    }

    /// Returns the account at `index`, if present.
    #[must_use]
    pub fn account(&self, index: usize) -> Option<&str> {
        self.accounts.get(index).map(String::as_str)
    }
}

/// A confirmed transaction as seen by the parsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    /// Transaction signature (the Solana transaction hash).
    pub signature: String,
    /// Slot the transaction landed in.
    #[serde(default)]
    pub slot: u64,
    /// Estimated production time, if the node knows it.
    #[serde(default)]
    pub block_time: Option<i64>,
    /// All account keys referenced by the transaction.
    #[serde(default)]
    pub account_keys: Vec<String>,
    /// Top-level instructions in execution order.
    #[serde(default)]
    pub instructions: Vec<RawInstruction>,
    /// Program log output.
    #[serde(default)]
    pub log_messages: Vec<String>,
    /// `false` when the transaction failed on chain.
    #[serde(default = "default_succeeded")]
    pub succeeded: bool,
}

const fn default_succeeded() -> bool {
    true
}

impl RawTransaction {
    /// Creates a successful transaction with no instructions.
    #[must_use]
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
            slot: 0,
            block_time: None,
            account_keys: Vec::new(),
            instructions: Vec::new(),
            log_messages: Vec::new(),
            succeeded: true,
        }
    }

    /// Appends an instruction, registering its program and accounts as
    /// account keys.
    #[must_use]
    pub fn with_instruction(mut self, instruction: RawInstruction) -> Self {
        for key in std::iter::once(&instruction.program_id).chain(&instruction.accounts) {
            if !self.account_keys.contains(key) {
                self.account_keys.push(key.clone());
            }
        }
        self.instructions.push(instruction);
        self
    }

    /// Appends a program log line.
    #[must_use]
    pub fn with_log(mut self, line: impl Into<String>) -> Self {
        self.log_messages.push(line.into());
        self
    }

    /// Sets the block time.
    #[must_use]
    pub const fn with_block_time(mut self, block_time: i64) -> Self {
        self.block_time = Some(block_time);
        self
    }

    /// Returns `true` if any instruction invokes `program_id`.
    #[must_use]
    pub fn touches(&self, program_id: &str) -> bool {
        self.instructions.iter().any(|ix| ix.program_id == program_id)
    }

    /// Iterates over the instructions that invoke `program_id`.
    pub fn instructions_for<'a>(
        &'a self,
        program_id: &'a str,
    ) -> impl Iterator<Item = &'a RawInstruction> + 'a {
        self.instructions
            .iter()
            .filter(move |ix| ix.program_id == program_id)
    }
}
