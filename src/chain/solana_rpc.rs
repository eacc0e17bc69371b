//! Solana JSON-RPC chain client backed by `reqwest`.
//!
//! Uses `getTransaction` (JSON encoding, v0 transactions allowed) for
//! transaction fetches, `getSignaturesForAddress` for an asset's history and
//! `getProgramAccounts` over the Metaplex metadata program, filtered on the
//! update authority, for collection enumeration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::ChainClient;
use crate::error::PipelineError;
use crate::parser::{RawInstruction, RawTransaction};

/// Metaplex token metadata program.
pub const METADATA_PROGRAM_ID: &str = "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s";

/// Byte offset of the update authority inside a metadata account.
const UPDATE_AUTHORITY_OFFSET: u64 = 1;

/// Page size cap of `getSignaturesForAddress`.
const MAX_SIGNATURE_PAGE: usize = 1_000;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EncodedTransaction {
    slot: u64,
    block_time: Option<i64>,
    meta: Option<TransactionMeta>,
    transaction: UiTransaction,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionMeta {
    err: Option<serde_json::Value>,
    log_messages: Option<Vec<String>>,
    loaded_addresses: Option<LoadedAddresses>,
}

#[derive(Debug, Default, Deserialize)]
struct LoadedAddresses {
    #[serde(default)]
    writable: Vec<String>,
    #[serde(default)]
    readonly: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UiTransaction {
    message: UiMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiMessage {
    account_keys: Vec<String>,
    instructions: Vec<UiCompiledInstruction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UiCompiledInstruction {
    program_id_index: usize,
    accounts: Vec<usize>,
    data: String,
}

#[derive(Debug, Deserialize)]
struct KeyedAccount {
    pubkey: String,
}

#[derive(Debug, Deserialize)]
struct SignatureInfo {
    signature: String,
    err: Option<serde_json::Value>,
}

/// JSON-RPC client for a Solana node.
#[derive(Debug)]
pub struct SolanaRpcClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl SolanaRpcClient {
    /// Creates a client for the given RPC endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot build rpc client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        target: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, PipelineError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let resp = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::fetch(target, e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            return Err(PipelineError::fetch(target, format!("{method}: HTTP {status}")));
        }

        let parsed = resp
            .json::<RpcResponse<T>>()
            .await
            .map_err(|e| PipelineError::fetch(target, format!("{method}: {e}")))?;
        if let Some(err) = parsed.error {
            return Err(PipelineError::fetch(
                target,
                format!("{method}: rpc error {}: {}", err.code, err.message),
            ));
        }
        Ok(parsed.result)
    }
}

/// Resolves account indices and flattens the RPC shape into a
/// [`RawTransaction`].
fn normalize(signature: &str, encoded: EncodedTransaction) -> Result<RawTransaction, PipelineError> {
    let meta = encoded.meta.unwrap_or_default();
    let mut account_keys = encoded.transaction.message.account_keys;
    if let Some(loaded) = meta.loaded_addresses {
        account_keys.extend(loaded.writable);
        account_keys.extend(loaded.readonly);
    }

    let resolve = |index: usize| {
        account_keys.get(index).cloned().ok_or_else(|| {
            PipelineError::fetch(signature, format!("account index {index} out of range"))
        })
    };

    let instructions = encoded
        .transaction
        .message
        .instructions
        .into_iter()
        .map(|ix| {
            Ok(RawInstruction {
                program_id: resolve(ix.program_id_index)?,
                accounts: ix
                    .accounts
                    .into_iter()
                    .map(resolve)
                    .collect::<Result<Vec<_>, _>>()?,
                data: ix.data,
            })
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;

    Ok(RawTransaction {
        signature: signature.to_string(),
        slot: encoded.slot,
        block_time: encoded.block_time,
        account_keys,
        instructions,
        log_messages: meta.log_messages.unwrap_or_default(),
        succeeded: meta.err.is_none(),
    })
}

#[async_trait]
impl ChainClient for SolanaRpcClient {
    async fn fetch_transaction(&self, signature: &str) -> Result<RawTransaction, PipelineError> {
        let params = json!([
            signature,
            {
                "encoding": "json",
                "commitment": "confirmed",
                "maxSupportedTransactionVersion": 0,
            }
        ]);
        let encoded: EncodedTransaction = self
            .call(signature, "getTransaction", params)
            .await?
            .ok_or_else(|| PipelineError::fetch(signature, "transaction not found"))?;
        normalize(signature, encoded)
    }

    async fn enumerate_collection(&self, authority: &str) -> Result<Vec<String>, PipelineError> {
        let params = json!([
            METADATA_PROGRAM_ID,
            {
                "encoding": "base64",
                "dataSlice": { "offset": 0, "length": 0 },
                "filters": [
                    { "memcmp": { "offset": UPDATE_AUTHORITY_OFFSET, "bytes": authority } }
                ],
            }
        ]);
        let accounts: Vec<KeyedAccount> = self
            .call(authority, "getProgramAccounts", params)
            .await?
            .unwrap_or_default();
        Ok(accounts.into_iter().map(|a| a.pubkey).collect())
    }

    async fn signatures_for_address(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<String>, PipelineError> {
        let params = json!([
            address,
            {
                "limit": limit.clamp(1, MAX_SIGNATURE_PAGE),
                "commitment": "confirmed",
            }
        ]);
        let infos: Vec<SignatureInfo> = self
            .call(address, "getSignaturesForAddress", params)
            .await?
            .unwrap_or_default();
        Ok(successful_signatures(infos))
    }
}

fn successful_signatures(infos: Vec<SignatureInfo>) -> Vec<String> {
    infos
        .into_iter()
        .filter(|info| info.err.is_none())
        .map(|info| info.signature)
        .collect()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn encoded(json: serde_json::Value) -> EncodedTransaction {
        let Ok(encoded) = serde_json::from_value(json) else {
            panic!("fixture does not match rpc shape");
        };
        encoded
    }

    #[test]
    fn normalizes_rpc_transaction() {
        let tx = encoded(json!({
            "slot": 120,
            "blockTime": 1_650_000_000,
            "meta": {
                "err": null,
                "logMessages": ["Program log: Instruction: Buy"],
                "loadedAddresses": { "writable": ["LoadedW"], "readonly": [] }
            },
            "transaction": {
                "signatures": ["sig"],
                "message": {
                    "accountKeys": ["Payer", "Program"],
                    "instructions": [
                        { "programIdIndex": 1, "accounts": [0, 2], "data": "3Bxs" }
                    ]
                }
            }
        }));
        let Ok(raw) = normalize("sig", tx) else {
            panic!("normalize failed");
        };
        assert_eq!(raw.slot, 120);
        assert_eq!(raw.block_time, Some(1_650_000_000));
        assert!(raw.succeeded);
        assert_eq!(raw.account_keys, vec!["Payer", "Program", "LoadedW"]);
        let Some(ix) = raw.instructions.first() else {
            panic!("missing instruction");
        };
        assert_eq!(ix.program_id, "Program");
        assert_eq!(ix.accounts, vec!["Payer", "LoadedW"]);
        assert_eq!(raw.log_messages.len(), 1);
    }

    #[test]
    fn failed_transaction_is_marked() {
        let tx = encoded(json!({
            "slot": 1,
            "blockTime": null,
            "meta": { "err": { "InstructionError": [0, "Custom"] } },
            "transaction": { "message": { "accountKeys": [], "instructions": [] } }
        }));
        let Ok(raw) = normalize("sig", tx) else {
            panic!("normalize failed");
        };
        assert!(!raw.succeeded);
        assert!(raw.log_messages.is_empty());
    }

    #[test]
    fn out_of_range_account_is_fetch_failure() {
        let tx = encoded(json!({
            "slot": 1,
            "blockTime": null,
            "meta": null,
            "transaction": {
                "message": {
                    "accountKeys": ["A"],
                    "instructions": [{ "programIdIndex": 3, "accounts": [], "data": "" }]
                }
            }
        }));
        assert!(normalize("sig", tx).is_err());
    }

    #[test]
    fn failed_signatures_are_skipped() {
        let Ok(infos) = serde_json::from_value::<Vec<SignatureInfo>>(json!([
            { "signature": "ok1", "err": null, "slot": 5 },
            { "signature": "bad", "err": { "InstructionError": [0, "Custom"] } },
            { "signature": "ok2", "err": null }
        ])) else {
            panic!("fixture does not match rpc shape");
        };
        assert_eq!(successful_signatures(infos), vec!["ok1", "ok2"]);
    }
}
