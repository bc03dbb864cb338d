//! EVM JSON-RPC ledger client.
//!
//! Reads go through `eth_call`; writes go through `eth_sendTransaction`
//! from an account managed by the node, then poll
//! `eth_getTransactionReceipt` until the transaction is mined.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::abi;
use super::{Ledger, LedgerError, TxReceipt};
use crate::config::LedgerConfig;

/// EIP-1474 "execution reverted" code.
const EXECUTION_REVERTED: i64 = 3;

pub struct JsonRpcLedger {
    client: Client,
    rpc_url: String,
    contract: Address,
    account: Address,
    receipt_poll: Duration,
    receipt_timeout: Duration,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptBody {
    status: Option<String>,
    block_number: Option<String>,
}

fn parse_address(text: &str, field: &str) -> Result<Address, LedgerError> {
    Address::from_str(text).map_err(|e| LedgerError::Decode(format!("{} {:?}: {}", field, text, e)))
}

impl JsonRpcLedger {
    pub fn new(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .build()
            .map_err(|e| LedgerError::Network(format!("building HTTP client: {}", e)))?;

        Ok(Self {
            client,
            rpc_url: config.rpc_url.clone(),
            contract: parse_address(&config.contract_address, "contract_address")?,
            account: parse_address(&config.account, "account")?,
            receipt_poll: Duration::from_millis(config.receipt_poll_ms),
            receipt_timeout: Duration::from_secs(config.receipt_timeout_secs),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LedgerError::Network(format!("HTTP {}: {}", status, text)));
        }

        let rpc: RpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        if let Some(err) = rpc.error {
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        serde_json::from_value(rpc.result.unwrap_or(Value::Null))
            .map_err(|e| LedgerError::Decode(format!("{} result: {}", method, e)))
    }

    async fn eth_call(&self, data: &[u8]) -> Result<Vec<u8>, LedgerError> {
        let params = json!([
            { "to": self.contract.to_string(), "data": abi::to_hex(data) },
            "latest"
        ]);
        let result: String = self.call("eth_call", params).await?;
        abi::from_hex(&result)
    }

    async fn send_transaction(&self, data: &[u8], value: Option<U256>) -> Result<TxReceipt, LedgerError> {
        let mut tx = json!({
            "from": self.account.to_string(),
            "to": self.contract.to_string(),
            "data": abi::to_hex(data),
        });
        if let Some(value) = value {
            tx["value"] = Value::from(abi::quantity(value));
        }

        let tx_hash: String = self.call("eth_sendTransaction", json!([tx])).await?;
        debug!(%tx_hash, "Transaction sent");
        self.wait_for_receipt(tx_hash).await
    }

    async fn wait_for_receipt(&self, tx_hash: String) -> Result<TxReceipt, LedgerError> {
        let deadline = tokio::time::Instant::now() + self.receipt_timeout;

        loop {
            let receipt: Option<ReceiptBody> = self
                .call("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;

            if let Some(receipt) = receipt {
                if receipt.status.as_deref() == Some("0x0") {
                    return Err(LedgerError::Reverted { tx_hash });
                }
                let block_number = receipt
                    .block_number
                    .as_deref()
                    .map(abi::parse_quantity)
                    .transpose()?
                    .and_then(|n| u64::try_from(n).ok());
                return Ok(TxReceipt { tx_hash, block_number });
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(LedgerError::ReceiptTimeout { tx_hash });
            }
            tokio::time::sleep(self.receipt_poll).await;
        }
    }
}

fn is_revert(code: i64, message: &str) -> bool {
    code == EXECUTION_REVERTED || message.to_ascii_lowercase().contains("revert")
}

#[async_trait]
impl Ledger for JsonRpcLedger {
    fn account(&self) -> Address {
        self.account
    }

    async fn read_entry(&self, index: u64) -> Result<Vec<U256>, LedgerError> {
        match self.eth_call(&abi::encode_get_submitted_tokens(index)).await {
            Ok(data) if data.is_empty() => Err(LedgerError::NotFound(index)),
            Ok(data) => abi::decode_token_array(&data),
            Err(LedgerError::Rpc { code, message }) if is_revert(code, &message) => {
                Err(LedgerError::NotFound(index))
            }
            Err(e) => Err(e),
        }
    }

    async fn submit_entry(&self, tokens: &[u32]) -> Result<TxReceipt, LedgerError> {
        let receipt = self
            .send_transaction(&abi::encode_propose(tokens), None)
            .await?;
        info!(tx_hash = %receipt.tx_hash, tokens = tokens.len(), "Entry proposed");
        Ok(receipt)
    }

    async fn bonded_balance(&self, account: Address) -> Result<U256, LedgerError> {
        let data = self.eth_call(&abi::encode_bonded_balances(account)).await?;
        abi::decode_uint(&data)
    }

    async fn submission_threshold(&self) -> Result<U256, LedgerError> {
        let data = self.eth_call(&abi::encode_submission_threshold()).await?;
        abi::decode_uint(&data)
    }

    async fn bond(&self, amount: U256) -> Result<TxReceipt, LedgerError> {
        self.send_transaction(&abi::encode_bond(), Some(amount)).await
    }
}
