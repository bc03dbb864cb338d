//! Ledger access - the on-chain thought log
//!
//! Handles:
//! - The `Ledger` seam used by the synchronizer, the commit loop and bonding
//! - EVM JSON-RPC binding of the thought-log contract
//! - An in-memory ledger for tests

pub mod abi;
pub mod memory;
pub mod rpc;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::MemoryLedger;
pub use rpc::JsonRpcLedger;

/// Ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// No entry at this index yet (reading past the tip)
    #[error("No entry at index {0}")]
    NotFound(u64),

    /// Transport failure talking to the node
    #[error("Network error: {0}")]
    Network(String),

    /// Node answered with a JSON-RPC error
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Transaction was mined but reverted
    #[error("Transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    /// Transaction did not finalize in time
    #[error("Timed out waiting for receipt of {tx_hash}")]
    ReceiptTimeout { tx_hash: String },

    /// Malformed return data
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Outcome of a finalized ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

/// Widen engine token ids to ledger words.
pub fn widen(tokens: &[u32]) -> Vec<U256> {
    tokens.iter().map(|t| U256::from(*t)).collect()
}

/// Narrow ledger words to engine token ids; `None` if any word does not fit.
pub fn narrow(words: &[U256]) -> Option<Vec<u32>> {
    words.iter().map(|w| u32::try_from(*w).ok()).collect()
}

/// Client of the append-only thought log contract.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Account this client submits as.
    fn account(&self) -> Address;

    /// Words of the entry at `index`, or `NotFound` past the tip.
    ///
    /// Entries are `uint256[]` on chain and any writer may commit values
    /// outside the engine vocabulary, so they are returned unnarrowed.
    async fn read_entry(&self, index: u64) -> Result<Vec<U256>, LedgerError>;

    /// Append a new entry; the ledger assigns its index.
    async fn submit_entry(&self, tokens: &[u32]) -> Result<TxReceipt, LedgerError>;

    /// Bonded balance of `account`, in wei.
    async fn bonded_balance(&self, account: Address) -> Result<U256, LedgerError>;

    /// Minimum bond required to submit, in wei.
    async fn submission_threshold(&self) -> Result<U256, LedgerError>;

    /// Bond `amount` wei and wait for the transaction to finalize.
    async fn bond(&self, amount: U256) -> Result<TxReceipt, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_rejects_words_past_u32() {
        assert_eq!(narrow(&widen(&[0, 7, u32::MAX])), Some(vec![0, 7, u32::MAX]));
        assert_eq!(narrow(&[U256::from(1u64), U256::from(1u64 << 32)]), None);
        assert_eq!(narrow(&[]), Some(vec![]));
    }
}
