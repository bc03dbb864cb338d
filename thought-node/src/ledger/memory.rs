//! In-memory ledger for tests.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;

use super::{widen, Ledger, LedgerError, TxReceipt};

/// Append-only log held in memory.
///
/// Starts with an empty entry at index 0, like a freshly deployed contract,
/// so the first proposal lands at index 1.
pub struct MemoryLedger {
    account: Address,
    entries: Mutex<Vec<Vec<U256>>>,
    bonded: Mutex<U256>,
    threshold: U256,
    reject_submissions: bool,
    failing_reads: AtomicU32,
    bond_calls: AtomicU32,
    read_calls: AtomicU64,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            account: Address::repeat_byte(0x11),
            entries: Mutex::new(vec![Vec::new()]),
            bonded: Mutex::new(U256::ZERO),
            threshold: U256::ZERO,
            reject_submissions: false,
            failing_reads: AtomicU32::new(0),
            bond_calls: AtomicU32::new(0),
            read_calls: AtomicU64::new(0),
        }
    }

    /// Pre-populate entries `1..=n` (index 0 is always the empty genesis).
    pub fn with_entries<I>(self, entries: I) -> Self
    where
        I: IntoIterator<Item = Vec<u32>>,
    {
        if let Ok(mut log) = self.entries.lock() {
            log.extend(entries.into_iter().map(|tokens| widen(&tokens)));
        }
        self
    }

    pub fn with_bonding(mut self, bonded: U256, threshold: U256) -> Self {
        self.bonded = Mutex::new(bonded);
        self.threshold = threshold;
        self
    }

    /// Make every submission fail as if the transaction reverted.
    pub fn rejecting_submissions(mut self) -> Self {
        self.reject_submissions = true;
        self
    }

    /// Fail the next `count` reads with a transport error.
    pub fn failing_reads(self, count: u32) -> Self {
        self.failing_reads.store(count, Ordering::SeqCst);
        self
    }

    /// Append as another agent would.
    pub fn append_external(&self, tokens: Vec<u32>) -> u64 {
        self.append_words(widen(&tokens))
    }

    /// Append raw contract words, including values no engine could produce.
    pub fn append_words(&self, words: Vec<U256>) -> u64 {
        let mut log = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        log.push(words);
        (log.len() - 1) as u64
    }

    /// Highest index present.
    pub fn tip(&self) -> u64 {
        let log = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        (log.len() - 1) as u64
    }

    pub fn entry(&self, index: u64) -> Option<Vec<U256>> {
        let log = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        log.get(index as usize).cloned()
    }

    pub fn bond_calls(&self) -> u32 {
        self.bond_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> u64 {
        self.read_calls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    fn account(&self) -> Address {
        self.account
    }

    async fn read_entry(&self, index: u64) -> Result<Vec<U256>, LedgerError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(LedgerError::Network("connection refused".to_string()));
        }
        self.entry(index).ok_or(LedgerError::NotFound(index))
    }

    async fn submit_entry(&self, tokens: &[u32]) -> Result<TxReceipt, LedgerError> {
        if self.reject_submissions {
            return Err(LedgerError::Reverted {
                tx_hash: "0xrejected".to_string(),
            });
        }
        let index = self.append_words(widen(tokens));
        Ok(TxReceipt {
            tx_hash: format!("0x{:064x}", index),
            block_number: Some(index),
        })
    }

    async fn bonded_balance(&self, account: Address) -> Result<U256, LedgerError> {
        if account != self.account {
            return Ok(U256::ZERO);
        }
        Ok(*self.bonded.lock().unwrap_or_else(|p| p.into_inner()))
    }

    async fn submission_threshold(&self) -> Result<U256, LedgerError> {
        Ok(self.threshold)
    }

    async fn bond(&self, amount: U256) -> Result<TxReceipt, LedgerError> {
        self.bond_calls.fetch_add(1, Ordering::SeqCst);
        let mut bonded = self.bonded.lock().unwrap_or_else(|p| p.into_inner());
        *bonded += amount;
        Ok(TxReceipt {
            tx_hash: "0xbond".to_string(),
            block_number: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_genesis_and_append() {
        let ledger = MemoryLedger::new().with_entries(vec![vec![1], vec![2]]);
        assert_eq!(ledger.tip(), 2);
        assert!(ledger.read_entry(0).await.unwrap().is_empty());
        assert_eq!(ledger.read_entry(2).await.unwrap(), widen(&[2]));
        assert!(matches!(ledger.read_entry(3).await, Err(LedgerError::NotFound(3))));

        ledger.submit_entry(&[3]).await.unwrap();
        assert_eq!(ledger.read_entry(3).await.unwrap(), widen(&[3]));
    }

    #[tokio::test]
    async fn test_failing_reads_then_recovers() {
        let ledger = MemoryLedger::new().with_entries(vec![vec![5]]).failing_reads(2);
        assert!(matches!(ledger.read_entry(1).await, Err(LedgerError::Network(_))));
        assert!(matches!(ledger.read_entry(1).await, Err(LedgerError::Network(_))));
        assert_eq!(ledger.read_entry(1).await.unwrap(), widen(&[5]));
        assert_eq!(ledger.read_calls(), 3);
    }

    #[tokio::test]
    async fn test_bond_accumulates() {
        let ledger = MemoryLedger::new().with_bonding(U256::from(1), U256::from(10));
        ledger.bond(U256::from(10)).await.unwrap();
        assert_eq!(ledger.bonded_balance(ledger.account()).await.unwrap(), U256::from(11));
        assert_eq!(ledger.bond_calls(), 1);
    }
}
