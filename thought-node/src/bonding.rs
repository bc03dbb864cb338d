//! Startup bonding gate and operator confirmation.
//!
//! Runs once before either loop starts: if the account's bonded balance is
//! below the submission threshold, ask the operator whether to bond exactly
//! the threshold and wait for that transaction to finalize.

use std::sync::atomic::{AtomicU32, Ordering};

use alloy_primitives::U256;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use crate::error::AgentError;
use crate::ledger::abi::format_ether;
use crate::ledger::Ledger;

/// Yes/no operator prompt.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, question: &str) -> Result<bool, AgentError>;
}

/// Asks on the terminal; any answer starting with `y` confirms.
pub struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, question: &str) -> Result<bool, AgentError> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{} (yes/no) ", question).as_bytes())
            .await?;
        stdout.flush().await?;

        let mut answer = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut answer)
            .await?;
        Ok(is_yes(&answer))
    }
}

/// Fixed answer, for `--yes` and tests. Counts how often it was asked.
pub struct FixedAnswer {
    answer: bool,
    asked: AtomicU32,
}

impl FixedAnswer {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicU32::new(0),
        }
    }

    pub fn asked(&self) -> u32 {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Confirm for FixedAnswer {
    async fn confirm(&self, question: &str) -> Result<bool, AgentError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        info!(question, answer = self.answer, "Auto-answering prompt");
        Ok(self.answer)
    }
}

pub fn is_yes(answer: &str) -> bool {
    answer.trim().to_lowercase().starts_with('y')
}

/// What the gate did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BondingOutcome {
    /// Already at or above the threshold
    Sufficient { bonded: U256, threshold: U256 },
    /// Operator approved and the bond transaction finalized
    Bonded { amount: U256, tx_hash: String },
}

/// Check the bond and top it up if the operator agrees.
///
/// Returns `AgentError::BondingDeclined` if the operator says no.
pub async fn ensure_bonded(
    ledger: &dyn Ledger,
    confirm: &dyn Confirm,
) -> Result<BondingOutcome, AgentError> {
    let account = ledger.account();
    let bonded = ledger.bonded_balance(account).await?;
    let threshold = ledger.submission_threshold().await?;

    info!(%account, "Using wallet address");
    info!(bonded = %format_ether(bonded), threshold = %format_ether(threshold), "My bonding");

    if bonded >= threshold {
        return Ok(BondingOutcome::Sufficient { bonded, threshold });
    }

    info!("Bonding coins to be able to submit");
    let question = format!("Do you want to bond {} coins?", format_ether(threshold));
    if !confirm.confirm(&question).await? {
        return Err(AgentError::BondingDeclined);
    }

    let receipt = ledger.bond(threshold).await?;
    info!(tx_hash = %receipt.tx_hash, "Bonded successfully");

    Ok(BondingOutcome::Bonded {
        amount: threshold,
        tx_hash: receipt.tx_hash,
    })
}
