//! Errors surfaced by the agent's startup gate and generation loop.

use thoughtchain_engine::EngineError;

use crate::ledger::LedgerError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Generation engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The ledger rejected a proposed entry; the candidate is dropped
    #[error("Submission failed: {0}")]
    Submission(LedgerError),

    #[error("Cannot continue without bonded balance")]
    BondingDeclined,

    #[error("Operator prompt failed: {0}")]
    Prompt(#[from] std::io::Error),

    /// A background loop panicked or was aborted
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
