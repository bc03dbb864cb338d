//! Catch-up synchronizer - mirrors the ledger log into the local store
//!
//! Handles:
//! - Entry-by-entry catch-up from the cursor to the ledger tip
//! - A one-shot "caught up" signal on first reaching the tip
//! - Idle polling with a configurable backoff policy afterwards

pub mod backoff;
pub mod synchronizer;

// Re-exports
pub use backoff::Backoff;
pub use synchronizer::{StepOutcome, SyncError, Synchronizer};
