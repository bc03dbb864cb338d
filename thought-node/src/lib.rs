//! thoughtchain-node: always-on agent for an on-chain thought log
//!
//! The agent keeps a local mirror of an append-only log held by a ledger
//! contract and extends that log with generated entries:
//! - Catch-up synchronizer (ledger → local store, then idle polling)
//! - Generation-and-commit loop (window → engine → optimistic commit)
//! - One-shot bonding gate before either loop starts

pub mod agent;
pub mod bonding;
pub mod cli;
pub mod config;
pub mod error;
pub mod generation;
pub mod ledger;
pub mod shutdown;
pub mod store;
pub mod sync;

pub use agent::Agent;
pub use config::Config;
pub use error::AgentError;
