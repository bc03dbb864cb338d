//! Generation-and-commit loop
//!
//! Each cycle reads the cursor, builds a window from the mirror, asks the
//! engine for the next entry, and proposes it only if the cursor has not
//! moved while the engine was busy.
//!
//! The cursor check is check-then-act, not compare-and-swap: the
//! synchronizer may still advance the cursor between the re-read and the
//! submission. A late proposal then lands at the next free ledger index and
//! never overwrites an existing entry.

pub mod window;

use std::sync::Arc;
use std::time::Duration;

use thoughtchain_engine::GenerationEngine;
use tracing::{debug, error, info, warn};

use crate::error::AgentError;
use crate::ledger::Ledger;
use crate::shutdown::{self, Shutdown};
use crate::store::{KvStore, Mirror};

pub use window::{build_window, entry_prompt, window_start};

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// System preamble for every window
    pub system_prompt: String,
    /// Entries per window
    pub window_size: u64,
    /// Seed is `cursor + seed_offset`
    pub seed_offset: u64,
    /// Pause after a failed engine call
    pub retry_delay: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            window_size: 6,
            seed_offset: 41,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Candidate for `cursor + 1` was proposed
    Submitted {
        cursor: u64,
        tx_hash: String,
        tokens: usize,
    },
    /// Cursor moved during generation; candidate dropped
    Stale { expected: u64, actual: u64 },
    /// Engine produced nothing to propose
    Empty { cursor: u64 },
}

pub struct Generator {
    engine: Arc<dyn GenerationEngine>,
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn KvStore>,
    settings: GenerationSettings,
}

impl Generator {
    pub fn new(
        engine: Arc<dyn GenerationEngine>,
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn KvStore>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            engine,
            ledger,
            store,
            settings,
        }
    }

    /// Run one generate-then-commit cycle.
    pub async fn cycle(&self) -> Result<CycleOutcome, AgentError> {
        let mirror = Mirror::new(self.store.as_ref());
        let cursor = mirror.cursor_or_zero()?;

        let window = build_window(
            &mirror,
            self.engine.as_ref(),
            &self.settings.system_prompt,
            cursor,
            self.settings.window_size,
        )
        .await?;

        let seed = cursor + self.settings.seed_offset;
        debug!(cursor, seed, turns = window.turns.len(), "Generating next entry");
        let completion = self.engine.complete(&window, seed).await?;

        let current = mirror.cursor_or_zero()?;
        if current != cursor {
            debug!(expected = cursor, actual = current, "Cursor moved during generation, discarding");
            return Ok(CycleOutcome::Stale {
                expected: cursor,
                actual: current,
            });
        }

        let tokens = self.engine.tokenize(&completion.text).await?;
        if tokens.is_empty() {
            return Ok(CycleOutcome::Empty { cursor });
        }

        info!(cursor, tokens = tokens.len(), "Submitting new thought:\n{}", completion.text);
        let receipt = self
            .ledger
            .submit_entry(&tokens)
            .await
            .map_err(AgentError::Submission)?;

        Ok(CycleOutcome::Submitted {
            cursor,
            tx_hash: receipt.tx_hash,
            tokens: tokens.len(),
        })
    }

    /// Cycle until shutdown. Failures end the cycle, never the loop.
    pub async fn run(self, mut shutdown: Shutdown) {
        info!(engine = %self.engine.id(), "Generation loop started");

        loop {
            if shutdown::requested(&shutdown) {
                break;
            }
            // stale and failed cycles restart at once; let the synchronizer in
            tokio::task::yield_now().await;

            let result = tokio::select! {
                result = self.cycle() => result,
                _ = shutdown.changed() => break,
            };

            let pause = match result {
                Ok(CycleOutcome::Submitted { cursor, tx_hash, tokens }) => {
                    info!(cursor, %tx_hash, tokens, "Thought submitted");
                    None
                }
                Ok(CycleOutcome::Stale { .. }) => None,
                Ok(CycleOutcome::Empty { cursor }) => {
                    warn!(cursor, "Engine returned an empty entry, skipping");
                    Some(self.settings.retry_delay)
                }
                Err(AgentError::Submission(e)) => {
                    error!(error = %e, "Submission failed, dropping candidate");
                    None
                }
                Err(AgentError::Engine(e)) => {
                    warn!(error = %e, "Generation engine failed");
                    Some(self.settings.retry_delay)
                }
                Err(e) => {
                    error!(error = %e, "Generation cycle failed");
                    Some(self.settings.retry_delay)
                }
            };

            if let Some(delay) = pause {
                if shutdown::sleep_or_stop(delay, &mut shutdown).await {
                    break;
                }
            }
        }

        info!("Generation loop stopped");
    }
}
