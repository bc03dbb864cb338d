//! Agent lifecycle.
//!
//! ```text
//! store init ─▶ bonding gate ─▶ Synchronizer ──(caught up)──▶ Generator
//!                                   │                            │
//!                                   └──── shared local store ────┘
//! ```
//!
//! The two loops never talk to each other directly. The only message is
//! the one-shot catch-up signal that starts the generator.

use std::sync::Arc;

use thoughtchain_engine::GenerationEngine;
use tokio::sync::oneshot;
use tracing::info;

use crate::bonding::{ensure_bonded, Confirm};
use crate::error::AgentError;
use crate::generation::{GenerationSettings, Generator};
use crate::ledger::Ledger;
use crate::shutdown::{self, Shutdown};
use crate::store::{KvStore, Mirror};
use crate::sync::{Backoff, Synchronizer};

pub struct Agent {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn KvStore>,
    engine: Arc<dyn GenerationEngine>,
    settings: GenerationSettings,
    backoff: Backoff,
}

impl Agent {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn KvStore>,
        engine: Arc<dyn GenerationEngine>,
        settings: GenerationSettings,
        backoff: Backoff,
    ) -> Self {
        Self {
            ledger,
            store,
            engine,
            settings,
            backoff,
        }
    }

    /// Run until shutdown.
    ///
    /// Fails early with `BondingDeclined` (or a ledger error) before any
    /// loop starts. Afterwards loop failures are handled inside the loops;
    /// only a loop task dying (panic) surfaces as `AgentError::Task`.
    pub async fn run(self, confirm: &dyn Confirm, shutdown: Shutdown) -> Result<(), AgentError> {
        if Mirror::new(self.store.as_ref()).initialize()? {
            info!("Initialized fresh local store");
        }

        ensure_bonded(self.ledger.as_ref(), confirm).await?;

        let (caught_up_tx, caught_up_rx) = oneshot::channel();
        let synchronizer = Synchronizer::new(self.ledger.clone(), self.store.clone(), self.backoff);
        let sync_handle = tokio::spawn(synchronizer.run(caught_up_tx, shutdown.clone()));

        let mut stop = shutdown.clone();
        let cursor = tokio::select! {
            caught_up = caught_up_rx => caught_up.ok(),
            _ = shutdown::stopped(&mut stop) => None,
        };

        // signal dropped unsent: either shutdown or the synchronizer died
        let Some(cursor) = cursor else {
            sync_handle.await?;
            return Ok(());
        };

        info!(cursor, "Catch-up complete, starting generation");
        let generator = Generator::new(self.engine, self.ledger, self.store, self.settings);
        let gen_handle = tokio::spawn(generator.run(shutdown));

        // first loop to die ends the agent; the other is torn down with the runtime
        tokio::try_join!(sync_handle, gen_handle)?;

        Ok(())
    }
}
