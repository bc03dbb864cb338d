//! Catch-up synchronizer.
//!
//! Reads the ledger entry at `cursor + 1`, persists it, advances the cursor
//! and repeats. Reaching the tip is the normal steady state: the first time
//! it happens the handoff signal fires, then the loop keeps polling with
//! backoff for entries appended by other agents.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::Backoff;
use crate::ledger::{Ledger, LedgerError};
use crate::shutdown::{self, Shutdown};
use crate::store::{KvStore, Mirror, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result of a single synchronizer step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Entry `index` was mirrored and the cursor now points at it
    Mirrored { index: u64, tokens: usize },
    /// Nothing at `next` yet; the mirror is level with the ledger
    AtTip { next: u64 },
}

pub struct Synchronizer {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn KvStore>,
    backoff: Backoff,
}

impl Synchronizer {
    pub fn new(ledger: Arc<dyn Ledger>, store: Arc<dyn KvStore>, backoff: Backoff) -> Self {
        Self {
            ledger,
            store,
            backoff,
        }
    }

    /// Try to mirror the entry after the cursor.
    pub async fn step(&self) -> Result<StepOutcome, SyncError> {
        let next = Mirror::new(self.store.as_ref()).cursor_or_zero()? + 1;

        let tokens = match self.ledger.read_entry(next).await {
            Ok(tokens) => tokens,
            Err(LedgerError::NotFound(_)) => return Ok(StepOutcome::AtTip { next }),
            Err(e) => return Err(e.into()),
        };

        Mirror::new(self.store.as_ref()).advance(next, &tokens)?;
        info!(index = next, tokens = tokens.len(), "Downloaded submission");

        Ok(StepOutcome::Mirrored {
            index: next,
            tokens: tokens.len(),
        })
    }

    /// Drain the ledger until the tip. Returns the final cursor.
    pub async fn catch_up(&self) -> Result<u64, SyncError> {
        loop {
            if let StepOutcome::AtTip { next } = self.step().await? {
                return Ok(next - 1);
            }
        }
    }

    /// Run until shutdown.
    ///
    /// `caught_up` receives the cursor the first time the tip is reached.
    /// Ledger and store failures are logged and retried after the backoff.
    pub async fn run(self, caught_up: oneshot::Sender<u64>, mut shutdown: Shutdown) {
        let mut caught_up = Some(caught_up);
        let mut idle: u32 = 0;

        info!("Synchronizer started");

        loop {
            if shutdown::requested(&shutdown) {
                break;
            }

            match self.step().await {
                Ok(StepOutcome::Mirrored { .. }) => {
                    idle = 0;
                    tokio::task::yield_now().await;
                    continue;
                }
                Ok(StepOutcome::AtTip { next }) => {
                    if let Some(tx) = caught_up.take() {
                        info!(cursor = next - 1, "Synced all submissions");
                        if tx.send(next - 1).is_err() {
                            debug!("Catch-up listener already gone");
                        }
                    }
                }
                Err(SyncError::Ledger(e)) => warn!(error = %e, "Ledger read failed"),
                Err(SyncError::Store(e)) => error!(error = %e, "Local store write failed"),
            }

            let delay = self.backoff.delay(idle);
            idle = idle.saturating_add(1);
            if shutdown::sleep_or_stop(delay, &mut shutdown).await {
                break;
            }
        }

        info!("Synchronizer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{widen, MemoryLedger};
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn setup(ledger: MemoryLedger) -> (Arc<MemoryLedger>, Arc<MemoryStore>, Synchronizer) {
        let ledger = Arc::new(ledger);
        let store = Arc::new(MemoryStore::new());
        Mirror::new(store.as_ref()).initialize().unwrap();
        let sync = Synchronizer::new(
            ledger.clone(),
            store.clone(),
            Backoff::Fixed(Duration::from_millis(5)),
        );
        (ledger, store, sync)
    }

    #[tokio::test]
    async fn test_step_advances_by_one() {
        let (_ledger, store, sync) = setup(MemoryLedger::new().with_entries(vec![vec![4, 5]]));

        let outcome = sync.step().await.unwrap();
        assert_eq!(outcome, StepOutcome::Mirrored { index: 1, tokens: 2 });

        let mirror = Mirror::new(store.as_ref());
        assert_eq!(mirror.cursor().unwrap(), Some(1));
        assert_eq!(mirror.record(1).unwrap(), Some(widen(&[4, 5])));

        assert_eq!(sync.step().await.unwrap(), StepOutcome::AtTip { next: 2 });
        assert_eq!(mirror.cursor().unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_crash_between_record_and_cursor_is_recovered() {
        let (_ledger, store, sync) = setup(MemoryLedger::new().with_entries(vec![vec![1], vec![2]]));
        let mirror = Mirror::new(store.as_ref());

        // record for 1 written, cursor still at 0
        mirror.put_record(1, &widen(&[1])).unwrap();

        assert_eq!(sync.step().await.unwrap(), StepOutcome::Mirrored { index: 1, tokens: 1 });
        assert_eq!(mirror.record(1).unwrap(), Some(widen(&[1])));
        assert_eq!(sync.catch_up().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_run_signals_once_and_keeps_following() {
        let (ledger, store, sync) = setup(MemoryLedger::new().with_entries(vec![vec![1]]));
        let (tx, rx) = oneshot::channel();
        let (stop, shutdown) = shutdown::channel();

        let handle = tokio::spawn(sync.run(tx, shutdown));
        assert_eq!(rx.await.unwrap(), 1);

        ledger.append_external(vec![2, 2]);
        let mirror = Mirror::new(store.as_ref());
        for _ in 0..200 {
            if mirror.cursor().unwrap() == Some(2) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(mirror.record(2).unwrap(), Some(widen(&[2, 2])));

        stop.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_wide_token_is_mirrored_and_catch_up_completes() {
        let (ledger, store, sync) = setup(MemoryLedger::new());
        let wide = vec![alloy_primitives::U256::from(1u64 << 32)];
        ledger.append_words(wide.clone());
        let (tx, rx) = oneshot::channel();
        let (stop, shutdown) = shutdown::channel();

        let handle = tokio::spawn(sync.run(tx, shutdown));
        let cursor = tokio::time::timeout(Duration::from_secs(2), rx).await.unwrap().unwrap();

        assert_eq!(cursor, 1);
        assert_eq!(Mirror::new(store.as_ref()).record(1).unwrap(), Some(wide));

        stop.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_failure_keeps_cursor_and_retries() {
        let (_ledger, store, sync) =
            setup(MemoryLedger::new().with_entries(vec![vec![6]]).failing_reads(2));
        let mirror = Mirror::new(store.as_ref());

        assert!(matches!(sync.step().await, Err(SyncError::Ledger(LedgerError::Network(_)))));
        assert_eq!(mirror.cursor().unwrap(), Some(0));
        assert!(matches!(sync.step().await, Err(SyncError::Ledger(_))));
        assert_eq!(mirror.cursor().unwrap(), Some(0));

        assert_eq!(sync.step().await.unwrap(), StepOutcome::Mirrored { index: 1, tokens: 1 });
        assert_eq!(sync.step().await.unwrap(), StepOutcome::AtTip { next: 2 });
    }

    #[tokio::test]
    async fn test_signal_waits_for_not_found_after_errors() {
        let (ledger, store, sync) = setup(MemoryLedger::new().failing_reads(3));
        let (tx, rx) = oneshot::channel();
        let (stop, shutdown) = shutdown::channel();

        let handle = tokio::spawn(sync.run(tx, shutdown));

        // the signal can only follow the first NotFound, i.e. the fourth read
        let cursor = tokio::time::timeout(Duration::from_secs(2), rx).await.unwrap().unwrap();
        assert_eq!(cursor, 0);
        assert!(ledger.read_calls() >= 4);
        assert_eq!(Mirror::new(store.as_ref()).cursor().unwrap(), Some(0));

        stop.send(true).unwrap();
        handle.await.unwrap();
    }
}
