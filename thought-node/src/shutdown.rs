//! Process-wide stop signal shared by the long-running loops.

use std::time::Duration;

use tokio::sync::watch;

/// Receiving side; `true` means stop.
pub type Shutdown = watch::Receiver<bool>;

/// Create the trigger and a receiver to clone into tasks.
pub fn channel() -> (watch::Sender<bool>, Shutdown) {
    watch::channel(false)
}

pub fn requested(shutdown: &Shutdown) -> bool {
    *shutdown.borrow()
}

/// Wait until shutdown is requested or the trigger is dropped.
pub async fn stopped(shutdown: &mut Shutdown) {
    while !requested(shutdown) {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Sleep for `delay` unless shutdown fires first. Returns true on shutdown.
pub async fn sleep_or_stop(delay: Duration, shutdown: &mut Shutdown) -> bool {
    if requested(shutdown) {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        changed = shutdown.changed() => {
            // a dropped sender also means nobody can keep us running
            changed.is_err() || requested(shutdown)
        }
    }
}
