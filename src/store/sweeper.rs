use super::TtlStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Handle to a running sweep task. Dropping it leaves the task running;
/// call [`SweepHandle::shutdown`] to stop it.
pub struct SweepHandle {
    name: &'static str,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Signal the task to stop and wait for it to exit.
    pub async fn shutdown(self) {
        // Receiver only goes away if the task already exited.
        let _ = self.stop_tx.send(true);

        if let Err(e) = self.task.await {
            warn!(store = self.name, error = %e, "Sweep task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn the periodic sweep for `store`.
///
/// A single task owns the ticker, so sweeps never overlap. Missed ticks are
/// skipped rather than replayed. Must be called from within a tokio runtime.
pub fn spawn_sweeper<V>(store: Arc<TtlStore<V>>, every: Duration, name: &'static str) -> SweepHandle
where
    V: Send + Sync + 'static,
{
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let period = every.max(Duration::from_millis(1));

    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // First tick fires immediately; nothing can be stale yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = store.sweep();
                    debug!(store = name, evicted, remaining = store.len(), "Sweep complete");
                }
                _ = stop_rx.changed() => break,
            }
        }

        debug!(store = name, "Sweeper stopped");
    });

    SweepHandle {
        name,
        stop_tx,
        task,
    }
}
