//! Background execution owned by a pool.
//!
//! Connection drivers and the eviction sweeper run on the runtime captured at
//! pool construction. Shutdown cancels the sweeper; drivers for attempts that
//! are still in flight run to completion so leased connections are never
//! cut off mid-handshake.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{PoolError, PoolResult};

pub(crate) struct Scheduler {
    handle: Handle,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Capture the ambient tokio runtime.
    pub(crate) fn current() -> PoolResult<Self> {
        let handle = Handle::try_current()
            .map_err(|e| PoolError::Runtime(format!("No tokio runtime available: {e}")))?;
        Ok(Self::with_handle(handle))
    }

    pub(crate) fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            shutdown: CancellationToken::new(),
            sweeper: Mutex::new(None),
        }
    }

    /// Run a connection driver in the background.
    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        drop(self.handle.spawn(future));
    }

    /// Start the periodic sweeper. `tick` returns `false` once its pool is gone.
    pub(crate) fn start_sweeper<F>(&self, period: Duration, mut tick: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let token = self.shutdown.clone();
        let task = self.handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        if !tick() {
                            break;
                        }
                    }
                }
            }
            trace!("Eviction sweeper stopped");
        });

        debug!(period_ms = period.as_millis() as u64, "Eviction sweeper started");
        if let Some(previous) = self.sweeper.lock().replace(task) {
            previous.abort();
        }
    }

    /// Stop the sweeper. Idempotent.
    pub(crate) fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(task) = self.sweeper.lock().take() {
            task.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_requires_runtime() {
        assert!(matches!(Scheduler::current(), Err(PoolError::Runtime(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_ticks_until_shutdown() {
        let scheduler = Scheduler::current().unwrap();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        scheduler.start_sweeper(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let seen = ticks.load(Ordering::SeqCst);
        // the first tick fires immediately
        assert!(seen >= 3, "expected at least 3 ticks, saw {seen}");

        scheduler.shutdown();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_when_tick_declines() {
        let scheduler = Scheduler::current().unwrap();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        scheduler.start_sweeper(Duration::from_secs(1), move || {
            counter.fetch_add(1, Ordering::SeqCst) < 1
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }
}
