//! Test doubles for exercising pools without a network.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use crate::connector::{Connection, Connector};
use crate::error::{PoolError, PoolResult};

/// How [`MockConnector`] resolves establishment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMode {
    /// Every attempt succeeds as soon as it is polled
    Immediate,
    /// Attempts wait for [`MockConnector::complete_next`] or
    /// [`MockConnector::fail_next`]
    Manual,
}

#[derive(Debug)]
struct MockState {
    mode: MockMode,
    next_id: AtomicU64,
    closed: Mutex<HashSet<u64>>,
    shut_down: AtomicBool,
    outcomes_tx: mpsc::UnboundedSender<PoolResult<()>>,
    outcomes_rx: AsyncMutex<mpsc::UnboundedReceiver<PoolResult<()>>>,
}

/// Connector whose attempts are resolved by the test
#[derive(Debug, Clone)]
pub struct MockConnector {
    state: Arc<MockState>,
}

/// Connection produced by [`MockConnector`]
#[derive(Debug)]
pub struct MockConnection {
    id: u64,
    state: Arc<MockState>,
}

impl MockConnector {
    /// Create a connector in the given mode
    pub fn new(mode: MockMode) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(MockState {
                mode,
                next_id: AtomicU64::new(1),
                closed: Mutex::new(HashSet::new()),
                shut_down: AtomicBool::new(false),
                outcomes_tx,
                outcomes_rx: AsyncMutex::new(outcomes_rx),
            }),
        }
    }

    /// Connector whose attempts succeed immediately
    pub fn immediate() -> Self {
        Self::new(MockMode::Immediate)
    }

    /// Connector whose attempts wait for the test
    pub fn manual() -> Self {
        Self::new(MockMode::Manual)
    }

    /// Let the next waiting (or future) attempt succeed
    pub fn complete_next(&self) {
        let _ = self.state.outcomes_tx.send(Ok(()));
    }

    /// Make the next waiting (or future) attempt fail
    pub fn fail_next(&self, reason: &str) {
        let _ = self
            .state
            .outcomes_tx
            .send(Err(PoolError::EstablishFailed(reason.to_string())));
    }

    /// Whether the connection with `id` was signalled to close
    pub fn is_closed(&self, id: &u64) -> bool {
        self.state.closed.lock().contains(id)
    }

    /// How many connections were signalled to close
    pub fn closed_count(&self) -> usize {
        self.state.closed.lock().len()
    }

    /// Yield until at least `count` connections were closed
    pub async fn wait_closed(&self, count: usize) {
        while self.closed_count() < count {
            tokio::task::yield_now().await;
        }
    }

    /// Whether [`Connector::shutdown`] was called
    pub fn is_shut_down(&self) -> bool {
        self.state.shut_down.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;
    type Template = ();

    async fn establish(&self, _template: &()) -> PoolResult<MockConnection> {
        if self.state.mode == MockMode::Manual {
            let outcome = self.state.outcomes_rx.lock().await.recv().await;
            outcome.unwrap_or_else(|| Err(PoolError::EstablishFailed("connector dropped".into())))?;
        }
        Ok(MockConnection {
            id: self.state.next_id.fetch_add(1, Ordering::Relaxed),
            state: Arc::clone(&self.state),
        })
    }

    fn shutdown(&self) {
        self.state.shut_down.store(true, Ordering::Release);
    }
}

impl Connection for MockConnection {
    type Id = u64;

    fn id(&self) -> u64 {
        self.id
    }

    fn close(&self) {
        self.state.closed.lock().insert(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_outcomes_are_ordered() {
        let connector = MockConnector::manual();
        connector.complete_next();
        connector.fail_next("boom");

        let first = connector.establish(&()).await.unwrap();
        let second = connector.establish(&()).await.unwrap_err();
        assert_eq!(first.id(), 1);
        assert_eq!(second, PoolError::EstablishFailed("boom".to_string()));
    }

    #[tokio::test]
    async fn test_close_is_recorded() {
        let connector = MockConnector::immediate();
        let conn = connector.establish(&()).await.unwrap();
        conn.close();
        conn.close();
        assert!(connector.is_closed(&conn.id()));
        assert_eq!(connector.closed_count(), 1);
    }
}
