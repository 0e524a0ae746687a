//! Slot: one pooled connection attempt and its lifecycle state.
//!
//! ```text
//! Initial ──resolve──► Idle ◄──revert── Busy
//!    │                  │ └────lease────►│
//!    └──────lease───────┼───────────────►│
//!                       ▼                ▼
//!                    Closing ◄──────shutdown
//! ```
//!
//! Every transition is a compare-and-swap on the state word; the loser of a
//! race retries or abandons its surrounding operation.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::connector::{Connection, ConnectionFuture};

/// Lifecycle state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SlotState {
    /// Connection attempt in flight, not yet claimed
    Initial = 0,
    /// Available for lease
    Idle = 1,
    /// Held by a caller
    Busy = 2,
    /// Terminal; removed from every registry
    Closing = 3,
}

impl SlotState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Initial,
            1 => Self::Idle,
            2 => Self::Busy,
            _ => Self::Closing,
        }
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initial => "INITIAL",
            Self::Idle => "IDLE",
            Self::Busy => "BUSY",
            Self::Closing => "CLOSING",
        };
        f.write_str(name)
    }
}

pub(crate) struct Slot<C: Connection> {
    id: u64,
    state: AtomicU8,
    future: ConnectionFuture<C>,
    connection: OnceLock<Arc<C>>,
    last_idle: Mutex<Instant>,
    // set when shutdown abandons a leased slot whose connection is still pending
    detached: AtomicBool,
}

impl<C: Connection> Slot<C> {
    pub(crate) fn new(id: u64, state: SlotState, future: ConnectionFuture<C>) -> Self {
        Self {
            id,
            state: AtomicU8::new(state as u8),
            future,
            connection: OnceLock::new(),
            last_idle: Mutex::new(Instant::now()),
            detached: AtomicBool::new(false),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn state(&self) -> SlotState {
        SlotState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Single-writer-wins transition.
    pub(crate) fn transition(&self, from: SlotState, to: SlotState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claim an available slot for a caller. Pending slots may be claimed
    /// before their connection resolves.
    pub(crate) fn try_lease(&self) -> bool {
        loop {
            let current = self.state();
            if !matches!(current, SlotState::Initial | SlotState::Idle) {
                return false;
            }
            if self.transition(current, SlotState::Busy) {
                return true;
            }
        }
    }

    /// Move any non-terminal state to `Closing`. Returns the previous state
    /// when this call won the transition.
    pub(crate) fn begin_close(&self) -> Option<SlotState> {
        let prev = SlotState::from_u8(self.state.swap(SlotState::Closing as u8, Ordering::AcqRel));
        (prev != SlotState::Closing).then_some(prev)
    }

    /// Restart the idle clock, returning the previous start.
    pub(crate) fn mark_idle_now(&self) -> Instant {
        std::mem::replace(&mut *self.last_idle.lock(), Instant::now())
    }

    pub(crate) fn restore_last_idle(&self, at: Instant) {
        *self.last_idle.lock() = at;
    }

    pub(crate) fn last_idle(&self) -> Instant {
        *self.last_idle.lock()
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_idle())
    }

    pub(crate) fn future(&self) -> ConnectionFuture<C> {
        self.future.clone()
    }

    pub(crate) fn set_connection(&self, connection: Arc<C>) {
        let _ = self.connection.set(connection);
    }

    pub(crate) fn connection(&self) -> Option<&Arc<C>> {
        self.connection.get()
    }

    /// Signal the underlying connection, if any, to close.
    pub(crate) fn close_connection(&self) {
        if let Some(connection) = self.connection.get() {
            connection.close();
        }
    }

    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    pub(crate) fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// A slot whose connection never resolves.
    #[cfg(test)]
    pub(crate) fn unresolved(id: u64, state: SlotState) -> Self {
        let future = crate::connector::into_connection_future(std::future::pending());
        Self::new(id, state, future)
    }
}

impl<C: Connection> fmt::Debug for Slot<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("idle_ms", &self.idle_for(Instant::now()).as_millis())
            .finish()
    }
}
