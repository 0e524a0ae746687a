//! Connection pool orchestration.
//!
//! Sizing is lock free: a single atomic counter tracks every slot that is
//! pending, idle or leased, and growth only happens through
//! compare-and-increment against the configured bounds. The idle queue and
//! the live map are the only other shared state.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::PoolConfig;
use crate::connector::{Connection, Connector, Lease, into_connection_future};
use crate::error::{PoolError, PoolResult};
use crate::registry::{IdleRegistry, LiveRegistry, PendingSet};
use crate::scheduler::Scheduler;
use crate::slot::{Slot, SlotState};
use crate::stats::{Counters, PoolStats};

type Conn<K> = <K as Connector>::Connection;

/// Identity of the connections produced by connector `K`
pub type ConnectionId<K> = <Conn<K> as Connection>::Id;

/// Bounded, self-healing pool of asynchronously established connections.
///
/// `Pool` is a cheap handle; clones share the same pool. Every operation is
/// non-blocking: [`Pool::lease`] hands back a [`Lease`] immediately, even
/// when the underlying connection is still being established.
pub struct Pool<K: Connector> {
    inner: Arc<PoolInner<K>>,
}

struct PoolInner<K: Connector> {
    config: PoolConfig,
    connector: Arc<K>,
    template: Arc<K::Template>,

    /// Slots counted against the ceiling
    size: AtomicUsize,
    next_slot: AtomicU64,
    closed: AtomicBool,
    shut_down: AtomicBool,

    idle: IdleRegistry<Conn<K>>,
    live: LiveRegistry<Conn<K>>,
    pending: PendingSet<Conn<K>>,

    // one eviction pass at a time so the floor check holds
    sweep_lock: Mutex<()>,
    counters: Counters,
    scheduler: Scheduler,
}

impl<K: Connector> Pool<K> {
    /// Create a pool on the current tokio runtime and prepare the core
    /// connections.
    pub fn new(config: PoolConfig, connector: K, template: K::Template) -> PoolResult<Self> {
        let scheduler = Scheduler::current()?;
        Self::build(config, connector, template, scheduler)
    }

    /// Create a pool whose background work runs on `handle`.
    pub fn with_handle(
        config: PoolConfig,
        connector: K,
        template: K::Template,
        handle: Handle,
    ) -> PoolResult<Self> {
        Self::build(config, connector, template, Scheduler::with_handle(handle))
    }

    fn build(
        config: PoolConfig,
        connector: K,
        template: K::Template,
        scheduler: Scheduler,
    ) -> PoolResult<Self> {
        config.validate()?;

        let inner = Arc::new(PoolInner {
            connector: Arc::new(connector),
            template: Arc::new(template),
            size: AtomicUsize::new(0),
            next_slot: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            idle: IdleRegistry::new(),
            live: LiveRegistry::new(),
            pending: PendingSet::new(),
            sweep_lock: Mutex::new(()),
            counters: Counters::default(),
            scheduler,
            config,
        });

        if let Some(period) = inner.config.effective_sweep_interval() {
            let weak: Weak<PoolInner<K>> = Arc::downgrade(&inner);
            inner.scheduler.start_sweeper(period, move || match weak.upgrade() {
                Some(inner) => {
                    inner.sweep();
                    true
                }
                None => false,
            });
        }

        debug!(
            core = inner.config.core_size,
            max = inner.config.max_size,
            keep_alive_ms = inner.config.keep_alive.as_millis() as u64,
            "Connection pool created"
        );

        let pool = Self { inner };
        pool.prepare(pool.inner.config.core_size)?;
        Ok(pool)
    }

    /// Ensure at least `max(count, core_size)` connections exist or are being
    /// established, capped at `max_size`. Never shrinks the pool.
    ///
    /// Concurrent callers cooperate through the sizing counter: together they
    /// create exactly enough slots to reach the largest requested target.
    pub fn prepare(&self, count: usize) -> PoolResult<()> {
        self.inner.prepare(count)
    }

    /// Borrow a connection.
    ///
    /// Returns the oldest idle connection when one is available, otherwise
    /// starts a new one if the pool is below its ceiling. The returned lease
    /// may still be connecting; await it to observe the outcome.
    ///
    /// [`PoolError::CapacityExceeded`] is a backpressure signal, not a fault.
    pub fn lease(&self) -> PoolResult<Lease<Conn<K>>> {
        self.inner.lease()
    }

    /// Return a leased connection to the pool.
    pub fn revert(&self, id: &ConnectionId<K>) -> PoolResult<()> {
        self.inner.revert(id)
    }

    /// Stop handing out connections. Leased connections stay usable and may
    /// still be reverted; idle connections are no longer offered but remain
    /// tracked until [`Pool::shutdown`].
    pub fn close(&self) -> PoolResult<()> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(PoolError::ShutDown);
        }
        if self.inner.close_once() {
            Ok(())
        } else {
            warn!("Pool closed more than once");
            Err(PoolError::AlreadyClosed)
        }
    }

    /// Close the pool if needed, signal every tracked connection to close and
    /// release background resources. Idempotent.
    pub fn shutdown(&self) -> PoolResult<()> {
        self.inner.shutdown();
        Ok(())
    }

    /// Run one eviction pass now. Returns how many connections were closed.
    pub fn sweep(&self) -> usize {
        self.inner.sweep()
    }

    /// Slots currently counted against the ceiling
    pub fn size(&self) -> usize {
        self.inner.size.load(Ordering::Acquire)
    }

    /// Entries currently offered for lease
    pub fn available(&self) -> usize {
        self.inner.idle.len()
    }

    /// State of the slot owning an established connection
    pub fn state_of(&self, id: &ConnectionId<K>) -> Option<SlotState> {
        self.inner.live.get(id).map(|slot| slot.state())
    }

    /// Whether `close` has run
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Whether `shutdown` has run
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Snapshot of counters and registry sizes
    pub fn stats(&self) -> PoolStats {
        self.inner.stats()
    }
}

impl<K: Connector> PoolInner<K> {
    fn ensure_open(&self) -> PoolResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(PoolError::ShutDown);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }
        Ok(())
    }

    fn prepare(self: &Arc<Self>, count: usize) -> PoolResult<()> {
        self.ensure_open()?;

        let target = count
            .max(self.config.core_size)
            .min(self.config.max_size);
        let mut created = 0usize;

        loop {
            let current = self.size.load(Ordering::Acquire);
            if current >= target {
                break;
            }
            if self
                .size
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }

            let slot = self.new_slot(SlotState::Initial);
            let offered = self
                .idle
                .push_if(Arc::clone(&slot), || !self.closed.load(Ordering::Acquire));
            if !offered {
                trace!(slot = slot.id(), "Pool closed while preparing; slot not offered");
            }
            if self.withdraw_if_shut_down(&slot) {
                return Err(PoolError::ShutDown);
            }
            self.start(&slot);
            created += 1;
        }

        if created > 0 {
            debug!(created, target, state = %self.stats(), "Prepared connections");
        }
        Ok(())
    }

    fn lease(self: &Arc<Self>) -> PoolResult<Lease<Conn<K>>> {
        self.ensure_open()?;

        if let Some(slot) = self.idle.pop_claimed(Slot::try_lease) {
            Counters::bump(&self.counters.leases);
            trace!(slot = slot.id(), ready = slot.connection().is_some(), "Leased pooled slot");
            return Ok(Lease::new(slot.id(), slot.future()));
        }

        // idle queue empty, or raced empty by another lease: try to grow
        let max = self.config.max_size;
        let grown = self
            .size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| (c < max).then_some(c + 1));
        if grown.is_err() {
            Counters::bump(&self.counters.capacity_rejections);
            trace!(max, "Lease refused at capacity");
            return Err(PoolError::CapacityExceeded);
        }

        let slot = self.new_slot(SlotState::Busy);
        if self.withdraw_if_shut_down(&slot) {
            return Err(PoolError::ShutDown);
        }
        self.start(&slot);
        Counters::bump(&self.counters.leases);
        trace!(slot = slot.id(), state = %self.stats(), "Leased new slot");
        Ok(Lease::new(slot.id(), slot.future()))
    }

    fn revert(&self, id: &ConnectionId<K>) -> PoolResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(PoolError::ShutDown);
        }

        let slot = self
            .live
            .get(id)
            .ok_or_else(|| PoolError::UnknownConnection(format!("{id:?}")))?;

        // restart the idle clock before the slot becomes visible as idle
        let previous = slot.mark_idle_now();
        if !slot.transition(SlotState::Busy, SlotState::Idle) {
            slot.restore_last_idle(previous);
            return Err(PoolError::UnknownConnection(format!(
                "{id:?} is not leased (state {})",
                slot.state()
            )));
        }
        Counters::bump(&self.counters.reverts);

        let offered = self
            .idle
            .push_if(Arc::clone(&slot), || !self.closed.load(Ordering::Acquire));
        trace!(slot = slot.id(), offered, "Reverted connection");
        Ok(())
    }

    fn close_once(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let withdrawn = self.idle.clear();
        debug!(withdrawn, state = %self.stats(), "Pool closed");
        true
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            trace!("Pool already shut down");
            return;
        }
        self.close_once();
        self.scheduler.shutdown();

        let mut retired = 0usize;
        for (id, slot) in self.live.snapshot() {
            self.live.remove(&id);
            if self.retire(&slot) {
                retired += 1;
            }
        }
        for slot in self.pending.drain() {
            if self.retire(&slot) {
                retired += 1;
            }
        }
        self.idle.clear();
        self.connector.shutdown();

        debug!(retired, state = %self.stats(), "Pool shut down");
    }

    /// Undo a slot created while `shutdown` was draining the registries.
    /// Its attempt is never started.
    fn withdraw_if_shut_down(&self, slot: &Arc<Slot<Conn<K>>>) -> bool {
        if !self.shut_down.load(Ordering::SeqCst) {
            return false;
        }
        self.pending.remove(slot.id());
        self.idle.remove(slot);
        if slot.begin_close().is_some() {
            self.size.fetch_sub(1, Ordering::AcqRel);
        }
        trace!(slot = slot.id(), "Slot withdrawn during shutdown");
        true
    }

    /// Move a slot to `Closing`, releasing its capacity exactly once.
    fn retire(&self, slot: &Slot<Conn<K>>) -> bool {
        // a leased slot still connecting belongs to its caller once it resolves
        if slot.connection().is_none() && slot.state() == SlotState::Busy {
            slot.detach();
        }
        if slot.begin_close().is_none() {
            return false;
        }
        self.size.fetch_sub(1, Ordering::AcqRel);
        slot.close_connection();
        true
    }

    fn sweep(&self) -> usize {
        let keep_alive = self.config.keep_alive;
        if keep_alive.is_zero() || self.shut_down.load(Ordering::Acquire) {
            return 0;
        }
        let _guard = self.sweep_lock.lock();
        let core = self.config.core_size;
        let now = Instant::now();

        let mut candidates: Vec<_> = self
            .live
            .snapshot()
            .into_iter()
            .filter(|(_, slot)| slot.state() == SlotState::Idle)
            .collect();
        candidates.sort_by_key(|(_, slot)| slot.last_idle());

        let mut evicted = 0usize;
        for (id, slot) in candidates {
            if self.size.load(Ordering::Acquire) <= core {
                break;
            }
            if slot.idle_for(now) < keep_alive {
                continue;
            }
            // a concurrent lease wins over eviction
            if !slot.transition(SlotState::Idle, SlotState::Closing) {
                continue;
            }
            self.live.remove(&id);
            self.idle.remove(&slot);
            self.size.fetch_sub(1, Ordering::AcqRel);
            slot.close_connection();
            Counters::bump(&self.counters.evicted);
            evicted += 1;
            trace!(slot = slot.id(), connection = ?id, "Evicted idle connection");
        }

        if evicted > 0 {
            debug!(evicted, state = %self.stats(), "Evicted idle connections");
        }
        evicted
    }

    /// Create a slot and count it as pending. The connection attempt does not
    /// start until [`PoolInner::start`].
    fn new_slot(self: &Arc<Self>, state: SlotState) -> Arc<Slot<Conn<K>>> {
        let id = self.next_slot.fetch_add(1, Ordering::Relaxed);
        let pool = Arc::downgrade(self);
        let connector = Arc::clone(&self.connector);
        let template = Arc::clone(&self.template);

        let slot = Arc::new_cyclic(|me: &Weak<Slot<Conn<K>>>| {
            let me = me.clone();
            let future = into_connection_future(async move {
                let result = connector.establish(&template).await.map(Arc::new);
                if let (Some(pool), Some(slot)) = (pool.upgrade(), me.upgrade()) {
                    pool.on_established(&slot, &result);
                }
                result
            });
            Slot::new(id, state, future)
        });

        self.pending.insert(Arc::clone(&slot));
        Counters::bump(&self.counters.created);
        slot
    }

    /// Drive the slot's connection attempt in the background. The driver keeps
    /// the slot alive until the attempt resolves.
    fn start(&self, slot: &Arc<Slot<Conn<K>>>) {
        let future = slot.future();
        let keep = Arc::clone(slot);
        self.scheduler.spawn(async move {
            future.map(drop).await;
            drop(keep);
        });
    }

    /// Completion bookkeeping, run inside the shared future before any holder
    /// observes the outcome.
    fn on_established(&self, slot: &Arc<Slot<Conn<K>>>, result: &PoolResult<Arc<Conn<K>>>) {
        let connection = match result {
            Ok(connection) => connection,
            Err(e) => {
                Counters::bump(&self.counters.establish_failures);
                self.pending.remove(slot.id());
                if slot.begin_close().is_some() {
                    self.size.fetch_sub(1, Ordering::AcqRel);
                    self.idle.remove(slot);
                }
                warn!(slot = slot.id(), error = %e, "Connection establishment failed");
                return;
            }
        };

        slot.set_connection(Arc::clone(connection));
        let id = connection.id();

        if slot.state() == SlotState::Closing {
            self.pending.remove(slot.id());
            self.abandon(slot, connection);
            return;
        }

        self.live.insert(id.clone(), Arc::clone(slot));
        self.pending.remove(slot.id());

        // the idle clock starts before the slot can be seen as idle
        let previous = slot.mark_idle_now();
        if slot.transition(SlotState::Initial, SlotState::Idle) {
            trace!(slot = slot.id(), connection = ?id, "Connection established; idle");
        } else {
            // leased before the connection finished: stays Busy
            slot.restore_last_idle(previous);
            trace!(slot = slot.id(), connection = ?id, state = %slot.state(), "Connection established");
        }

        // shutdown may have drained the registries between the check and the insert
        if self.shut_down.load(Ordering::SeqCst) {
            self.live.remove(&id);
            if self.retire(slot) {
                trace!(slot = slot.id(), "Retired connection established during shutdown");
            } else {
                self.abandon(slot, connection);
            }
        }
    }

    /// A connection resolved after its slot was retired.
    fn abandon(&self, slot: &Slot<Conn<K>>, connection: &Arc<Conn<K>>) {
        if slot.is_detached() {
            debug!(slot = slot.id(), "Connection established after shutdown; left with its holder");
        } else {
            connection.close();
            trace!(slot = slot.id(), "Closed connection established after shutdown");
        }
    }

    fn stats(&self) -> PoolStats {
        let mut stats = PoolStats {
            size: self.size.load(Ordering::Acquire),
            live: self.live.len(),
            pending: self.pending.len(),
            idle: self.idle.len(),
            closed: self.closed.load(Ordering::Acquire),
            shut_down: self.shut_down.load(Ordering::Acquire),
            ..Default::default()
        };
        self.counters.fill(&mut stats);
        stats
    }
}

impl<K: Connector> Clone for Pool<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: Connector> fmt::Debug for Pool<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("stats", &self.inner.stats())
            .finish()
    }
}
