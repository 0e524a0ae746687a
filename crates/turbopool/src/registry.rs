//! Slot registries shared between pool operations and the sweeper.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::connector::Connection;
use crate::slot::Slot;

/// Slots available for lease, oldest first.
///
/// Entries may go stale when a slot is closed concurrently; consumers skip
/// anything they cannot claim.
pub(crate) struct IdleRegistry<C: Connection> {
    queue: Mutex<VecDeque<Arc<Slot<C>>>>,
}

impl<C: Connection> IdleRegistry<C> {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Pop the oldest slot that `claim` accepts, discarding rejected ones.
    pub(crate) fn pop_claimed(&self, claim: impl Fn(&Slot<C>) -> bool) -> Option<Arc<Slot<C>>> {
        let mut queue = self.queue.lock();
        while let Some(slot) = queue.pop_front() {
            if claim(&slot) {
                return Some(slot);
            }
        }
        None
    }

    /// Append at the tail while `admit` holds, evaluated under the lock.
    pub(crate) fn push_if(&self, slot: Arc<Slot<C>>, admit: impl FnOnce() -> bool) -> bool {
        let mut queue = self.queue.lock();
        if admit() {
            queue.push_back(slot);
            true
        } else {
            false
        }
    }

    pub(crate) fn remove(&self, slot: &Arc<Slot<C>>) {
        self.queue.lock().retain(|s| !Arc::ptr_eq(s, slot));
    }

    pub(crate) fn clear(&self) -> usize {
        let mut queue = self.queue.lock();
        let n = queue.len();
        queue.clear();
        n
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().len()
    }

    #[cfg(test)]
    pub(crate) fn ids(&self) -> Vec<u64> {
        self.queue.lock().iter().map(|s| s.id()).collect()
    }
}

/// Established connections by identity.
pub(crate) struct LiveRegistry<C: Connection> {
    slots: DashMap<C::Id, Arc<Slot<C>>>,
}

impl<C: Connection> LiveRegistry<C> {
    pub(crate) fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    pub(crate) fn insert(&self, id: C::Id, slot: Arc<Slot<C>>) {
        self.slots.insert(id, slot);
    }

    pub(crate) fn get(&self, id: &C::Id) -> Option<Arc<Slot<C>>> {
        self.slots.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn remove(&self, id: &C::Id) -> Option<Arc<Slot<C>>> {
        self.slots.remove(id).map(|(_, slot)| slot)
    }

    pub(crate) fn contains(&self, id: &C::Id) -> bool {
        self.slots.contains_key(id)
    }

    /// Copy out every entry so callers can mutate without holding shard locks.
    pub(crate) fn snapshot(&self) -> Vec<(C::Id, Arc<Slot<C>>)> {
        self.slots
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Slots whose connection has not resolved yet, keyed by slot id.
pub(crate) struct PendingSet<C: Connection> {
    slots: DashMap<u64, Arc<Slot<C>>>,
}

impl<C: Connection> PendingSet<C> {
    pub(crate) fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    pub(crate) fn insert(&self, slot: Arc<Slot<C>>) {
        self.slots.insert(slot.id(), slot);
    }

    pub(crate) fn remove(&self, id: u64) -> Option<Arc<Slot<C>>> {
        self.slots.remove(&id).map(|(_, slot)| slot)
    }

    pub(crate) fn drain(&self) -> Vec<Arc<Slot<C>>> {
        let ids: Vec<u64> = self.slots.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}
