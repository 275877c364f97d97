use std::collections::VecDeque;
use std::sync::Arc;

use super::worker::WorkerSlot;

/// Workers parked waiting for a direct hand-off.
///
/// FIFO: the longest-parked worker is reused first, which keeps recently
/// active workers cycling through their backlog poll and gives the shrink
/// check a chance to run. Only accessed under the pool lock.
#[derive(Debug)]
pub(crate) struct IdleRegistry {
    slots: VecDeque<Arc<WorkerSlot>>,
}

impl IdleRegistry {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: VecDeque::with_capacity(capacity),
        }
    }

    pub(crate) fn register(&mut self, slot: Arc<WorkerSlot>) {
        debug_assert!(
            self.slots.iter().all(|s| s.id() != slot.id()),
            "worker {} registered idle twice",
            slot.id()
        );
        self.slots.push_back(slot);
    }

    pub(crate) fn pop(&mut self) -> Option<Arc<WorkerSlot>> {
        self.slots.pop_front()
    }

    pub(crate) fn contains(&self, id: usize) -> bool {
        self.slots.iter().any(|s| s.id() == id)
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = Arc<WorkerSlot>> + '_ {
        self.slots.drain(..)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}
