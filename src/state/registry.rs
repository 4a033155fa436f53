use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use dashmap::{DashMap, Entry};
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio_util::sync::CancellationToken;

use super::clock::{ClockId, ClockStateMachine, ClockStatus};

/// Queue depth per clock before slow in-process subscribers start lagging.
const UPDATE_QUEUE_CAPACITY: usize = 64;

/// One committed clock mutation, as pushed onto the clock's update queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockUpdate {
    /// Clock the update belongs to.
    pub id: ClockId,
    /// Remaining seconds after the mutation.
    pub value: u64,
    /// Status after the mutation.
    pub status: ClockStatus,
}

/// Live handle to one registered clock.
///
/// The machine mutex is the per-clock critical section: every mutation and the
/// persistence it entails happen while holding it, so updates enter the queue
/// in mutation order.
pub struct ClockEntry {
    machine: Arc<AsyncMutex<ClockStateMachine>>,
    updates: broadcast::Sender<ClockUpdate>,
    dispatcher_rx: Mutex<Option<broadcast::Receiver<ClockUpdate>>>,
    cancel: CancellationToken,
    epoch: AtomicU64,
}

impl ClockEntry {
    fn new(machine: ClockStateMachine) -> Self {
        let (updates, rx) = broadcast::channel(UPDATE_QUEUE_CAPACITY);
        Self {
            machine: Arc::new(AsyncMutex::new(machine)),
            updates,
            dispatcher_rx: Mutex::new(Some(rx)),
            cancel: CancellationToken::new(),
            epoch: AtomicU64::new(0),
        }
    }

    /// The clock's state machine, guarded by the per-clock lock. The mutex is
    /// shared so callers can hold the guard detached from the entry borrow.
    pub fn machine(&self) -> &Arc<AsyncMutex<ClockStateMachine>> {
        &self.machine
    }

    /// Receiver created together with the queue, reserved for the dispatcher
    /// task. Taking it twice yields `None`.
    ///
    /// Because the receiver predates the entry becoming visible, no update can
    /// slip past the dispatcher during registration.
    pub fn take_dispatcher_queue(&self) -> Option<broadcast::Receiver<ClockUpdate>> {
        self.dispatcher_rx
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
    }

    /// Observe the update queue from the side, independent of the dispatcher.
    pub fn subscribe(&self) -> broadcast::Receiver<ClockUpdate> {
        self.updates.subscribe()
    }

    /// Push a committed mutation onto the queue. Lack of subscribers is fine.
    pub fn push_update(&self, update: ClockUpdate) {
        let _ = self.updates.send(update);
    }

    /// Token fired once the clock is evicted from the registry.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Epoch the currently armed decrement loop runs under.
    pub fn loop_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Retire any armed decrement loop and return the epoch a fresh one
    /// should carry. A loop that wakes up under a stale epoch exits.
    pub fn advance_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// All clocks of this process that may currently be ticking.
///
/// Presence in the registry is the process-wide liveness marker: callers treat
/// a miss as "not currently ticking" and fall back to the persisted row.
#[derive(Default)]
pub struct ClockRegistry {
    clocks: DashMap<ClockId, Arc<ClockEntry>>,
}

impl ClockRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the entry for `id`, building one from `seed` when absent.
    ///
    /// The boolean reports whether the entry was created by this call; an
    /// existing entry is returned untouched so a concurrent register never
    /// clobbers a mid-game value.
    pub fn register_with(
        &self,
        id: ClockId,
        seed: impl FnOnce() -> ClockStateMachine,
    ) -> (Arc<ClockEntry>, bool) {
        match self.clocks.entry(id) {
            Entry::Occupied(slot) => (slot.get().clone(), false),
            Entry::Vacant(slot) => {
                let entry = Arc::new(ClockEntry::new(seed()));
                slot.insert(entry.clone());
                (entry, true)
            }
        }
    }

    /// Live entry for `id`, if the clock is registered in this process.
    pub fn get(&self, id: &ClockId) -> Option<Arc<ClockEntry>> {
        self.clocks.get(id).map(|entry| entry.value().clone())
    }

    /// Remove the clock and fire its cancellation token.
    ///
    /// The update queue closes once the last reference drops, so pending items
    /// held by evicted queues are discarded rather than delivered late.
    pub fn evict(&self, id: &ClockId) -> Option<Arc<ClockEntry>> {
        let (_, entry) = self.clocks.remove(id)?;
        entry.cancel.cancel();
        Some(entry)
    }

    /// Number of registered clocks.
    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    /// True when no clock is registered.
    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::state::clock::ClockKind;

    fn id() -> ClockId {
        ClockId::new(Uuid::new_v4(), ClockKind::Game)
    }

    fn machine(value: u64) -> ClockStateMachine {
        ClockStateMachine::new(ClockKind::Game, value, Some(900))
    }

    #[tokio::test]
    async fn register_preserves_the_existing_machine() {
        let registry = ClockRegistry::new();
        let id = id();

        let (first, created) = registry.register_with(id, || machine(321));
        assert!(created);
        let (second, created) = registry.register_with(id, || machine(40));
        assert!(!created);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.machine().lock().await.reading(), 321);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn dispatcher_queue_is_taken_once() {
        let registry = ClockRegistry::new();
        let (entry, _) = registry.register_with(id(), || machine(10));

        assert!(entry.take_dispatcher_queue().is_some());
        assert!(entry.take_dispatcher_queue().is_none());
    }

    #[tokio::test]
    async fn evict_cancels_and_closes_the_queue() {
        let registry = ClockRegistry::new();
        let id = id();
        let (entry, _) = registry.register_with(id, || machine(10));
        let mut updates = entry.subscribe();

        entry.push_update(ClockUpdate {
            id,
            value: 9,
            status: ClockStatus::Running,
        });

        let evicted = registry.evict(&id).unwrap();
        assert!(evicted.cancel_token().is_cancelled());
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());

        // Queued item survives until the last sender reference drops.
        assert_eq!(updates.recv().await.unwrap().value, 9);
        drop(evicted);
        drop(entry);
        assert!(matches!(
            updates.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[test]
    fn epoch_retires_older_loops() {
        let registry = ClockRegistry::new();
        let (entry, _) = registry.register_with(id(), || machine(10));

        let armed = entry.advance_epoch();
        assert_eq!(entry.loop_epoch(), armed);
        let rearmed = entry.advance_epoch();
        assert!(rearmed > armed);
    }
}
