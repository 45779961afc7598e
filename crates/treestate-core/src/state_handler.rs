//! Committed state and pending updates of one component tree.
//!
//! A [`StateHandler`] is never shared between rebuilds. A rebuild works on a
//! handler acquired from the current one ([`StateHandler::acquire_for_rebuild`]),
//! and a successful rebuild replaces the tree's handler with a successor that
//! holds the freshly committed state plus every update the rebuild did not
//! consume. Failed rebuilds simply drop their handler.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::collections::map::HashMap;
use crate::state::{SharedState, StateContainer, StateUpdate};
use crate::{Component, GlobalKey, StateCapability, StateTransferError};

pub type StateMap = HashMap<GlobalKey, SharedState>;

type PendingQueue = IndexMap<GlobalKey, Vec<StateUpdate>>;

/// Number of updates a rebuild removed from the front of each key's queue.
#[derive(Debug, Default, Clone)]
pub struct ConsumedUpdates {
    counts: HashMap<GlobalKey, usize>,
}

impl ConsumedUpdates {
    fn record(&mut self, key: &GlobalKey, count: usize) {
        *self.counts.entry(key.clone()).or_insert(0) += count;
    }

    pub fn get(&self, key: &str) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = (&GlobalKey, usize)> {
        self.counts.iter().map(|(key, count)| (key, *count))
    }
}

/// Result of the state phase of a rebuild, ready to be committed.
#[derive(Debug, Default)]
pub struct RebuildOutcome {
    pub committed: StateMap,
    pub consumed: ConsumedUpdates,
    /// Updates the rebuild saw for keys that no component resolved to.
    pub unmatched: ConsumedUpdates,
}

pub struct StateHandler {
    committed: StateMap,
    previous: StateMap,
    pending: Mutex<PendingQueue>,
    consumed: ConsumedUpdates,
}

impl StateHandler {
    pub fn new() -> Self {
        Self {
            committed: StateMap::default(),
            previous: StateMap::default(),
            pending: Mutex::new(PendingQueue::new()),
            consumed: ConsumedUpdates::default(),
        }
    }

    /// Handler for one rebuild pass: sees the committed state of `current`
    /// as previous state and works on a snapshot of its pending updates.
    pub fn acquire_for_rebuild(current: &StateHandler) -> Self {
        Self {
            committed: StateMap::default(),
            previous: current.committed.clone(),
            pending: Mutex::new(current.pending.lock().clone()),
            consumed: ConsumedUpdates::default(),
        }
    }

    /// Appends `update` to the queue of `key`. Safe to call from any thread.
    pub fn enqueue_update(&self, key: GlobalKey, update: StateUpdate) {
        let mut pending = self.pending.lock();
        log::trace!("enqueue {} for `{key}`", update.label());
        pending.entry(key).or_default().push(update);
    }

    pub fn pending_update_count(&self, key: &str) -> usize {
        self.pending
            .lock()
            .get(key)
            .map(|queue| queue.len())
            .unwrap_or(0)
    }

    pub fn has_pending_updates(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Drops every queued update for `key` and returns how many there were.
    pub fn clear_pending(&self, key: &str) -> usize {
        let removed = self
            .pending
            .lock()
            .shift_remove(key)
            .map(|queue| queue.len())
            .unwrap_or(0);
        if removed > 0 {
            log::debug!("discarded {removed} pending update(s) for `{key}`");
        }
        removed
    }

    /// Keys with queued updates, in first-enqueue order.
    pub fn pending_keys(&self) -> Vec<GlobalKey> {
        self.pending.lock().keys().cloned().collect()
    }

    pub fn committed_state(&self, key: &str) -> Option<&SharedState> {
        self.committed.get(key)
    }

    pub fn committed_keys(&self) -> impl Iterator<Item = &GlobalKey> {
        self.committed.keys()
    }

    pub fn committed_len(&self) -> usize {
        self.committed.len()
    }

    /// State committed for `key` before the current rebuild started.
    pub fn previous_state(&self, key: &str) -> Option<&SharedState> {
        self.previous.get(key)
    }

    /// Returns the container recorded for `key`, creating it with `factory`
    /// the first time the key is seen.
    pub fn get_or_create_state(
        &mut self,
        key: &GlobalKey,
        component: &Component,
        factory: impl FnOnce(&Component) -> SharedState,
    ) -> SharedState {
        if let Some(existing) = self.committed.get(key) {
            return Arc::clone(existing);
        }
        let state = factory(component);
        log::trace!("created initial state for `{key}`: {state:?}");
        self.committed.insert(key.clone(), Arc::clone(&state));
        state
    }

    /// Copies `previous` into a fresh container for `component`.
    pub fn transfer_state(
        &self,
        key: &GlobalKey,
        previous: &dyn StateContainer,
        component: &Component,
    ) -> Result<SharedState, StateTransferError> {
        match component.lifecycle().capability() {
            StateCapability::Stateless => Err(StateTransferError::NotStateful {
                key: key.clone(),
                component: component.identity(),
            }),
            StateCapability::Stateful(hooks) => hooks
                .transfer_state(previous, component)
                .map_err(|mismatch| StateTransferError::ContainerMismatch {
                    key: key.clone(),
                    expected: mismatch.expected,
                    found: mismatch.found,
                }),
        }
    }

    /// Applies every queued update for `key` in FIFO order and clears the queue.
    pub fn apply_and_clear_pending(
        &mut self,
        key: &GlobalKey,
        container: SharedState,
        component: &Component,
    ) -> Result<SharedState, StateTransferError> {
        let Some(updates) = self.pending.lock().shift_remove(key) else {
            return Ok(container);
        };
        let mut current = container;
        for update in &updates {
            current = update.apply(&current, component).map_err(|mismatch| {
                StateTransferError::ContainerMismatch {
                    key: key.clone(),
                    expected: mismatch.expected,
                    found: mismatch.found,
                }
            })?;
            log::trace!("applied {} to `{key}`: {current:?}", update.label());
        }
        self.consumed.record(key, updates.len());
        Ok(current)
    }

    /// Records the final container of `key` for this rebuild.
    pub fn record_state(&mut self, key: GlobalKey, state: SharedState) {
        self.committed.insert(key, state);
    }

    /// Replaces the committed map. Keys missing from `committed` are gone.
    pub fn commit(&mut self, committed: StateMap) {
        self.committed = committed;
        self.previous = StateMap::default();
    }

    pub fn into_outcome(self) -> RebuildOutcome {
        let mut unmatched = ConsumedUpdates::default();
        for (key, queue) in self.pending.into_inner() {
            unmatched.record(&key, queue.len());
        }
        RebuildOutcome {
            committed: self.committed,
            consumed: self.consumed,
            unmatched,
        }
    }

    /// Handler that replaces `self` once `outcome` is committed.
    ///
    /// Keeps every pending update that the rebuild did not apply, including
    /// those enqueued while it was running. Unmatched updates are dropped
    /// only when `prune_unmatched` is set.
    pub fn successor(&self, outcome: RebuildOutcome, prune_unmatched: bool) -> StateHandler {
        let mut pending = std::mem::take(&mut *self.pending.lock());
        let mut drop_front = |key: &GlobalKey, count: usize| {
            if let Some(queue) = pending.get_mut(key) {
                queue.drain(..count.min(queue.len()));
                if queue.is_empty() {
                    pending.shift_remove(key);
                }
            }
        };
        for (key, count) in outcome.consumed.iter() {
            drop_front(key, count);
        }
        if prune_unmatched {
            for (key, count) in outcome.unmatched.iter() {
                log::debug!("dropping {count} unmatched update(s) for `{key}`");
                drop_front(key, count);
            }
        }
        let mut next = StateHandler {
            committed: StateMap::default(),
            previous: StateMap::default(),
            pending: Mutex::new(pending),
            consumed: ConsumedUpdates::default(),
        };
        next.commit(outcome.committed);
        next
    }
}

impl Default for StateHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateHandler")
            .field("committed", &self.committed.len())
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{downcast_state, share_state};
    use crate::{ComponentContext, ComponentLifecycle};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    struct Log(Vec<u32>);

    fn log_component() -> (Component, GlobalKey) {
        let context = ComponentContext::new();
        let lifecycle = ComponentLifecycle::stateful(1, "Log", |_| Log(Vec::new())).build();
        (Component::new(&context, &lifecycle), GlobalKey::root("1"))
    }

    fn push(value: u32) -> StateUpdate {
        StateUpdate::new(move |log: &Log, _| {
            let mut next = log.clone();
            next.0.push(value);
            next
        })
    }

    fn values(state: &SharedState) -> Vec<u32> {
        downcast_state::<Log>(state).expect("log state").0.clone()
    }

    #[test]
    fn get_or_create_state_invokes_factory_once() {
        let (component, key) = log_component();
        let mut handler = StateHandler::new();
        let calls = AtomicUsize::new(0);
        let factory = |_: &Component| {
            calls.fetch_add(1, Ordering::SeqCst);
            share_state(Log(vec![4]))
        };
        let first = handler.get_or_create_state(&key, &component, factory);
        let second = handler.get_or_create_state(&key, &component, factory);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pending_updates_apply_in_fifo_order_then_clear() {
        let (component, key) = log_component();
        let mut handler = StateHandler::new();
        handler.enqueue_update(key.clone(), push(1));
        handler.enqueue_update(key.clone(), push(2));
        handler.enqueue_update(key.clone(), push(3));
        assert_eq!(handler.pending_update_count("1"), 3);

        let result = handler
            .apply_and_clear_pending(&key, share_state(Log(Vec::new())), &component)
            .expect("updates apply");
        assert_eq!(values(&result), vec![1, 2, 3]);
        assert_eq!(handler.pending_update_count("1"), 0);
        assert_eq!(handler.consumed.get("1"), 3);
    }

    #[test]
    fn apply_without_pending_returns_container_unchanged() {
        let (component, key) = log_component();
        let mut handler = StateHandler::new();
        let container = share_state(Log(vec![9]));
        let result = handler
            .apply_and_clear_pending(&key, Arc::clone(&container), &component)
            .expect("nothing to apply");
        assert!(Arc::ptr_eq(&container, &result));
    }

    #[test]
    fn transfer_to_stateless_component_fails() {
        let context = ComponentContext::new();
        let lifecycle = ComponentLifecycle::stateless(2, "Label").build();
        let component = Component::new(&context, &lifecycle);
        let handler = StateHandler::new();
        let key = GlobalKey::root("2");
        let err = handler
            .transfer_state(&key, &Log(Vec::new()), &component)
            .expect_err("stateless transfer must fail");
        assert!(matches!(err, StateTransferError::NotStateful { .. }));
    }

    #[test]
    fn transfer_with_wrong_container_type_fails() {
        let (component, key) = log_component();
        let handler = StateHandler::new();
        let err = handler
            .transfer_state(&key, &17u64, &component)
            .expect_err("mismatched container must fail");
        assert!(matches!(err, StateTransferError::ContainerMismatch { .. }));
    }

    #[test]
    fn update_for_wrong_container_type_is_a_transfer_error() {
        let (component, key) = log_component();
        let mut handler = StateHandler::new();
        handler.enqueue_update(key.clone(), StateUpdate::new(|value: &u64, _| value + 1));
        let err = handler
            .apply_and_clear_pending(&key, share_state(Log(Vec::new())), &component)
            .expect_err("update expects another container type");
        assert!(matches!(err, StateTransferError::ContainerMismatch { .. }));
    }

    #[test]
    fn successor_keeps_updates_enqueued_during_rebuild() {
        let (component, key) = log_component();
        let current = StateHandler::new();
        current.enqueue_update(key.clone(), push(1));

        let mut pass = StateHandler::acquire_for_rebuild(&current);
        current.enqueue_update(key.clone(), push(2));

        let seed = pass.get_or_create_state(&key, &component, |_| share_state(Log(Vec::new())));
        let state = pass
            .apply_and_clear_pending(&key, seed, &component)
            .expect("updates apply");
        pass.record_state(key.clone(), state);

        let next = current.successor(pass.into_outcome(), false);
        assert_eq!(next.pending_update_count("1"), 1);
        let committed = next.committed_state("1").expect("committed state");
        assert_eq!(values(committed), vec![1]);
    }

    #[test]
    fn clear_pending_drops_only_that_key() {
        let handler = StateHandler::new();
        handler.enqueue_update(GlobalKey::from("1"), push(1));
        handler.enqueue_update(GlobalKey::from("1"), push(2));
        handler.enqueue_update(GlobalKey::from("2"), push(3));

        assert_eq!(handler.clear_pending("1"), 2);
        assert_eq!(handler.clear_pending("1"), 0);
        assert_eq!(handler.pending_update_count("2"), 1);
        assert_eq!(handler.pending_keys(), vec![GlobalKey::from("2")]);
    }

    #[test]
    fn commit_prunes_keys_missing_from_new_snapshot() {
        let mut handler = StateHandler::new();
        let mut first = StateMap::default();
        first.insert(GlobalKey::from("1"), share_state(Log(Vec::new())));
        first.insert(GlobalKey::from("1,2"), share_state(Log(Vec::new())));
        handler.commit(first);
        assert_eq!(handler.committed_len(), 2);

        let mut second = StateMap::default();
        second.insert(GlobalKey::from("1"), share_state(Log(Vec::new())));
        handler.commit(second);
        assert!(handler.committed_state("1,2").is_none());
        assert_eq!(handler.committed_len(), 1);
    }

    #[test]
    fn unmatched_updates_are_retained_unless_pruned() {
        let current = StateHandler::new();
        current.enqueue_update(GlobalKey::from("gone"), push(1));

        let retained = current.successor(
            StateHandler::acquire_for_rebuild(&current).into_outcome(),
            false,
        );
        assert_eq!(retained.pending_update_count("gone"), 1);

        let pruned = retained.successor(
            StateHandler::acquire_for_rebuild(&retained).into_outcome(),
            true,
        );
        assert_eq!(pruned.pending_update_count("gone"), 0);
    }

    #[test]
    fn concurrent_enqueues_keep_per_caller_order() {
        let (component, key) = log_component();
        let mut handler = StateHandler::new();
        std::thread::scope(|scope| {
            for thread in 0..4u32 {
                let handler = &handler;
                let key = key.clone();
                scope.spawn(move || {
                    for step in 0..50u32 {
                        handler.enqueue_update(key.clone(), push(thread * 1000 + step));
                    }
                });
            }
        });
        assert_eq!(handler.pending_update_count("1"), 200);

        let result = handler
            .apply_and_clear_pending(&key, share_state(Log(Vec::new())), &component)
            .expect("updates apply");
        let applied = values(&result);
        for thread in 0..4u32 {
            let steps: Vec<u32> = applied
                .iter()
                .filter(|value| *value / 1000 == thread)
                .map(|value| value % 1000)
                .collect();
            assert_eq!(steps, (0..50).collect::<Vec<_>>());
        }
    }
}
