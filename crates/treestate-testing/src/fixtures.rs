//! Component types shared by tests.

use std::sync::Arc;

use treestate_core::{Component, ComponentContext, ComponentLifecycle, Element, StateUpdate};

pub const INITIAL_COUNT: i32 = 4;
pub const ROOT_TYPE_ID: u32 = 100;
pub const COUNTER_TYPE_ID: u32 = 1;
pub const LABEL_TYPE_ID: u32 = 2;

/// Global key of an unkeyed counter placed directly under the root.
pub const COUNTER_KEY: &str = "100,1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterState {
    pub count: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterProps {
    pub start: i32,
}

/// Stateful counter. Starts at `CounterProps::start`, or [`INITIAL_COUNT`]
/// without props.
pub fn counter_type() -> Arc<ComponentLifecycle> {
    ComponentLifecycle::stateful(COUNTER_TYPE_ID, "Counter", |component: &Component| {
        CounterState {
            count: component
                .props::<CounterProps>()
                .map(|props| props.start)
                .unwrap_or(INITIAL_COUNT),
        }
    })
    .build()
}

pub fn label_type() -> Arc<ComponentLifecycle> {
    ComponentLifecycle::stateless(LABEL_TYPE_ID, "Label").build()
}

pub fn root_type() -> Arc<ComponentLifecycle> {
    ComponentLifecycle::stateless(ROOT_TYPE_ID, "Root").build()
}

pub fn increment() -> StateUpdate {
    add(1)
}

pub fn add(delta: i32) -> StateUpdate {
    StateUpdate::labeled("add", move |state: &CounterState, _: &Component| {
        CounterState {
            count: state.count + delta,
        }
    })
}

/// Replaces the count, recording the previous value in `log`.
pub fn record_and_set(log: Arc<parking_lot::Mutex<Vec<i32>>>, value: i32) -> StateUpdate {
    StateUpdate::labeled("record_and_set", move |state: &CounterState, _: &Component| {
        log.lock().push(state.count);
        CounterState { count: value }
    })
}

pub fn counter(context: &ComponentContext) -> Component {
    Component::new(context, &counter_type())
}

pub fn keyed_counter(context: &ComponentContext, key: &str) -> Component {
    Component::builder(context, &counter_type()).key(key).build()
}

/// Root with a single stateful counter at [`COUNTER_KEY`].
pub fn single_counter_tree(context: &ComponentContext) -> Component {
    Component::builder(context, &root_type())
        .child(counter(context))
        .build()
}

/// Root with one column of keyed counters.
pub fn keyed_counters_tree(context: &ComponentContext, keys: &[&str]) -> Component {
    Component::builder(context, &root_type())
        .child(Element::column(
            keys.iter()
                .map(|key| Element::from(keyed_counter(context, key))),
        ))
        .build()
}
