//! State containers and the queued updates addressed to them.

use std::any::{self, Any};
use std::fmt;
use std::sync::Arc;

use crate::Component;

/// Per-instance state payload owned by a stateful component.
///
/// Containers are treated as values: an update or a transfer never mutates
/// a container in place, it produces the next one. Any `Send + Sync` type
/// with a `Debug` impl qualifies.
pub trait StateContainer: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;

    fn type_name(&self) -> &'static str;
}

impl<T> StateContainer for T
where
    T: Any + Send + Sync + fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        any::type_name::<T>()
    }
}

/// Shared handle to an immutable state value.
pub type SharedState = Arc<dyn StateContainer>;

/// Wraps a concrete state value in a [`SharedState`].
pub fn share_state<S: StateContainer>(state: S) -> SharedState {
    Arc::new(state)
}

/// Downcasts a shared container to its concrete type.
pub fn downcast_state<S: StateContainer>(state: &SharedState) -> Option<&S> {
    let container: &dyn StateContainer = state.as_ref();
    container.as_any().downcast_ref::<S>()
}

/// Reported when a hook or update receives a container of the wrong type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TypeMismatch {
    pub(crate) expected: &'static str,
    pub(crate) found: &'static str,
}

pub(crate) fn expect_state<S: StateContainer>(
    container: &dyn StateContainer,
) -> Result<&S, TypeMismatch> {
    container
        .as_any()
        .downcast_ref::<S>()
        .ok_or_else(|| TypeMismatch {
            expected: any::type_name::<S>(),
            found: container.type_name(),
        })
}

type UpdateFn =
    dyn Fn(&dyn StateContainer, &Component) -> Result<SharedState, TypeMismatch> + Send + Sync;

/// Queued description of a state mutation.
///
/// An update is a pure function from the current container (and the
/// component it belongs to) to the next container. It is applied exactly
/// once, during the first rebuild that sees it.
#[derive(Clone)]
pub struct StateUpdate {
    label: &'static str,
    apply: Arc<UpdateFn>,
}

impl StateUpdate {
    pub fn new<S, F>(update: F) -> Self
    where
        S: StateContainer,
        F: Fn(&S, &Component) -> S + Send + Sync + 'static,
    {
        Self::labeled("update", update)
    }

    /// Same as [`StateUpdate::new`] with a label used in logs.
    pub fn labeled<S, F>(label: &'static str, update: F) -> Self
    where
        S: StateContainer,
        F: Fn(&S, &Component) -> S + Send + Sync + 'static,
    {
        Self {
            label,
            apply: Arc::new(
                move |container: &dyn StateContainer, component: &Component| {
                    let current = expect_state::<S>(container)?;
                    Ok(share_state(update(current, component)))
                },
            ),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub(crate) fn apply(
        &self,
        container: &SharedState,
        component: &Component,
    ) -> Result<SharedState, TypeMismatch> {
        (self.apply)(container.as_ref(), component)
    }
}

impl fmt::Debug for StateUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateUpdate")
            .field("label", &self.label)
            .finish()
    }
}
