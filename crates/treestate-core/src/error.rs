//! Error kinds raised while rebuilding a component tree.

use thiserror::Error;

use crate::{ComponentIdentity, GlobalKey};

/// Two components of one tree resolved to the same global key.
///
/// When the same component object is attached twice, `first` and `second`
/// carry the same instance id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("duplicate global key `{key}`: {second} collides with {first}")]
pub struct DuplicateGlobalKeyError {
    pub key: GlobalKey,
    pub first: ComponentIdentity,
    pub second: ComponentIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateTransferError {
    #[error("component {component} at `{key}` has no state to transfer")]
    NotStateful {
        key: GlobalKey,
        component: ComponentIdentity,
    },

    #[error("state container at `{key}` is {found}, expected {expected}")]
    ContainerMismatch {
        key: GlobalKey,
        expected: &'static str,
        found: &'static str,
    },
}

/// Failure reported by the layout collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("invalid layout size {width}x{height}")]
    InvalidSize { width: f32, height: f32 },

    #[error("layout failed: {0}")]
    Failed(String),
}

/// The worker scheduler refused a task, usually because it shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("worker is not accepting tasks")]
pub struct WorkerUnavailable;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RebuildError {
    #[error(transparent)]
    DuplicateGlobalKey(#[from] DuplicateGlobalKeyError),

    #[error(transparent)]
    StateTransfer(#[from] StateTransferError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Worker(#[from] WorkerUnavailable),

    /// A state update or the layout engine panicked during a scheduled rebuild.
    #[error("rebuild panicked: {0}")]
    Panicked(String),

    #[error("component tree has been released")]
    Released,
}
