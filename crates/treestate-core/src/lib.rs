#![doc = r"State reconciliation core for declarative component trees."]

pub mod collections;
pub mod component;
pub mod config;
pub mod error;
pub mod global_key;
pub mod key_validator;
pub mod layout;
pub mod platform;
pub mod rebuild;
pub mod state;
pub mod state_handler;
pub mod tree;

pub use component::{
    Component, ComponentBuilder, ComponentContext, ComponentIdentity, ComponentLifecycle,
    ContainerKind, Element, InstanceId, InstanceIdGenerator, StateCapability, StatefulHooks,
};
pub use config::TreeConfig;
pub use error::{
    DuplicateGlobalKeyError, LayoutError, RebuildError, StateTransferError, WorkerUnavailable,
};
pub use global_key::GlobalKey;
pub use key_validator::{global_key_for, validate_global_keys};
pub use layout::{check_size, LaidOutNode, LaidOutTree, LayoutEngine, PassthroughLayout, Size};
pub use platform::{InlineScheduler, WorkerScheduler, WorkerTask};
pub use rebuild::{apply_state, resolve, ResolvedComponent, ResolvedNode, ResolvedTree};
pub use state::{downcast_state, share_state, SharedState, StateContainer, StateUpdate};
pub use state_handler::{ConsumedUpdates, RebuildOutcome, StateHandler, StateMap};
pub use tree::{ComponentTree, ComponentTreeBuilder, MountedTree, RebuildPhase};

#[cfg(test)]
#[path = "tests/tree_tests.rs"]
mod tree_tests;
