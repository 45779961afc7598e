//! Testing utilities and harness for treestate

pub mod fixtures;
pub mod layouts;
pub mod looper;
pub mod rule;

pub use fixtures::*;
pub use layouts::{FailingLayout, RecordingLayout};
pub use looper::LooperScheduler;
pub use rule::TreeTestRule;

pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::layouts::{FailingLayout, RecordingLayout};
    pub use crate::looper::LooperScheduler;
    pub use crate::rule::TreeTestRule;
    pub use crate::init_logging;
}

/// Installs `env_logger` once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
