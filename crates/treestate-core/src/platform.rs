//! Platform abstraction for the worker that runs rebuilds.
//!
//! A component tree never spawns threads itself. It hands rebuild work to a
//! [`WorkerScheduler`] supplied by the host, so the same tree can run on a
//! dedicated thread, an event loop, or a manually pumped queue in tests.

use crate::WorkerUnavailable;

pub type WorkerTask = Box<dyn FnOnce() + Send + 'static>;

/// Executes rebuild work for component trees.
///
/// Implementations run posted tasks one at a time, in the order they were
/// posted, on a single worker. They must be safe to use from multiple threads.
pub trait WorkerScheduler: Send + Sync {
    /// Schedule `task` to run later on the worker.
    ///
    /// Returns [`WorkerUnavailable`] when the task was dropped without being
    /// queued.
    fn post_to_worker(&self, task: WorkerTask) -> Result<(), WorkerUnavailable>;
}

/// Runs every task immediately on the posting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineScheduler;

impl WorkerScheduler for InlineScheduler {
    fn post_to_worker(&self, task: WorkerTask) -> Result<(), WorkerUnavailable> {
        task();
        Ok(())
    }
}
