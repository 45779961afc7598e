use std::collections::VecDeque;

use parking_lot::Mutex;
use treestate_core::{WorkerScheduler, WorkerTask, WorkerUnavailable};

/// Worker queue that only runs when pumped.
///
/// Stands in for a dedicated worker looper: posted tasks wait until the test
/// calls [`LooperScheduler::run_one_task`] or [`LooperScheduler::run_to_idle`],
/// which makes the gap between an enqueue and its rebuild observable.
#[derive(Default)]
pub struct LooperScheduler {
    tasks: Mutex<VecDeque<WorkerTask>>,
    executed: Mutex<usize>,
}

impl LooperScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn has_pending_tasks(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    /// Total number of tasks run so far.
    pub fn executed_tasks(&self) -> usize {
        *self.executed.lock()
    }

    /// Runs the oldest queued task. Returns `false` when the queue was empty.
    pub fn run_one_task(&self) -> bool {
        // The lock is released before running so tasks may post more work.
        let task = self.tasks.lock().pop_front();
        match task {
            Some(task) => {
                task();
                *self.executed.lock() += 1;
                true
            }
            None => false,
        }
    }

    /// Runs tasks, including those posted while running, until none are left.
    pub fn run_to_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_one_task() {
            ran += 1;
        }
        log::trace!("looper idle after {ran} task(s)");
        ran
    }
}

impl WorkerScheduler for LooperScheduler {
    fn post_to_worker(&self, task: WorkerTask) -> Result<(), WorkerUnavailable> {
        self.tasks.lock().push_back(task);
        Ok(())
    }
}

impl std::fmt::Debug for LooperScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LooperScheduler")
            .field("pending_tasks", &self.pending_tasks())
            .field("executed_tasks", &self.executed_tasks())
            .finish()
    }
}
