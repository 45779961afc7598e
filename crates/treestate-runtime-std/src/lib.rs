//! Standard worker services backed by Rust's `std` threads.
//!
//! This crate provides a concrete [`WorkerScheduler`] for `treestate-core`:
//! [`StdScheduler`] owns one dedicated thread that drains posted tasks in
//! FIFO order. [`StdRuntime`] bundles it with a [`ComponentContext`] so that
//! trees built from one runtime share their worker and instance ids.

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use treestate_core::{
    Component, ComponentContext, ComponentTree, ComponentTreeBuilder, WorkerScheduler, WorkerTask,
    WorkerUnavailable,
};

enum Message {
    Run(WorkerTask),
    Flush(Sender<()>),
    Stop,
}

/// Scheduler that runs every task on one dedicated worker thread.
pub struct StdScheduler {
    sender: Sender<Message>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    executed: Arc<AtomicUsize>,
}

impl StdScheduler {
    pub fn new() -> io::Result<Self> {
        Self::with_name("treestate-worker")
    }

    /// Spawns the worker thread under `name`.
    pub fn with_name(name: &str) -> io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let executed = Arc::new(AtomicUsize::new(0));
        let worker = {
            let executed = Arc::clone(&executed);
            thread::Builder::new()
                .name(name.to_owned())
                .spawn(move || worker_loop(receiver, executed))?
        };
        Ok(Self {
            sender,
            worker_id: worker.thread().id(),
            worker: Mutex::new(Some(worker)),
            executed,
        })
    }

    /// Number of tasks the worker has finished.
    pub fn executed_tasks(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Blocks until every task posted before this call has run.
    ///
    /// Tasks posted by those tasks may still be queued afterwards. Returns
    /// immediately when called on the worker itself or after shutdown.
    pub fn flush(&self) {
        if self.is_worker_thread() {
            return;
        }
        let (done, wait) = crossbeam_channel::bounded(1);
        if self.sender.send(Message::Flush(done)).is_err() {
            return;
        }
        let _ = wait.recv();
    }

    /// Stops the worker after the tasks already queued and joins it.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _ = self.sender.send(Message::Stop);
        if self.is_worker_thread() {
            return;
        }
        if worker.join().is_err() {
            log::error!("worker thread panicked during shutdown");
        }
    }
}

fn worker_loop(receiver: Receiver<Message>, executed: Arc<AtomicUsize>) {
    for message in receiver.iter() {
        match message {
            Message::Run(task) => {
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    log::error!("worker task panicked");
                }
                executed.fetch_add(1, Ordering::SeqCst);
            }
            Message::Flush(done) => {
                let _ = done.send(());
            }
            Message::Stop => break,
        }
    }
    log::debug!("worker loop exited");
}

impl Drop for StdScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field("queued", &self.sender.len())
            .field("executed", &self.executed_tasks())
            .field("running", &self.worker.lock().is_some())
            .finish()
    }
}

impl WorkerScheduler for StdScheduler {
    fn post_to_worker(&self, task: WorkerTask) -> Result<(), WorkerUnavailable> {
        self.sender.send(Message::Run(task)).map_err(|_| {
            log::warn!("worker has shut down; dropping task");
            WorkerUnavailable
        })
    }
}

/// Convenience container bundling the standard scheduler and an id context.
#[derive(Clone)]
pub struct StdRuntime {
    scheduler: Arc<StdScheduler>,
    context: ComponentContext,
}

impl StdRuntime {
    /// Starts the worker thread.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            scheduler: Arc::new(StdScheduler::new()?),
            context: ComponentContext::new(),
        })
    }

    pub fn context(&self) -> &ComponentContext {
        &self.context
    }

    pub fn scheduler(&self) -> Arc<StdScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Tree builder that rebuilds on this runtime's worker.
    pub fn tree_builder(&self, root: Component) -> ComponentTreeBuilder {
        ComponentTree::builder(&self.context, root).scheduler(self.scheduler.clone())
    }

    /// Waits until the worker has drained, including rebuilds scheduled as
    /// follow-ups of the ones already queued.
    pub fn wait_for_idle(&self) {
        loop {
            let before = self.scheduler.executed_tasks();
            self.scheduler.flush();
            if self.scheduler.sender.is_empty() && self.scheduler.executed_tasks() == before {
                break;
            }
        }
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .field("issued_ids", &self.context.id_generator().issued())
            .finish()
    }
}
