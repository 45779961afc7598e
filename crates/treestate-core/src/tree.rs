//! The tree owner.
//!
//! A [`ComponentTree`] holds the current [`StateHandler`], accepts state
//! updates from any thread and drives rebuilds on its worker. At most one
//! rebuild runs at a time; updates that arrive while one is scheduled are
//! batched into it, updates that arrive while one is running go into the next.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use crate::layout::{LaidOutTree, LayoutEngine, PassthroughLayout, Size};
use crate::platform::{InlineScheduler, WorkerScheduler};
use crate::rebuild::{self, ResolvedTree};
use crate::state::{downcast_state, SharedState, StateContainer, StateUpdate};
use crate::state_handler::{RebuildOutcome, StateHandler};
use crate::{Component, ComponentContext, GlobalKey, RebuildError, TreeConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildPhase {
    Idle,
    Scheduled,
    Running,
    Committed,
}

struct PhaseState {
    phase: RebuildPhase,
    follow_up: bool,
}

/// Result of the most recent successful rebuild.
#[derive(Debug)]
pub struct MountedTree {
    generation: u64,
    resolved: ResolvedTree,
    layout: LaidOutTree,
    instances: IndexMap<GlobalKey, Component>,
}

impl MountedTree {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn resolved(&self) -> &ResolvedTree {
        &self.resolved
    }

    pub fn layout(&self) -> &LaidOutTree {
        &self.layout
    }

    /// Latest instance resolved for `key`.
    pub fn instance(&self, key: &str) -> Option<&Component> {
        self.instances.get(key)
    }

    pub fn instances(&self) -> impl Iterator<Item = (&GlobalKey, &Component)> {
        self.instances.iter()
    }
}

struct TreeInputs {
    root: Component,
    size: Option<Size>,
}

struct TreeInner {
    context: ComponentContext,
    config: TreeConfig,
    scheduler: Arc<dyn WorkerScheduler>,
    layout: Arc<dyn LayoutEngine>,
    state_handler: RwLock<Arc<StateHandler>>,
    inputs: Mutex<TreeInputs>,
    mounted: RwLock<Option<Arc<MountedTree>>>,
    phase: Mutex<PhaseState>,
    rebuild_lock: Mutex<()>,
    last_error: Mutex<Option<RebuildError>>,
    generation: AtomicU64,
    released: AtomicBool,
}

impl TreeInner {
    fn schedule_rebuild(self: &Arc<Self>) {
        let post = {
            let mut state = self.phase.lock();
            match state.phase {
                RebuildPhase::Idle => {
                    state.phase = RebuildPhase::Scheduled;
                    true
                }
                RebuildPhase::Scheduled => {
                    log::trace!("rebuild already scheduled; coalescing");
                    false
                }
                RebuildPhase::Running | RebuildPhase::Committed => {
                    state.follow_up = true;
                    false
                }
            }
        };
        if post {
            self.post_rebuild();
        }
    }

    fn post_rebuild(self: &Arc<Self>) {
        log::debug!("posting rebuild to worker");
        let tree = Arc::downgrade(self);
        let posted = self.scheduler.post_to_worker(Box::new(move || {
            if let Some(tree) = tree.upgrade() {
                tree.run_scheduled_rebuild();
            }
        }));
        if let Err(err) = posted {
            log::warn!("rebuild not scheduled: {err}");
            {
                let mut state = self.phase.lock();
                state.phase = RebuildPhase::Idle;
                state.follow_up = false;
            }
            *self.last_error.lock() = Some(err.into());
        }
    }

    fn run_scheduled_rebuild(self: &Arc<Self>) {
        self.phase.lock().phase = RebuildPhase::Running;
        // Locks are not poisoned by an unwinding rebuild, so the phase can
        // always be reset below.
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.rebuild(true)))
            .unwrap_or_else(|payload| Err(RebuildError::Panicked(panic_message(&*payload))));
        match result {
            Ok(()) => {}
            Err(RebuildError::Released) => log::debug!("skipping rebuild of released tree"),
            Err(err) => {
                log::error!("rebuild failed: {err}");
                *self.last_error.lock() = Some(err);
            }
        }
        let follow_up = {
            let mut state = self.phase.lock();
            if state.follow_up {
                state.follow_up = false;
                state.phase = RebuildPhase::Scheduled;
                true
            } else {
                state.phase = RebuildPhase::Idle;
                false
            }
        };
        if follow_up {
            self.post_rebuild();
        }
    }

    fn rebuild(&self, scheduled: bool) -> Result<(), RebuildError> {
        let _guard = self.rebuild_lock.lock();
        if self.released.load(Ordering::Acquire) {
            return Err(RebuildError::Released);
        }
        let (root, size) = {
            let inputs = self.inputs.lock();
            (inputs.root.clone(), inputs.size)
        };
        let Some(size) = size else {
            log::debug!("skipping rebuild: no size set");
            return Ok(());
        };

        let mut tree = rebuild::resolve(&root, &self.context)?;
        let current = Arc::clone(&*self.state_handler.read());
        let mut pass = StateHandler::acquire_for_rebuild(&current);
        rebuild::apply_state(&mut tree, &mut pass)?;
        let layout = self.layout.run_layout(&tree, size)?;
        self.commit(pass.into_outcome(), tree, layout, scheduled);
        Ok(())
    }

    fn commit(
        &self,
        outcome: RebuildOutcome,
        tree: ResolvedTree,
        layout: LaidOutTree,
        scheduled: bool,
    ) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let applied = outcome.consumed.total();
        let committed = outcome.committed.len();
        {
            let mut slot = self.state_handler.write();
            let next = slot.successor(outcome, self.config.prune_orphaned_updates);
            *slot = Arc::new(next);
        }
        let instances = tree.instance_table();
        *self.mounted.write() = Some(Arc::new(MountedTree {
            generation,
            resolved: tree,
            layout,
            instances,
        }));
        if scheduled {
            self.phase.lock().phase = RebuildPhase::Committed;
        }
        log::debug!(
            "committed generation {generation}: {committed} state container(s), {applied} update(s) applied"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Owner of one component tree and its state.
#[derive(Clone)]
pub struct ComponentTree {
    inner: Arc<TreeInner>,
}

impl ComponentTree {
    pub fn builder(context: &ComponentContext, root: Component) -> ComponentTreeBuilder {
        ComponentTreeBuilder {
            context: context.clone(),
            root,
            scheduler: None,
            layout: None,
            size: None,
            config: TreeConfig::default(),
        }
    }

    /// Queues `update` for the component at `key` and schedules a rebuild.
    ///
    /// Never blocks on the rebuild. An update for a key with no live
    /// component stays queued (see [`TreeConfig::prune_orphaned_updates`]).
    pub fn update_state_async(&self, key: impl Into<GlobalKey>, update: StateUpdate) {
        if self.inner.released.load(Ordering::Acquire) {
            log::warn!("dropping {} for released tree", update.label());
            return;
        }
        self.inner
            .state_handler
            .read()
            .enqueue_update(key.into(), update);
        self.inner.schedule_rebuild();
    }

    /// Queues `update` and rebuilds on the calling thread.
    pub fn update_state_sync(
        &self,
        key: impl Into<GlobalKey>,
        update: StateUpdate,
    ) -> Result<(), RebuildError> {
        if self.inner.released.load(Ordering::Acquire) {
            return Err(RebuildError::Released);
        }
        self.inner
            .state_handler
            .read()
            .enqueue_update(key.into(), update);
        self.inner.rebuild(false)
    }

    /// Sets the size constraint and rebuilds on the calling thread.
    pub fn set_size(&self, size: Size) -> Result<(), RebuildError> {
        self.inner.inputs.lock().size = Some(size);
        self.inner.rebuild(false)
    }

    pub fn set_size_async(&self, size: Size) {
        self.inner.inputs.lock().size = Some(size);
        self.inner.schedule_rebuild();
    }

    /// Replaces the root description and rebuilds on the calling thread.
    pub fn set_root(&self, root: Component) -> Result<(), RebuildError> {
        self.inner.inputs.lock().root = root;
        self.inner.rebuild(false)
    }

    pub fn set_root_async(&self, root: Component) {
        self.inner.inputs.lock().root = root;
        self.inner.schedule_rebuild();
    }

    pub fn committed_state(&self, key: &str) -> Option<SharedState> {
        self.inner.state_handler.read().committed_state(key).cloned()
    }

    pub fn committed_state_as<S: StateContainer + Clone>(&self, key: &str) -> Option<S> {
        self.committed_state(key)
            .and_then(|state| downcast_state::<S>(&state).cloned())
    }

    pub fn committed_keys(&self) -> Vec<GlobalKey> {
        self.inner
            .state_handler
            .read()
            .committed_keys()
            .cloned()
            .collect()
    }

    pub fn pending_update_count(&self, key: &str) -> usize {
        self.inner.state_handler.read().pending_update_count(key)
    }

    /// Discards every queued update for `key` and returns how many there were.
    ///
    /// Recovers a tree whose rebuilds keep failing on one bad update. Waits
    /// for a running rebuild to finish, so it must not be called from a state
    /// update or layout pass.
    pub fn clear_pending_updates(&self, key: &str) -> usize {
        let _guard = self.inner.rebuild_lock.lock();
        self.inner.state_handler.read().clear_pending(key)
    }

    pub fn has_pending_updates(&self) -> bool {
        self.inner.state_handler.read().has_pending_updates()
    }

    /// Latest instance committed for `key`.
    pub fn current_instance(&self, key: &str) -> Option<Component> {
        self.mounted()
            .and_then(|mounted| mounted.instance(key).map(Component::make_shallow_copy))
    }

    pub fn mounted(&self) -> Option<Arc<MountedTree>> {
        self.inner.mounted.read().clone()
    }

    pub fn laid_out_tree(&self) -> Option<LaidOutTree> {
        self.mounted().map(|mounted| mounted.layout().clone())
    }

    /// Number of rebuilds committed so far.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> RebuildPhase {
        self.inner.phase.lock().phase
    }

    /// Error of the last failed or unschedulable rebuild, if not yet taken.
    pub fn take_rebuild_error(&self) -> Option<RebuildError> {
        self.inner.last_error.lock().take()
    }

    pub fn root(&self) -> Component {
        self.inner.inputs.lock().root.clone()
    }

    pub fn size(&self) -> Option<Size> {
        self.inner.inputs.lock().size
    }

    pub fn context(&self) -> &ComponentContext {
        &self.inner.context
    }

    pub fn config(&self) -> TreeConfig {
        self.inner.config
    }

    /// Stops accepting updates. Queued rebuilds become no-ops.
    pub fn release(&self) {
        self.inner.released.store(true, Ordering::Release);
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ComponentTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentTree")
            .field("generation", &self.generation())
            .field("phase", &self.phase())
            .field("state_handler", &*self.inner.state_handler.read())
            .field("released", &self.is_released())
            .finish()
    }
}

pub struct ComponentTreeBuilder {
    context: ComponentContext,
    root: Component,
    scheduler: Option<Arc<dyn WorkerScheduler>>,
    layout: Option<Arc<dyn LayoutEngine>>,
    size: Option<Size>,
    config: TreeConfig,
}

impl ComponentTreeBuilder {
    pub fn scheduler(mut self, scheduler: Arc<dyn WorkerScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn layout_engine(mut self, layout: Arc<dyn LayoutEngine>) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Initial size constraint. No rebuild runs before a size is known.
    pub fn size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    pub fn config(mut self, config: TreeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn prune_orphaned_updates(mut self, prune: bool) -> Self {
        self.config.prune_orphaned_updates = prune;
        self
    }

    pub fn build(self) -> ComponentTree {
        ComponentTree {
            inner: Arc::new(TreeInner {
                context: self.context,
                config: self.config,
                scheduler: self.scheduler.unwrap_or_else(|| Arc::new(InlineScheduler)),
                layout: self.layout.unwrap_or_else(|| Arc::new(PassthroughLayout)),
                state_handler: RwLock::new(Arc::new(StateHandler::new())),
                inputs: Mutex::new(TreeInputs {
                    root: self.root,
                    size: self.size,
                }),
                mounted: RwLock::new(None),
                phase: Mutex::new(PhaseState {
                    phase: RebuildPhase::Idle,
                    follow_up: false,
                }),
                rebuild_lock: Mutex::new(()),
                last_error: Mutex::new(None),
                generation: AtomicU64::new(0),
                released: AtomicBool::new(false),
            }),
        }
    }
}
