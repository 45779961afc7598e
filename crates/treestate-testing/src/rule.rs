use std::sync::Arc;

use treestate_core::{
    Component, ComponentContext, ComponentTree, RebuildError, Size, StateUpdate, TreeConfig,
};

use crate::fixtures::CounterState;
use crate::layouts::RecordingLayout;
use crate::looper::LooperScheduler;

pub const DEFAULT_SIZE: Size = Size::new(320.0, 480.0);

/// Headless harness around a [`ComponentTree`] driven by a [`LooperScheduler`].
///
/// The tree is built with a [`RecordingLayout`] and an initial size, so
/// [`TreeTestRule::mount`] commits the first generation right away and
/// [`TreeTestRule::run_to_idle`] plays the role of the rebuild worker.
pub struct TreeTestRule {
    context: ComponentContext,
    looper: Arc<LooperScheduler>,
    layout: Arc<RecordingLayout>,
    tree: ComponentTree,
}

impl TreeTestRule {
    pub fn new(build: impl FnOnce(&ComponentContext) -> Component) -> Self {
        Self::with_config(TreeConfig::default(), build)
    }

    pub fn with_config(
        config: TreeConfig,
        build: impl FnOnce(&ComponentContext) -> Component,
    ) -> Self {
        crate::init_logging();
        let context = ComponentContext::new();
        let looper = Arc::new(LooperScheduler::new());
        let layout = Arc::new(RecordingLayout::new());
        let root = build(&context);
        let tree = ComponentTree::builder(&context, root)
            .scheduler(looper.clone())
            .layout_engine(layout.clone())
            .config(config)
            .build();
        Self {
            context,
            looper,
            layout,
            tree,
        }
    }

    /// Sets the default size, committing the first generation.
    pub fn mount(self) -> Result<Self, RebuildError> {
        self.tree.set_size(DEFAULT_SIZE)?;
        Ok(self)
    }

    pub fn tree(&self) -> &ComponentTree {
        &self.tree
    }

    pub fn context(&self) -> &ComponentContext {
        &self.context
    }

    pub fn looper(&self) -> &LooperScheduler {
        &self.looper
    }

    pub fn layout(&self) -> &RecordingLayout {
        &self.layout
    }

    pub fn enqueue(&self, key: &str, update: StateUpdate) {
        self.tree.update_state_async(key, update);
    }

    /// Runs queued worker tasks and reports the failure of the last
    /// rebuild, if any.
    pub fn run_to_idle(&self) -> Result<usize, RebuildError> {
        let ran = self.looper.run_to_idle();
        match self.tree.take_rebuild_error() {
            Some(err) => Err(err),
            None => Ok(ran),
        }
    }

    pub fn count(&self, key: &str) -> Option<i32> {
        self.tree
            .committed_state_as::<CounterState>(key)
            .map(|state| state.count)
    }

    pub fn pending(&self, key: &str) -> usize {
        self.tree.pending_update_count(key)
    }

    pub fn resize(&self, width: f32, height: f32) -> Result<(), RebuildError> {
        self.tree.set_size(Size::new(width, height))
    }
}
