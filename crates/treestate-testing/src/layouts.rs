//! Layout doubles.

use parking_lot::Mutex;
use treestate_core::{
    LaidOutTree, LayoutEngine, LayoutError, PassthroughLayout, ResolvedTree, Size,
};

/// Passthrough layout that remembers every pass it ran.
#[derive(Debug, Default)]
pub struct RecordingLayout {
    passes: Mutex<Vec<LaidOutTree>>,
}

impl RecordingLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass_count(&self) -> usize {
        self.passes.lock().len()
    }

    pub fn last_pass(&self) -> Option<LaidOutTree> {
        self.passes.lock().last().cloned()
    }

    pub fn sizes(&self) -> Vec<Size> {
        self.passes.lock().iter().map(|pass| pass.size).collect()
    }
}

impl LayoutEngine for RecordingLayout {
    fn run_layout(&self, tree: &ResolvedTree, size: Size) -> Result<LaidOutTree, LayoutError> {
        let laid_out = PassthroughLayout.run_layout(tree, size)?;
        self.passes.lock().push(laid_out.clone());
        Ok(laid_out)
    }
}

/// Layout that fails while armed and otherwise behaves like [`PassthroughLayout`].
#[derive(Debug, Default)]
pub struct FailingLayout {
    armed: Mutex<Option<String>>,
    failures: Mutex<usize>,
}

impl FailingLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following pass fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.armed.lock() = Some(message.into());
    }

    pub fn disarm(&self) {
        *self.armed.lock() = None;
    }

    pub fn failures(&self) -> usize {
        *self.failures.lock()
    }
}

impl LayoutEngine for FailingLayout {
    fn run_layout(&self, tree: &ResolvedTree, size: Size) -> Result<LaidOutTree, LayoutError> {
        if let Some(message) = self.armed.lock().clone() {
            *self.failures.lock() += 1;
            return Err(LayoutError::Failed(message));
        }
        PassthroughLayout.run_layout(tree, size)
    }
}
