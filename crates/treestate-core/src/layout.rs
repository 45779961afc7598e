//! Boundary to the layout collaborator.

use std::fmt;

use crate::rebuild::ResolvedTree;
use crate::{GlobalKey, InstanceId, LayoutError};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width >= 0.0 && self.height >= 0.0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaidOutNode {
    pub global_key: GlobalKey,
    pub instance_id: InstanceId,
    pub name: &'static str,
    pub depth: usize,
}

/// Output of one layout pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LaidOutTree {
    pub size: Size,
    pub nodes: Vec<LaidOutNode>,
}

impl LaidOutTree {
    pub fn node(&self, key: &str) -> Option<&LaidOutNode> {
        self.nodes.iter().find(|node| node.global_key.as_str() == key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Measures and positions a resolved tree. Called on the rebuild worker after
/// state has been created, transferred and updated.
pub trait LayoutEngine: Send + Sync {
    fn run_layout(&self, tree: &ResolvedTree, size: Size) -> Result<LaidOutTree, LayoutError>;
}

pub fn check_size(size: Size) -> Result<(), LayoutError> {
    if size.is_valid() {
        Ok(())
    } else {
        Err(LayoutError::InvalidSize {
            width: size.width,
            height: size.height,
        })
    }
}

/// Layout that records every component depth-first without measuring.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughLayout;

impl LayoutEngine for PassthroughLayout {
    fn run_layout(&self, tree: &ResolvedTree, size: Size) -> Result<LaidOutTree, LayoutError> {
        check_size(size)?;
        let mut nodes = Vec::with_capacity(tree.len());
        tree.visit(&mut |component, depth| {
            if let Some(key) = component.global_key() {
                nodes.push(LaidOutNode {
                    global_key: key.clone(),
                    instance_id: component.instance_id(),
                    name: component.name(),
                    depth,
                });
            }
        });
        Ok(LaidOutTree { size, nodes })
    }
}
