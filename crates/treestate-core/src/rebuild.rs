//! One rebuild pass over a component description tree.
//!
//! The pass runs in two steps. [`resolve`] walks the description depth-first,
//! derives every global key, rejects collisions and produces fresh component
//! instances. Only when the whole tree resolved does [`apply_state`] create,
//! transfer and update state on those instances.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::key_validator::{global_key_for, KeyValidator};
use crate::state_handler::StateHandler;
use crate::{
    Component, ComponentContext, ContainerKind, DuplicateGlobalKeyError, Element, GlobalKey,
    StateCapability, StateTransferError,
};

/// A component instance produced by a rebuild, with its resolved children.
#[derive(Debug, Clone)]
pub struct ResolvedComponent {
    pub component: Component,
    pub children: Vec<ResolvedNode>,
}

#[derive(Debug, Clone)]
pub enum ResolvedNode {
    Component(ResolvedComponent),
    Container {
        kind: ContainerKind,
        children: Vec<ResolvedNode>,
    },
}

/// Instance tree produced by a rebuild.
#[derive(Debug, Clone)]
pub struct ResolvedTree {
    root: ResolvedComponent,
    len: usize,
}

impl ResolvedTree {
    pub fn root(&self) -> &Component {
        &self.root.component
    }

    /// Number of components in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Visits every component depth-first with its component depth.
    pub fn visit(&self, visitor: &mut dyn FnMut(&Component, usize)) {
        visit_component(&self.root, 0, visitor);
    }

    pub fn find(&self, key: &str) -> Option<&Component> {
        find_component(&self.root, key)
    }

    /// Table from global key to the instance of this tree.
    pub fn instance_table(&self) -> IndexMap<GlobalKey, Component> {
        let mut table = IndexMap::with_capacity(self.len);
        self.visit(&mut |component, _| {
            if let Some(key) = component.global_key() {
                table.insert(key.clone(), component.make_shallow_copy());
            }
        });
        table
    }

    fn visit_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Component) -> Result<(), StateTransferError>,
    ) -> Result<(), StateTransferError> {
        visit_component_mut(&mut self.root, visitor)
    }
}

fn visit_component(
    node: &ResolvedComponent,
    depth: usize,
    visitor: &mut dyn FnMut(&Component, usize),
) {
    visitor(&node.component, depth);
    for child in &node.children {
        visit_node(child, depth + 1, visitor);
    }
}

fn visit_node(node: &ResolvedNode, depth: usize, visitor: &mut dyn FnMut(&Component, usize)) {
    match node {
        ResolvedNode::Component(component) => visit_component(component, depth, visitor),
        ResolvedNode::Container { children, .. } => {
            for child in children {
                visit_node(child, depth, visitor);
            }
        }
    }
}

fn visit_component_mut(
    node: &mut ResolvedComponent,
    visitor: &mut dyn FnMut(&mut Component) -> Result<(), StateTransferError>,
) -> Result<(), StateTransferError> {
    visitor(&mut node.component)?;
    for child in &mut node.children {
        visit_node_mut(child, visitor)?;
    }
    Ok(())
}

fn visit_node_mut(
    node: &mut ResolvedNode,
    visitor: &mut dyn FnMut(&mut Component) -> Result<(), StateTransferError>,
) -> Result<(), StateTransferError> {
    match node {
        ResolvedNode::Component(component) => visit_component_mut(component, visitor),
        ResolvedNode::Container { children, .. } => {
            for child in children {
                visit_node_mut(child, visitor)?;
            }
            Ok(())
        }
    }
}

fn find_component<'a>(node: &'a ResolvedComponent, key: &str) -> Option<&'a Component> {
    if node.component.global_key().map(GlobalKey::as_str) == Some(key) {
        return Some(&node.component);
    }
    node.children.iter().find_map(|child| find_node(child, key))
}

fn find_node<'a>(node: &'a ResolvedNode, key: &str) -> Option<&'a Component> {
    match node {
        ResolvedNode::Component(component) => find_component(component, key),
        ResolvedNode::Container { children, .. } => {
            children.iter().find_map(|child| find_node(child, key))
        }
    }
}

struct Resolver<'a> {
    context: &'a ComponentContext,
    validator: KeyValidator,
}

impl Resolver<'_> {
    fn resolve_component(
        &mut self,
        description: &Component,
        parent: Option<&GlobalKey>,
    ) -> Result<ResolvedComponent, DuplicateGlobalKeyError> {
        let key = global_key_for(parent, description);
        self.validator.register(&key, description.identity())?;
        let mut component = description.make_shallow_copy_with_new_id(self.context);
        component.assign_global_key(key.clone());
        let children = description
            .children()
            .iter()
            .map(|child| self.resolve_element(child, &key))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ResolvedComponent {
            component,
            children,
        })
    }

    fn resolve_element(
        &mut self,
        element: &Element,
        parent: &GlobalKey,
    ) -> Result<ResolvedNode, DuplicateGlobalKeyError> {
        match element {
            Element::Component(component) => self
                .resolve_component(component, Some(parent))
                .map(ResolvedNode::Component),
            Element::Container { kind, children } => Ok(ResolvedNode::Container {
                kind: *kind,
                children: children
                    .iter()
                    .map(|child| self.resolve_element(child, parent))
                    .collect::<Result<Vec<_>, _>>()?,
            }),
        }
    }
}

/// Resolves `root` into fresh instances, failing on the first key collision.
pub fn resolve(
    root: &Component,
    context: &ComponentContext,
) -> Result<ResolvedTree, DuplicateGlobalKeyError> {
    let mut resolver = Resolver {
        context,
        validator: KeyValidator::new(),
    };
    let root = resolver.resolve_component(root, None)?;
    Ok(ResolvedTree {
        root,
        len: resolver.validator.len(),
    })
}

/// Gives every stateful instance of `tree` its state for this rebuild.
///
/// A key seen for the first time gets its initial state. A key committed by
/// the previous rebuild gets a copy of that state. Either way the pending
/// updates for the key are then applied and cleared.
pub fn apply_state(
    tree: &mut ResolvedTree,
    handler: &mut StateHandler,
) -> Result<(), StateTransferError> {
    tree.visit_mut(&mut |component| {
        let lifecycle = Arc::clone(component.lifecycle());
        let StateCapability::Stateful(hooks) = lifecycle.capability() else {
            return Ok(());
        };
        let Some(key) = component.global_key().cloned() else {
            return Ok(());
        };
        let seed = match handler.previous_state(key.as_str()).cloned() {
            Some(previous) => handler.transfer_state(&key, previous.as_ref(), component)?,
            None => handler.get_or_create_state(&key, component, |component| {
                hooks.create_initial_state(component)
            }),
        };
        let state = handler.apply_and_clear_pending(&key, seed, component)?;
        handler.record_state(key, Arc::clone(&state));
        component.attach_state(state);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::share_state;
    use crate::{ComponentLifecycle, StateUpdate};

    #[derive(Debug, Clone, PartialEq)]
    struct Count(i32);

    fn counter_tree(context: &ComponentContext) -> Component {
        let root_type = ComponentLifecycle::stateless(100, "Root").build();
        let counter = ComponentLifecycle::stateful(1, "Counter", |_| Count(4)).build();
        Component::builder(context, &root_type)
            .child(Element::column([Element::from(Component::new(
                context, &counter,
            ))]))
            .build()
    }

    #[test]
    fn resolve_assigns_keys_and_fresh_ids() {
        let context = ComponentContext::new();
        let root = counter_tree(&context);
        let tree = resolve(&root, &context).expect("tree resolves");

        assert_eq!(tree.len(), 2);
        assert_ne!(tree.root().instance_id(), root.instance_id());
        let counter = tree.find("100,1").expect("counter resolved");
        assert_eq!(counter.name(), "Counter");
        let mut depths = Vec::new();
        tree.visit(&mut |component, depth| depths.push((component.name(), depth)));
        assert_eq!(depths, vec![("Root", 0), ("Counter", 1)]);
    }

    #[test]
    fn first_rebuild_creates_initial_state() {
        let context = ComponentContext::new();
        let mut tree = resolve(&counter_tree(&context), &context).expect("tree resolves");
        let current = StateHandler::new();
        let mut pass = StateHandler::acquire_for_rebuild(&current);

        apply_state(&mut tree, &mut pass).expect("state applies");
        let counter = tree.find("100,1").expect("counter resolved");
        assert_eq!(counter.state_as::<Count>(), Some(&Count(4)));
        assert!(tree.root().state().is_none());
        assert_eq!(pass.committed_len(), 1);
    }

    #[test]
    fn later_rebuild_transfers_and_applies_pending() {
        let context = ComponentContext::new();
        let root = counter_tree(&context);
        let mut current = StateHandler::new();
        let mut committed = crate::StateMap::default();
        committed.insert(GlobalKey::from("100,1"), share_state(Count(7)));
        current.commit(committed);
        current.enqueue_update(
            GlobalKey::from("100,1"),
            StateUpdate::new(|count: &Count, _| Count(count.0 + 1)),
        );

        let mut tree = resolve(&root, &context).expect("tree resolves");
        let mut pass = StateHandler::acquire_for_rebuild(&current);
        apply_state(&mut tree, &mut pass).expect("state applies");

        let counter = tree.find("100,1").expect("counter resolved");
        assert_eq!(counter.state_as::<Count>(), Some(&Count(8)));
        let outcome = pass.into_outcome();
        assert_eq!(outcome.consumed.get("100,1"), 1);
        assert!(outcome.unmatched.is_empty());
    }

    #[test]
    fn instance_table_maps_keys_to_latest_instances() {
        let context = ComponentContext::new();
        let tree = resolve(&counter_tree(&context), &context).expect("tree resolves");
        let table = tree.instance_table();
        let keys: Vec<&str> = table.keys().map(GlobalKey::as_str).collect();
        assert_eq!(keys, vec!["100", "100,1"]);
        assert_eq!(
            table["100,1"].instance_id(),
            tree.find("100,1").map(Component::instance_id).expect("counter")
        );
    }
}
