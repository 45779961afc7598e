//! Component descriptions, lifecycles and per-tree instance identity.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::state::{expect_state, share_state, SharedState, StateContainer, TypeMismatch};
use crate::GlobalKey;

/// Identity of one physical component object. Used for diagnostics only,
/// never for state addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct InstanceIdGenerator {
    next: AtomicU64,
}

impl InstanceIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> InstanceId {
        InstanceId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

/// Context shared by the components of one or more trees.
///
/// Owns the instance id counter, so independent contexts never observe
/// each other's ids.
#[derive(Debug, Clone, Default)]
pub struct ComponentContext {
    ids: Arc<InstanceIdGenerator>,
}

impl ComponentContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_instance_id(&self) -> InstanceId {
        self.ids.next_id()
    }

    pub fn id_generator(&self) -> &InstanceIdGenerator {
        &self.ids
    }
}

type CreateInitialStateFn = dyn Fn(&Component) -> SharedState + Send + Sync;
type TransferStateFn =
    dyn Fn(&dyn StateContainer, &Component) -> Result<SharedState, TypeMismatch> + Send + Sync;

/// Hooks of a component type that owns state.
#[derive(Clone)]
pub struct StatefulHooks {
    create_initial_state: Arc<CreateInitialStateFn>,
    transfer_state: Arc<TransferStateFn>,
}

impl StatefulHooks {
    pub(crate) fn create_initial_state(&self, component: &Component) -> SharedState {
        (self.create_initial_state)(component)
    }

    pub(crate) fn transfer_state(
        &self,
        previous: &dyn StateContainer,
        component: &Component,
    ) -> Result<SharedState, TypeMismatch> {
        (self.transfer_state)(previous, component)
    }
}

/// Whether a component type carries state.
#[derive(Clone)]
pub enum StateCapability {
    Stateless,
    Stateful(StatefulHooks),
}

/// Behaviour shared by every component of one type.
pub struct ComponentLifecycle {
    type_id: u32,
    name: &'static str,
    capability: StateCapability,
}

impl ComponentLifecycle {
    pub fn stateless(type_id: u32, name: &'static str) -> Self {
        Self {
            type_id,
            name,
            capability: StateCapability::Stateless,
        }
    }

    /// Stateful type whose state is created by `init` the first time a key
    /// is seen. Later rebuilds copy the previous value into the new instance.
    pub fn stateful<S, F>(type_id: u32, name: &'static str, init: F) -> Self
    where
        S: StateContainer + Clone,
        F: Fn(&Component) -> S + Send + Sync + 'static,
    {
        Self {
            type_id,
            name,
            capability: StateCapability::Stateful(StatefulHooks {
                create_initial_state: Arc::new(move |component: &Component| {
                    share_state(init(component))
                }),
                transfer_state: Arc::new(|previous: &dyn StateContainer, _: &Component| {
                    let previous = expect_state::<S>(previous)?;
                    Ok(share_state(previous.clone()))
                }),
            }),
        }
    }

    /// Replaces the transfer hook of a stateful type. No-op for stateless types.
    pub fn with_transfer<S, F>(mut self, transfer: F) -> Self
    where
        S: StateContainer,
        F: Fn(&S, &Component) -> S + Send + Sync + 'static,
    {
        if let StateCapability::Stateful(hooks) = &mut self.capability {
            hooks.transfer_state = Arc::new(
                move |previous: &dyn StateContainer, component: &Component| {
                    let previous = expect_state::<S>(previous)?;
                    Ok(share_state(transfer(previous, component)))
                },
            );
        }
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn type_id(&self) -> u32 {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn has_state(&self) -> bool {
        matches!(self.capability, StateCapability::Stateful(_))
    }

    pub fn capability(&self) -> &StateCapability {
        &self.capability
    }
}

impl fmt::Debug for ComponentLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentLifecycle")
            .field("type_id", &self.type_id)
            .field("name", &self.name)
            .field("has_state", &self.has_state())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Column,
    Row,
}

/// A node of a component description tree.
///
/// Containers only group children; they do not contribute to global keys.
#[derive(Clone)]
pub enum Element {
    Component(Component),
    Container {
        kind: ContainerKind,
        children: Vec<Element>,
    },
}

impl Element {
    pub fn column(children: impl IntoIterator<Item = Element>) -> Self {
        Element::Container {
            kind: ContainerKind::Column,
            children: children.into_iter().collect(),
        }
    }

    pub fn row(children: impl IntoIterator<Item = Element>) -> Self {
        Element::Container {
            kind: ContainerKind::Row,
            children: children.into_iter().collect(),
        }
    }
}

impl From<Component> for Element {
    fn from(component: Component) -> Self {
        Element::Component(component)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::Component(component) => component.fmt(f),
            Element::Container { kind, children } => f
                .debug_struct("Container")
                .field("kind", kind)
                .field("children", children)
                .finish(),
        }
    }
}

struct ComponentDescription {
    lifecycle: Arc<ComponentLifecycle>,
    key: Option<String>,
    props: Option<Arc<dyn Any + Send + Sync>>,
    children: Vec<Element>,
}

/// An immutable component description plus its per-instance identity.
///
/// Cloning shares the description. Every rebuild produces fresh instances
/// through [`Component::make_shallow_copy_with_new_id`]; the global key and,
/// for stateful types, the state container are attached during the rebuild.
#[derive(Clone)]
pub struct Component {
    description: Arc<ComponentDescription>,
    instance_id: InstanceId,
    global_key: Option<GlobalKey>,
    state: Option<SharedState>,
}

impl Component {
    pub fn new(context: &ComponentContext, lifecycle: &Arc<ComponentLifecycle>) -> Self {
        Self::builder(context, lifecycle).build()
    }

    pub fn builder(
        context: &ComponentContext,
        lifecycle: &Arc<ComponentLifecycle>,
    ) -> ComponentBuilder {
        ComponentBuilder {
            context: context.clone(),
            lifecycle: Arc::clone(lifecycle),
            key: None,
            props: None,
            children: Vec::new(),
        }
    }

    pub fn lifecycle(&self) -> &Arc<ComponentLifecycle> {
        &self.description.lifecycle
    }

    pub fn name(&self) -> &'static str {
        self.description.lifecycle.name()
    }

    pub fn has_state(&self) -> bool {
        self.description.lifecycle.has_state()
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn key(&self) -> Option<&str> {
        self.description.key.as_deref()
    }

    /// Key of this component relative to its parent component.
    pub fn local_key(&self) -> String {
        match &self.description.key {
            Some(key) => key.clone(),
            None => ComponentLifecycle::type_id(&self.description.lifecycle).to_string(),
        }
    }

    /// Global key assigned by the last tree walk that produced this instance.
    pub fn global_key(&self) -> Option<&GlobalKey> {
        self.global_key.as_ref()
    }

    pub fn props<P: Any>(&self) -> Option<&P> {
        self.description
            .props
            .as_ref()
            .and_then(|props| props.downcast_ref::<P>())
    }

    pub fn children(&self) -> &[Element] {
        &self.description.children
    }

    pub fn state(&self) -> Option<&SharedState> {
        self.state.as_ref()
    }

    pub fn state_as<S: StateContainer>(&self) -> Option<&S> {
        self.state.as_ref().and_then(crate::downcast_state::<S>)
    }

    pub fn identity(&self) -> ComponentIdentity {
        ComponentIdentity {
            name: self.name(),
            instance_id: self.instance_id,
        }
    }

    /// Structural copy keeping the instance id, global key and state.
    pub fn make_shallow_copy(&self) -> Component {
        self.clone()
    }

    /// Structural copy with a fresh instance id drawn from `context`.
    pub fn make_shallow_copy_with_new_id(&self, context: &ComponentContext) -> Component {
        Component {
            instance_id: context.next_instance_id(),
            ..self.clone()
        }
    }

    pub(crate) fn assign_global_key(&mut self, key: GlobalKey) {
        self.global_key = Some(key);
    }

    pub(crate) fn attach_state(&mut self, state: SharedState) {
        self.state = Some(state);
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name())
            .field("instance_id", &self.instance_id)
            .field("global_key", &self.global_key)
            .field("state", &self.state)
            .field("children", &self.description.children.len())
            .finish()
    }
}

pub struct ComponentBuilder {
    context: ComponentContext,
    lifecycle: Arc<ComponentLifecycle>,
    key: Option<String>,
    props: Option<Arc<dyn Any + Send + Sync>>,
    children: Vec<Element>,
}

impl ComponentBuilder {
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn props<P: Any + Send + Sync>(mut self, props: P) -> Self {
        self.props = Some(Arc::new(props));
        self
    }

    pub fn child(mut self, child: impl Into<Element>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn build(self) -> Component {
        Component {
            description: Arc::new(ComponentDescription {
                lifecycle: self.lifecycle,
                key: self.key,
                props: self.props,
                children: self.children,
            }),
            instance_id: self.context.next_instance_id(),
            global_key: None,
            state: None,
        }
    }
}

/// Name and instance id of a component, used in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentIdentity {
    pub name: &'static str,
    pub instance_id: InstanceId,
}

impl fmt::Display for ComponentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.instance_id)
    }
}
