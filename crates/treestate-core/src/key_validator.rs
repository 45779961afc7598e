//! Global key derivation and collision detection.

use crate::collections::map::HashMap;
use crate::{Component, ComponentIdentity, DuplicateGlobalKeyError, Element, GlobalKey};

/// Global key of `component` when nested under the component keyed `parent`.
pub fn global_key_for(parent: Option<&GlobalKey>, component: &Component) -> GlobalKey {
    let local = component.local_key();
    match parent {
        Some(parent) => parent.child(&local),
        None => GlobalKey::root(&local),
    }
}

/// Set of global keys seen during one tree walk.
#[derive(Default)]
pub(crate) struct KeyValidator {
    seen: HashMap<GlobalKey, ComponentIdentity>,
}

impl KeyValidator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(
        &mut self,
        key: &GlobalKey,
        identity: ComponentIdentity,
    ) -> Result<(), DuplicateGlobalKeyError> {
        if let Some(first) = self.seen.get(key) {
            return Err(DuplicateGlobalKeyError {
                key: key.clone(),
                first: *first,
                second: identity,
            });
        }
        self.seen.insert(key.clone(), identity);
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.seen.len()
    }

    fn visit_component(
        &mut self,
        component: &Component,
        parent: Option<&GlobalKey>,
    ) -> Result<(), DuplicateGlobalKeyError> {
        let key = global_key_for(parent, component);
        self.register(&key, component.identity())?;
        for child in component.children() {
            self.visit_element(child, &key)?;
        }
        Ok(())
    }

    fn visit_element(
        &mut self,
        element: &Element,
        parent: &GlobalKey,
    ) -> Result<(), DuplicateGlobalKeyError> {
        match element {
            Element::Component(component) => self.visit_component(component, Some(parent)),
            Element::Container { children, .. } => {
                for child in children {
                    self.visit_element(child, parent)?;
                }
                Ok(())
            }
        }
    }
}

/// Checks that every component under `root` resolves to a distinct global
/// key. Returns the number of components visited.
pub fn validate_global_keys(root: &Component) -> Result<usize, DuplicateGlobalKeyError> {
    let mut validator = KeyValidator::new();
    validator.visit_component(root, None)?;
    Ok(validator.len())
}
