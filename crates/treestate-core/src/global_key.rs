//! Stable identities for component slots.
//!
//! A [`GlobalKey`] names a logical slot in the component tree. It is derived
//! from the key of the enclosing component and the local key of the child,
//! so the same slot resolves to the same key on every rebuild even though
//! the component objects themselves are replaced.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

const SEPARATOR: char = ',';
const ESCAPE: char = '%';

/// Escapes a local key so it never contains [`SEPARATOR`].
fn push_segment(out: &mut String, local: &str) {
    for ch in local.chars() {
        match ch {
            SEPARATOR => out.push_str("%2C"),
            ESCAPE => out.push_str("%25"),
            ch => out.push(ch),
        }
    }
}

/// String identity of a component slot, unique within one committed tree.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalKey(Arc<str>);

impl GlobalKey {
    /// Key of the root component of a tree.
    ///
    /// `,` and `%` in `local` are percent-escaped, as in [`GlobalKey::child`].
    pub fn root(local: &str) -> Self {
        let mut key = String::with_capacity(local.len());
        push_segment(&mut key, local);
        Self(Arc::from(key))
    }

    /// Key of a component nested under the component owning `self`.
    ///
    /// `,` and `%` in `local` are percent-escaped so an explicit key can never
    /// be mistaken for a deeper path.
    pub fn child(&self, local: &str) -> Self {
        let mut joined = String::with_capacity(self.0.len() + 1 + local.len());
        joined.push_str(&self.0);
        joined.push(SEPARATOR);
        push_segment(&mut joined, local);
        Self(Arc::from(joined))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of component levels encoded in the key.
    pub fn depth(&self) -> usize {
        self.0.split(SEPARATOR).count()
    }

    /// Key of the enclosing component, if any.
    pub fn parent(&self) -> Option<GlobalKey> {
        self.0
            .rfind(SEPARATOR)
            .map(|index| Self(Arc::from(&self.0[..index])))
    }
}

impl fmt::Debug for GlobalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobalKey").field(&&*self.0).finish()
    }
}

impl fmt::Display for GlobalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GlobalKey {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for GlobalKey {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<&GlobalKey> for GlobalKey {
    fn from(value: &GlobalKey) -> Self {
        value.clone()
    }
}

impl Borrow<str> for GlobalKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for GlobalKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
