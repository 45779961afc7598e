/// Tunables of a [`crate::ComponentTree`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeConfig {
    /// Drop pending updates whose key matched no component in a committed
    /// rebuild. When unset they stay queued until a matching component shows up.
    pub prune_orphaned_updates: bool,
}

impl TreeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prune_orphaned_updates(mut self, prune: bool) -> Self {
        self.prune_orphaned_updates = prune;
        self
    }
}
