//! Scopes
//!
//! A scope is a node in the disposal tree. It owns child scopes, the effects
//! created while it was the current owner, and raw cleanup callbacks.
//!
//! Disposal order is fixed: child scopes first (depth first), then owned
//! effects, then the scope's own cleanups from most recently registered to
//! least. Disposal is idempotent.

use std::collections::HashMap;
use std::fmt;
use std::rc::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::graph::NodeId;

use super::runtime::RuntimeInner;

/// Unique identifier for a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl ScopeId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

pub(crate) type Cleanup = Box<dyn FnOnce()>;

#[derive(Default)]
pub(crate) struct ScopeData {
    parent: Option<ScopeId>,
    children: Vec<ScopeId>,
    effects: Vec<NodeId>,
    cleanups: Vec<Cleanup>,
}

/// Everything a scope owned at the moment it was torn down.
#[derive(Default)]
pub(crate) struct ScopeContents {
    pub children: Vec<ScopeId>,
    pub effects: Vec<NodeId>,
    pub cleanups: Vec<Cleanup>,
}

/// The disposal tree of one runtime. Disposed scopes are removed, so a missing
/// id always means "disposed".
#[derive(Default)]
pub(crate) struct ScopeTree {
    scopes: HashMap<ScopeId, ScopeData>,
}

impl ScopeTree {
    pub fn create(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId::next();
        let parent = parent.filter(|parent| self.scopes.contains_key(parent));
        if let Some(parent) = parent.and_then(|parent| self.scopes.get_mut(&parent)) {
            parent.children.push(id);
        }
        self.scopes.insert(
            id,
            ScopeData {
                parent,
                ..ScopeData::default()
            },
        );
        id
    }

    pub fn is_live(&self, id: ScopeId) -> bool {
        self.scopes.contains_key(&id)
    }

    pub fn add_effect(&mut self, id: ScopeId, effect: NodeId) -> bool {
        match self.scopes.get_mut(&id) {
            Some(scope) => {
                scope.effects.push(effect);
                true
            }
            None => false,
        }
    }

    /// Register a cleanup. Hands the callback back if the scope is gone.
    pub fn add_cleanup(&mut self, id: ScopeId, cleanup: Cleanup) -> Result<(), Cleanup> {
        match self.scopes.get_mut(&id) {
            Some(scope) => {
                scope.cleanups.push(cleanup);
                Ok(())
            }
            None => Err(cleanup),
        }
    }

    /// Take everything the scope owns, leaving it empty but alive.
    pub fn drain(&mut self, id: ScopeId) -> ScopeContents {
        match self.scopes.get_mut(&id) {
            Some(scope) => ScopeContents {
                children: std::mem::take(&mut scope.children),
                effects: std::mem::take(&mut scope.effects),
                cleanups: std::mem::take(&mut scope.cleanups),
            },
            None => ScopeContents::default(),
        }
    }

    /// Remove the scope from the tree, returning what it still owned.
    pub fn remove(&mut self, id: ScopeId) -> Option<ScopeContents> {
        let scope = self.scopes.remove(&id)?;
        if let Some(parent) = scope.parent.and_then(|parent| self.scopes.get_mut(&parent)) {
            parent.children.retain(|child| *child != id);
        }
        Some(ScopeContents {
            children: scope.children,
            effects: scope.effects,
            cleanups: scope.cleanups,
        })
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }
}

/// Handle to a scope, returned by [`Runtime::create_scope`](super::Runtime::create_scope).
///
/// Dropping the handle does not dispose the scope.
#[derive(Clone)]
pub struct Scope {
    id: ScopeId,
    runtime: Weak<RuntimeInner>,
}

impl Scope {
    pub(crate) fn new(id: ScopeId, runtime: Weak<RuntimeInner>) -> Self {
        Self { id, runtime }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Dispose the scope and everything it owns. Calling this twice is a no-op.
    pub fn dispose(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.dispose_scope(self.id);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.runtime
            .upgrade()
            .map_or(true, |runtime| !runtime.scope_is_live(self.id))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_attach_to_parent() {
        let mut tree = ScopeTree::default();
        let root = tree.create(None);
        let child = tree.create(Some(root));

        let contents = tree.drain(root);
        assert_eq!(contents.children, vec![child]);
        assert!(tree.is_live(root));
        assert!(tree.is_live(child));
    }

    #[test]
    fn removed_scope_rejects_cleanups() {
        let mut tree = ScopeTree::default();
        let root = tree.create(None);
        assert!(tree.add_cleanup(root, Box::new(|| {})).is_ok());

        let contents = tree.remove(root).unwrap();
        assert_eq!(contents.cleanups.len(), 1);
        assert!(!tree.is_live(root));
        assert!(tree.add_cleanup(root, Box::new(|| {})).is_err());
        assert!(tree.remove(root).is_none());
    }

    #[test]
    fn removing_child_detaches_from_parent() {
        let mut tree = ScopeTree::default();
        let root = tree.create(None);
        let child = tree.create(Some(root));

        tree.remove(child);
        assert!(tree.drain(root).children.is_empty());
        assert_eq!(tree.len(), 1);
    }
}
