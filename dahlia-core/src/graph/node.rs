//! Dependency graph vertices.
//!
//! Every signal, memo and effect owns exactly one [`Node`]. A node carries
//! its dirty mark and both edge directions; the body it runs (if any) lives
//! behind a [`ComputationRef`].

use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::reactive::{Computation, ScopeId};

/// Source lists are short in practice; most computations read one to four cells.
pub type SourceList = SmallVec<[NodeId; 4]>;

/// Process-wide node identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A signal: written from outside, read by anything.
    Source,
    /// A memo: reads other nodes, caches a value others may read.
    Derived,
    /// An effect: reads other nodes, is never read.
    Effect,
}

/// Freshness mark. Marks only ever rise until the node runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DirtyState {
    Clean,
    /// Something upstream changed; whether this node's direct sources did is
    /// decided on the next pull.
    MaybeDirty,
    /// A direct source changed.
    Dirty,
}

/// How the graph holds on to a node's body.
///
/// Effects are owned by the graph (they live until their scope is disposed);
/// memos are owned by their handles, so the graph only keeps a weak reference.
#[derive(Clone)]
pub(crate) enum ComputationRef {
    Owned(Rc<dyn Computation>),
    Borrowed(Weak<dyn Computation>),
}

impl ComputationRef {
    pub(crate) fn upgrade(&self) -> Option<Rc<dyn Computation>> {
        match self {
            Self::Owned(rc) => Some(Rc::clone(rc)),
            Self::Borrowed(weak) => weak.upgrade(),
        }
    }
}

/// One vertex of the dependency graph.
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    dirty: DirtyState,

    /// Set while the node's body is executing. Re-entering a computing node is a cycle.
    computing: bool,

    /// Nodes that this node read during its last run, in read order.
    sources: SourceList,

    /// Nodes that read this node during their last run.
    observers: IndexSet<NodeId>,

    /// Body of a memo or effect. Sources have none.
    computation: Option<ComputationRef>,

    /// For effects: the scope that collects cleanups and children of each run.
    scope: Option<ScopeId>,
}

impl Node {
    /// Sources start clean; memos and effects start dirty so their first
    /// pull or flush runs them.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            dirty: match kind {
                NodeKind::Source => DirtyState::Clean,
                NodeKind::Derived | NodeKind::Effect => DirtyState::Dirty,
            },
            computing: false,
            sources: SourceList::new(),
            observers: IndexSet::new(),
            computation: None,
            scope: None,
        }
    }

    pub fn source() -> Self {
        Self::new(NodeKind::Source)
    }

    pub fn derived() -> Self {
        Self::new(NodeKind::Derived)
    }

    pub fn effect() -> Self {
        Self::new(NodeKind::Effect)
    }

    pub(crate) fn with_computation(mut self, computation: ComputationRef) -> Self {
        self.computation = Some(computation);
        self
    }

    pub(crate) fn with_scope(mut self, scope: ScopeId) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// Raise the dirty state to `state`. Returns the previous state.
    pub fn raise(&mut self, state: DirtyState) -> DirtyState {
        let previous = self.dirty;
        if state > previous {
            self.dirty = state;
        }
        previous
    }

    pub fn is_computing(&self) -> bool {
        self.computing
    }

    pub(crate) fn set_computing(&mut self, computing: bool) {
        self.computing = computing;
    }

    /// Nodes read during the last run.
    pub fn sources(&self) -> &SourceList {
        &self.sources
    }

    pub(crate) fn replace_sources(&mut self, sources: SourceList) -> SourceList {
        std::mem::replace(&mut self.sources, sources)
    }

    /// Nodes that read this node.
    pub fn observers(&self) -> &IndexSet<NodeId> {
        &self.observers
    }

    pub(crate) fn add_observer(&mut self, node_id: NodeId) {
        self.observers.insert(node_id);
    }

    pub(crate) fn remove_observer(&mut self, node_id: NodeId) {
        self.observers.shift_remove(&node_id);
    }

    pub(crate) fn computation(&self) -> Option<Rc<dyn Computation>> {
        self.computation.as_ref().and_then(ComputationRef::upgrade)
    }

    pub(crate) fn scope(&self) -> Option<ScopeId> {
        self.scope
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("dirty", &self.dirty)
            .field("computing", &self.computing)
            .field("sources", &self.sources)
            .field("observers", &self.observers)
            .finish()
    }
}
