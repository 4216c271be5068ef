//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency graph, the tracking stack, the disposal
//! tree and the queue of pending effects.
//!
//! # How It Works
//!
//! 1. Signals, memos and effects register a node with the runtime they were
//!    created on.
//!
//! 2. When a memo or effect reads a signal, the tracking stack records the
//!    dependency; the graph edges are replaced wholesale after each run.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Marks direct observers dirty and everything downstream maybe-dirty
//!    b. Queues the effects reached this way (once each)
//!    c. Flushes the queue, unless a batch is open
//!    d. Memos are lazy - they recompute when pulled by a reader
//!
//! # Threading
//!
//! A runtime is single-threaded and `!Send`. Independent runtimes share
//! nothing, so separate roots can live side by side without coordination.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::graph::{ComputationRef, DirtyState, Node, NodeId, NodeKind, UpdateScheduler};

use super::context::{ReactiveContext, TrackingStack};
use super::scope::{Cleanup, Scope, ScopeId, ScopeTree};

/// A node body the runtime can execute: a memo's derivation or an effect.
pub(crate) trait Computation {
    /// Run the body inside the current tracking context.
    ///
    /// Returns `Ok(true)` when a memo produced a value different from the one
    /// it cached. Effects always report `Ok(false)` on success.
    fn run(&self) -> Result<bool>;

    /// Record a failure detected by the runtime rather than by the body.
    fn fail(&self, error: Error);
}

/// Runtime tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many times one effect may run inside a single flush before the
    /// flush is declared cyclic.
    pub max_reruns_per_flush: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_reruns_per_flush: 100,
        }
    }
}

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    graph: RefCell<UpdateScheduler>,
    tracking: TrackingStack,
    owners: RefCell<Vec<ScopeId>>,
    scopes: RefCell<ScopeTree>,
    pending: RefCell<IndexSet<NodeId>>,
    /// Nodes whose sources are being settled, innermost last.
    settling: RefCell<Vec<NodeId>>,
    /// Nodes whose handles dropped while the graph was borrowed.
    orphans: RefCell<Vec<NodeId>>,
    batch_depth: Cell<usize>,
    flushing: Cell<bool>,
}

/// An independent reactive root.
///
/// Cloning the handle shares the same graph.
///
/// # Example
///
/// ```rust
/// use dahlia_core::reactive::{Effect, Runtime, Signal};
///
/// let rt = Runtime::new();
/// let count = Signal::new(&rt, 1);
/// let (effect, scope) = rt.create_scope(|| {
///     let count = count.clone();
///     Effect::new(&rt, move || println!("count = {}", count.get()))
/// });
/// let _effect = effect?;
///
/// count.set(2)?; // prints "count = 2"
/// scope.dispose();
/// count.set(3)?; // prints nothing
/// # Ok::<(), dahlia_core::Error>(())
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                graph: RefCell::new(UpdateScheduler::new()),
                tracking: TrackingStack::default(),
                owners: RefCell::new(Vec::new()),
                scopes: RefCell::new(ScopeTree::default()),
                pending: RefCell::new(IndexSet::new()),
                settling: RefCell::new(Vec::new()),
                orphans: RefCell::new(Vec::new()),
                batch_depth: Cell::new(0),
                flushing: Cell::new(false),
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn inner(&self) -> &Rc<RuntimeInner> {
        &self.inner
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Rc::downgrade(&self.inner)
    }

    /// Run `f` with a new scope as the current owner.
    ///
    /// Effects and cleanups registered during `f` (including inside nested
    /// synchronous calls) belong to the new scope. The scope is a child of
    /// whichever scope was current, if any.
    pub fn create_scope<R>(&self, f: impl FnOnce() -> R) -> (R, Scope) {
        let parent = self.inner.current_owner();
        let id = self.inner.scopes.borrow_mut().create(parent);
        let value = {
            let _owner = OwnerGuard::enter(&self.inner, id);
            f()
        };
        (value, Scope::new(id, self.downgrade()))
    }

    /// Run `f` with a new detached scope as the current owner.
    ///
    /// Unlike [`create_scope`](Self::create_scope) the new scope has no
    /// parent: it survives the disposal of whatever scope is current and must
    /// be disposed explicitly.
    pub fn create_root<R>(&self, f: impl FnOnce() -> R) -> (R, Scope) {
        let id = self.inner.scopes.borrow_mut().create(None);
        let value = {
            let _owner = OwnerGuard::enter(&self.inner, id);
            f()
        };
        (value, Scope::new(id, self.downgrade()))
    }

    /// The scope currently collecting effects and cleanups.
    pub fn current_scope(&self) -> Option<Scope> {
        self.inner
            .current_owner()
            .map(|id| Scope::new(id, self.downgrade()))
    }

    /// Register `cleanup` to run when the current scope is disposed.
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + 'static) -> Result<()> {
        self.inner.on_cleanup(Box::new(cleanup))
    }

    /// Run `f` with propagation suspended, then flush once.
    ///
    /// Batches nest; only the outermost one flushes. An error from the flush
    /// is returned after `f`'s value has been dropped.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let value = {
            let _batch = BatchGuard::enter(&self.inner);
            f()
        };
        if self.inner.batch_depth.get() == 0 {
            self.inner.flush()?;
        }
        Ok(value)
    }

    /// Run `f` without recording any dependencies for the current computation.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let _ctx = ReactiveContext::enter(&self.inner.tracking, None);
        f()
    }

    /// Whether a memo or effect is currently recording reads.
    pub fn is_tracking(&self) -> bool {
        self.inner.tracking.is_active()
    }

    pub fn is_batching(&self) -> bool {
        self.inner.batch_depth.get() > 0
    }

    /// Number of live nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.inner.graph.borrow().node_count()
    }

    /// Number of live scopes, effect run scopes included.
    pub fn scope_count(&self) -> usize {
        self.inner.scopes.borrow().len()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("nodes", &self.node_count())
            .field("scopes", &self.scope_count())
            .field("batching", &self.is_batching())
            .finish()
    }
}

/// Register `cleanup` on the current scope of `runtime`.
///
/// Fails with [`Error::DisposedScopeUsage`] when no scope is active.
pub fn on_cleanup(runtime: &Runtime, cleanup: impl FnOnce() + 'static) -> Result<()> {
    runtime.on_cleanup(cleanup)
}

impl RuntimeInner {
    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    pub fn add_node(&self, node: Node) -> NodeId {
        self.graph.borrow_mut().add_node(node)
    }

    /// Register an effect node owned by the current scope and run it once.
    ///
    /// If the first run fails the effect is disposed and the error returned.
    pub fn add_effect(&self, node: Node, computation: Rc<dyn Computation>) -> Result<NodeId> {
        let owner = self.live_owner("effect creation")?;
        let run_scope = self.scopes.borrow_mut().create(Some(owner));
        let id = self.add_node(
            node.with_computation(ComputationRef::Owned(computation))
                .with_scope(run_scope),
        );
        self.scopes.borrow_mut().add_effect(owner, id);

        if let Err(error) = self.run_node(id) {
            self.dispose_effect(id);
            return Err(error);
        }
        Ok(id)
    }

    /// Drop a node whose last handle went away.
    pub fn release(&self, id: NodeId) {
        match self.graph.try_borrow_mut() {
            Ok(mut graph) => {
                let removed = graph.remove_node(id);
                drop(graph);
                drop(removed);
            }
            Err(_) => self.orphans.borrow_mut().push(id),
        }
    }

    fn collect_orphans(&self) {
        let orphans = std::mem::take(&mut *self.orphans.borrow_mut());
        for id in orphans {
            self.release(id);
        }
    }

    // ------------------------------------------------------------------
    // Reads and writes
    // ------------------------------------------------------------------

    pub fn track(&self, source: NodeId) {
        self.tracking.track(source);
    }

    /// Bring a memo up to date before it is read.
    pub fn refresh(&self, id: NodeId) -> Result<()> {
        if self.is_computing(id) {
            return Err(self.cycle(id));
        }
        self.update_if_necessary(id)
    }

    /// A source changed: mark downstream nodes and flush unless batching.
    pub fn write(&self, source: NodeId) -> Result<()> {
        let reached = self.graph.borrow_mut().mark_changed(source);
        self.enqueue(reached);

        if self.batch_depth.get() == 0 && !self.flushing.get() {
            self.flush()
        } else {
            Ok(())
        }
    }

    fn enqueue(&self, effects: Vec<NodeId>) {
        if !effects.is_empty() {
            self.pending.borrow_mut().extend(effects);
        }
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// Run queued effects until the graph settles.
    pub fn flush(&self) -> Result<()> {
        if self.flushing.get() {
            return Ok(());
        }
        let _flush = FlushGuard::enter(self);
        trace!(pending = self.pending.borrow().len(), "flush start");

        let result = self.run_pending();
        if let Err(error) = &result {
            warn!(%error, "flush aborted");
            self.abandon_pending();
        }
        trace!("flush finished");
        result
    }

    fn run_pending(&self) -> Result<()> {
        let mut runs: HashMap<NodeId, usize> = HashMap::new();
        loop {
            let next = self.pending.borrow_mut().shift_remove_index(0);
            let Some(id) = next else {
                break;
            };
            if !self.graph.borrow().contains(id) {
                continue;
            }

            let count = runs.entry(id).or_default();
            *count += 1;
            if *count > self.config.max_reruns_per_flush {
                return Err(Error::CyclicDependency { node: id });
            }

            self.update_if_necessary(id)?;
        }
        self.collect_orphans();
        Ok(())
    }

    /// The rest of an aborted cascade is dropped; those effects re-run on
    /// their next dependency change.
    fn abandon_pending(&self) {
        let abandoned: Vec<NodeId> = self.pending.borrow_mut().drain(..).collect();
        let mut graph = self.graph.borrow_mut();
        for id in abandoned {
            graph.mark_clean(id);
        }
    }

    fn state(&self, id: NodeId) -> Option<DirtyState> {
        self.graph.borrow().state(id)
    }

    pub fn node_state(&self, id: NodeId) -> Option<DirtyState> {
        self.state(id)
    }

    fn is_computing(&self, id: NodeId) -> bool {
        self.graph
            .borrow()
            .get_node(id)
            .is_some_and(Node::is_computing)
    }

    fn cycle(&self, id: NodeId) -> Error {
        let error = Error::CyclicDependency { node: id };
        self.tracking.poison(error.clone());
        error
    }

    /// Pull-compute: settle the memo sources of a stale node, then run it
    /// only if it ended up dirty.
    ///
    /// Every memo source is settled before the body runs, even once the node
    /// is known to be dirty, so no source recomputes mid-run and re-dirties
    /// the node it is feeding.
    fn update_if_necessary(&self, id: NodeId) -> Result<()> {
        if matches!(
            self.state(id),
            Some(DirtyState::MaybeDirty | DirtyState::Dirty)
        ) {
            if self.settling.borrow().contains(&id) {
                return Err(self.cycle(id));
            }
            let sources = self.graph.borrow().sources(id);
            self.settling.borrow_mut().push(id);
            let settled = sources.into_iter().try_for_each(|source| {
                if self.graph.borrow().kind(source) != Some(NodeKind::Derived) {
                    return Ok(());
                }
                if self.is_computing(source) {
                    return Err(self.cycle(source));
                }
                self.update_if_necessary(source)
            });
            self.settling.borrow_mut().pop();
            settled?;
        }

        match self.state(id) {
            Some(DirtyState::Dirty) => self.run_node(id),
            Some(DirtyState::MaybeDirty) => {
                self.graph.borrow_mut().mark_clean(id);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn run_node(&self, id: NodeId) -> Result<()> {
        let (computation, kind, run_scope) = {
            let graph = self.graph.borrow();
            let Some(node) = graph.get_node(id) else {
                return Ok(());
            };
            if node.is_computing() {
                drop(graph);
                return Err(self.cycle(id));
            }
            (node.computation(), node.kind(), node.scope())
        };

        let Some(computation) = computation else {
            // The memo's handles are gone; nobody can read it any more.
            self.release(id);
            return Ok(());
        };

        {
            let mut graph = self.graph.borrow_mut();
            if let Some(node) = graph.get_node_mut(id) {
                node.set_computing(true);
                // Cleared before the body so writes made by the body re-dirty it.
                node.mark_clean();
            }
        }

        if let Some(scope) = run_scope {
            self.reset_scope(scope);
        }

        trace!(node = %id, ?kind, "run");
        let ctx = ReactiveContext::enter(&self.tracking, Some(id));
        let outcome = {
            let _owner = run_scope.map(|scope| OwnerGuard::enter(self, scope));
            computation.run()
        };
        let entry = ctx.exit();

        {
            let mut graph = self.graph.borrow_mut();
            if let Some(node) = graph.get_node_mut(id) {
                node.set_computing(false);
            }
            graph.set_sources(id, entry.dependencies);
        }

        let outcome = match entry.poisoned {
            Some(error) => {
                computation.fail(error.clone());
                match kind {
                    NodeKind::Derived => Ok(true),
                    _ => Err(error),
                }
            }
            None => outcome,
        };
        drop(computation);

        let changed = outcome?;
        if kind == NodeKind::Derived && changed {
            let mut reached = Vec::new();
            {
                let mut graph = self.graph.borrow_mut();
                let observers: Vec<NodeId> = graph
                    .get_node(id)
                    .map(|node| node.observers().iter().copied().collect())
                    .unwrap_or_default();
                for observer in observers {
                    // A clean observer that is mid-run is the one pulling
                    // this value, so it already sees the new result.
                    let pulling = graph
                        .get_node(observer)
                        .is_some_and(|node| node.is_computing() && node.is_clean());
                    if !pulling {
                        graph.mark(observer, DirtyState::Dirty, &mut reached);
                    }
                }
            }
            self.enqueue(reached);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Ownership
    // ------------------------------------------------------------------

    pub fn current_owner(&self) -> Option<ScopeId> {
        self.owners.borrow().last().copied()
    }

    pub fn scope_is_live(&self, id: ScopeId) -> bool {
        self.scopes.borrow().is_live(id)
    }

    fn live_owner(&self, operation: &'static str) -> Result<ScopeId> {
        self.current_owner()
            .filter(|owner| self.scope_is_live(*owner))
            .ok_or(Error::DisposedScopeUsage { operation })
    }

    fn on_cleanup(&self, cleanup: Cleanup) -> Result<()> {
        let owner = self.live_owner("on_cleanup")?;
        self.scopes
            .borrow_mut()
            .add_cleanup(owner, cleanup)
            .map_err(|_| Error::DisposedScopeUsage {
                operation: "on_cleanup",
            })
    }

    /// Dispose a scope: children first, then effects, then cleanups in
    /// reverse registration order.
    pub fn dispose_scope(&self, id: ScopeId) {
        let Some(contents) = self.scopes.borrow_mut().remove(id) else {
            return;
        };
        debug!(scope = ?id, "dispose scope");
        self.tear_down(contents);
    }

    /// Tear down what a scope owns while keeping the scope itself alive.
    fn reset_scope(&self, id: ScopeId) {
        let contents = self.scopes.borrow_mut().drain(id);
        self.tear_down(contents);
    }

    fn tear_down(&self, contents: super::scope::ScopeContents) {
        for child in contents.children {
            self.dispose_scope(child);
        }
        for effect in contents.effects {
            self.dispose_effect(effect);
        }
        for cleanup in contents.cleanups.into_iter().rev() {
            cleanup();
        }
    }

    pub fn dispose_effect(&self, id: NodeId) {
        let run_scope = self.graph.borrow().get_node(id).and_then(Node::scope);
        if let Some(scope) = run_scope {
            self.dispose_scope(scope);
        }
        self.pending.borrow_mut().shift_remove(&id);
        self.release(id);
    }

    pub fn node_exists(&self, id: NodeId) -> bool {
        self.graph.borrow().contains(id)
    }

    pub fn source_count(&self, id: NodeId) -> usize {
        self.graph
            .borrow()
            .get_node(id)
            .map_or(0, |node| node.sources().len())
    }

    pub fn observer_count(&self, id: NodeId) -> usize {
        self.graph
            .borrow()
            .get_node(id)
            .map_or(0, |node| node.observers().len())
    }
}

/// Keeps a scope on the owner stack for the duration of a closure.
struct OwnerGuard<'a> {
    runtime: &'a RuntimeInner,
}

impl<'a> OwnerGuard<'a> {
    fn enter(runtime: &'a RuntimeInner, scope: ScopeId) -> Self {
        runtime.owners.borrow_mut().push(scope);
        Self { runtime }
    }
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        self.runtime.owners.borrow_mut().pop();
    }
}

struct BatchGuard<'a> {
    runtime: &'a RuntimeInner,
}

impl<'a> BatchGuard<'a> {
    fn enter(runtime: &'a RuntimeInner) -> Self {
        runtime.batch_depth.set(runtime.batch_depth.get() + 1);
        Self { runtime }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let depth = self.runtime.batch_depth.get();
        self.runtime.batch_depth.set(depth.saturating_sub(1));
    }
}

struct FlushGuard<'a> {
    runtime: &'a RuntimeInner,
}

impl<'a> FlushGuard<'a> {
    fn enter(runtime: &'a RuntimeInner) -> Self {
        runtime.flushing.set(true);
        Self { runtime }
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.runtime.flushing.set(false);
    }
}
