//! Effects
//!
//! Computations run for their side effects, such as patching a node.
//!
//! # Lifecycle
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies. It must be created inside a scope, which owns it.
//!
//! 2. When any dependency changes, the effect is queued and re-run by the
//!    flush (right away, or when the enclosing batch closes).
//!
//! 3. Each run records a fresh dependency set, so branches that stop reading a
//!    signal stop depending on it.
//!
//! # Cleanup
//!
//! Every run has its own child scope. Cleanups registered and effects created
//! during a run belong to that scope and are torn down right before the next
//! run, and when the effect is disposed.
//!
//! # Failures
//!
//! An error returned by the body is not swallowed. It comes back from
//! [`Effect::new`] on the first run, or from the `set`/`batch` call whose
//! flush re-ran the effect.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};
use crate::graph::{Node, NodeId};

use super::runtime::{Computation, Runtime, RuntimeInner};

type Body = Box<dyn FnMut() -> Result<()>>;

struct EffectInner {
    id: NodeId,
    body: RefCell<Body>,
    runs: Cell<usize>,
}

impl Computation for EffectInner {
    fn run(&self) -> Result<bool> {
        let mut body = self
            .body
            .try_borrow_mut()
            .map_err(|_| Error::CyclicDependency { node: self.id })?;
        self.runs.set(self.runs.get() + 1);
        (*body)()?;
        Ok(false)
    }

    fn fail(&self, _error: Error) {}
}

/// Handle to an effect. Clones share the effect.
///
/// The handle is only a reference; dropping it does not stop the effect.
/// The effect lives until it, or its owning scope, is disposed.
///
/// # Example
///
/// ```rust
/// use dahlia_core::reactive::{Effect, Runtime, Signal};
///
/// let rt = Runtime::new();
/// let count = Signal::new(&rt, 0);
///
/// let (effect, _scope) = rt.create_scope(|| {
///     let count = count.clone();
///     Effect::new(&rt, move || println!("Count is: {}", count.get()))
/// });
/// let effect = effect?;
///
/// count.set(5)?; // Prints: "Count is: 5"
/// assert_eq!(effect.run_count(), 2);
/// # Ok::<(), dahlia_core::Error>(())
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
    runtime: Weak<RuntimeInner>,
}

impl Effect {
    /// Create a new effect with an infallible body.
    ///
    /// The function runs immediately to establish dependencies.
    pub fn new<F>(runtime: &Runtime, mut run: F) -> Result<Self>
    where
        F: FnMut() + 'static,
    {
        Self::try_new(runtime, move || {
            run();
            Ok(())
        })
    }

    /// Create a new effect whose body may fail.
    ///
    /// Fails with [`Error::DisposedScopeUsage`] when no scope is active, or
    /// with the body's own error if the first run fails (the effect is then
    /// disposed).
    pub fn try_new<F>(runtime: &Runtime, run: F) -> Result<Self>
    where
        F: FnMut() -> Result<()> + 'static,
    {
        let node = Node::effect();
        let inner = Rc::new(EffectInner {
            id: node.id(),
            body: RefCell::new(Box::new(run)),
            runs: Cell::new(0),
        });
        let computation: Rc<dyn Computation> = Rc::clone(&inner) as Rc<dyn Computation>;
        runtime.inner().add_effect(node, computation)?;
        Ok(Self {
            inner,
            runtime: runtime.downgrade(),
        })
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Dispose of the effect.
    ///
    /// Runs its pending cleanups and drops it from the graph. After disposal,
    /// the effect will not run again.
    pub fn dispose(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.dispose_effect(self.inner.id);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.runtime
            .upgrade()
            .map_or(true, |runtime| !runtime.node_exists(self.inner.id))
    }

    /// Completed runs, including the first.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }

    /// Get the number of dependencies recorded by the last run.
    pub fn dependency_count(&self) -> usize {
        self.runtime
            .upgrade()
            .map_or(0, |runtime| runtime.source_count(self.inner.id))
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
