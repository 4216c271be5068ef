//! Memos
//!
//! Lazily derived, cached values.
//!
//! # Evaluation
//!
//! 1. Creating a memo runs nothing. The first read runs the computation and
//!    caches the result.
//!
//! 2. When read again, if no dependencies have changed, returns the cached value.
//!
//! 3. When a dependency changes, the memo is marked dirty (direct dependency)
//!    or maybe-dirty (something further upstream changed).
//!
//! 4. On next read, a maybe-dirty memo first brings its own memo sources up to
//!    date; it recomputes only if one of them actually produced a new value.
//!
//! # Failures
//!
//! A computation that returns an error poisons the memo: every read returns a
//! clone of that error until a dependency changes and the memo recomputes.
//! Reading a memo from inside its own computation (directly or through other
//! memos) fails with [`Error::CyclicDependency`].

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};
use crate::graph::{ComputationRef, DirtyState, Node, NodeId};

use super::runtime::{Computation, Runtime, RuntimeInner};

struct MemoInner<T> {
    id: NodeId,
    runtime: Weak<RuntimeInner>,
    compute: Box<dyn Fn() -> Result<T>>,
    value: RefCell<Option<Result<T>>>,
    runs: Cell<usize>,
}

impl<T: PartialEq + 'static> Computation for MemoInner<T> {
    fn run(&self) -> Result<bool> {
        let next = (self.compute)();
        self.runs.set(self.runs.get() + 1);

        let mut slot = self.value.borrow_mut();
        let changed = match (slot.as_ref(), &next) {
            (Some(Ok(previous)), Ok(next)) => previous != next,
            _ => true,
        };
        *slot = Some(next);
        Ok(changed)
    }

    fn fail(&self, error: Error) {
        *self.value.borrow_mut() = Some(Err(error));
    }
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.release(self.id);
        }
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value.
///
/// The `PartialEq` bound is needed to detect when the computed value actually
/// changed (some memos return the same value even if inputs changed), which
/// is what stops propagation at unchanged memos.
///
/// # Example
///
/// ```rust
/// use dahlia_core::reactive::{Memo, Runtime, Signal};
///
/// let rt = Runtime::new();
/// let count = Signal::new(&rt, 2);
/// let doubled = Memo::new(&rt, {
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get()?, 4);
/// count.set(5)?;
/// assert_eq!(doubled.get()?, 10);
/// # Ok::<(), dahlia_core::Error>(())
/// ```
pub struct Memo<T> {
    inner: Rc<MemoInner<T>>,
}

impl<T: PartialEq + 'static> Memo<T> {
    /// Create a new memo from an infallible computation.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self::try_new(runtime, move || Ok(compute()))
    }

    /// Create a new memo whose computation may fail.
    pub fn try_new<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn() -> Result<T> + 'static,
    {
        let node = Node::derived();
        let inner = Rc::new(MemoInner {
            id: node.id(),
            runtime: runtime.downgrade(),
            compute: Box::new(compute),
            value: RefCell::new(None),
            runs: Cell::new(0),
        });
        let weak: Weak<dyn Computation> = Rc::downgrade(&inner) as Weak<dyn Computation>;
        runtime
            .inner()
            .add_node(node.with_computation(ComputationRef::Borrowed(weak)));
        Self { inner }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Tracked read. Recomputes first if an input changed.
    ///
    /// If called within a reactive context, this also registers the current
    /// computation as a dependent.
    pub fn get(&self) -> Result<T>
    where
        T: Clone,
    {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return (self.inner.compute)();
        };
        runtime.track(self.inner.id);
        runtime.refresh(self.inner.id)?;
        self.cached()
    }

    /// Get the current value without registering a dependency.
    pub fn peek(&self) -> Result<T>
    where
        T: Clone,
    {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return (self.inner.compute)();
        };
        runtime.refresh(self.inner.id)?;
        self.cached()
    }

    fn cached(&self) -> Result<T>
    where
        T: Clone,
    {
        match &*self.inner.value.borrow() {
            Some(Ok(value)) => Ok(value.clone()),
            Some(Err(error)) => Err(error.clone()),
            None => Err(Error::computation("memo was read before it produced a value")),
        }
    }

    /// Current dirty state in the graph.
    pub fn state(&self) -> DirtyState {
        self.inner
            .runtime
            .upgrade()
            .and_then(|runtime| runtime.node_state(self.inner.id))
            .unwrap_or(DirtyState::Dirty)
    }

    /// Check if the memo has a cached value (or cached error).
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// How many times the computation has run.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("value", &self.inner.value.borrow())
            .field("runs", &self.inner.runs.get())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
