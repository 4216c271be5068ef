//! Signals
//!
//! Writable reactive cells. Everything else in the graph is derived from
//! them.
//!
//! # Reads and Writes
//!
//! 1. A tracked read (inside a memo or effect) makes the running computation
//!    an observer of the signal.
//!
//! 2. When a signal's value changes, the runtime marks every dependent and
//!    runs the affected effects (immediately, or when the batch closes).
//!
//! 3. Writing a value equal to the current one does nothing. Equality is
//!    `PartialEq` by default, or a comparator supplied at construction.
//!
//! # Layout
//!
//! A handle is an `Rc` around the node id, the value in a `RefCell`, the
//! comparator and a version counter bumped on every effective write.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use crate::error::Result;
use crate::graph::{Node, NodeId};

use super::runtime::{Runtime, RuntimeInner};

type Comparator<T> = Rc<dyn Fn(&T, &T) -> bool>;

struct SignalInner<T> {
    id: NodeId,
    runtime: Weak<RuntimeInner>,
    value: RefCell<T>,
    version: Cell<u64>,
    equals: Comparator<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.release(self.id);
        }
    }
}

/// Handle to a writable reactive cell. Clones share the cell.
///
/// Handles are cheap to clone and all clones share one value.
///
/// # Example
///
/// ```rust
/// use dahlia_core::reactive::{Runtime, Signal};
///
/// let rt = Runtime::new();
/// let count = Signal::new(&rt, 0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies dependents)
/// count.set(5)?;
/// count.update(|n| *n += 1)?;
/// assert_eq!(count.peek(), 6);
/// # Ok::<(), dahlia_core::Error>(())
/// ```
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal that compares values with `PartialEq`.
    pub fn new(runtime: &Runtime, value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_comparator(runtime, value, |a, b| a == b)
    }

    /// Create a new signal with a custom equality check. Returning `false`
    /// from `equals` always treats a write as a change.
    pub fn with_comparator<F>(runtime: &Runtime, value: T, equals: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        let id = runtime.inner().add_node(Node::source());
        Self {
            inner: Rc::new(SignalInner {
                id,
                runtime: runtime.downgrade(),
                value: RefCell::new(value),
                version: Cell::new(0),
                equals: Rc::new(equals),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Number of effective writes so far.
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a dependent.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.track();
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value (tracked).
    ///
    /// Writing to this signal from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&*self.inner.value.borrow())
    }

    /// Borrow the current value without tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self.inner.value.borrow())
    }

    /// Set a new value and propagate the change.
    ///
    /// Errors raised by effects re-run because of this write are returned here.
    pub fn set(&self, value: T) -> Result<()> {
        let changed = {
            let mut current = self.inner.value.borrow_mut();
            if (self.inner.equals)(&*current, &value) {
                false
            } else {
                *current = value;
                true
            }
        };
        if changed {
            self.notify()
        } else {
            Ok(())
        }
    }

    /// Update the value in place and propagate the change.
    ///
    /// In-place updates cannot be compared against the old value, so they
    /// always count as a change.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<()> {
        f(&mut *self.inner.value.borrow_mut());
        self.notify()
    }

    /// Number of computations that read this signal during their last run.
    pub fn subscriber_count(&self) -> usize {
        self.inner.runtime.upgrade().map_or(0, |runtime| {
            runtime.observer_count(self.inner.id)
        })
    }

    fn track(&self) {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.track(self.inner.id);
        }
    }

    fn notify(&self) -> Result<()> {
        self.inner.version.set(self.inner.version.get() + 1);
        match self.inner.runtime.upgrade() {
            Some(runtime) => runtime.write(self.inner.id),
            None => Ok(()),
        }
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.inner.value.borrow())
            .field("version", &self.version())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_get_and_set() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 0);
        assert_eq!(signal.get(), 0);

        signal.set(42).unwrap();
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 10);
        signal.update(|v| *v += 5).unwrap();
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn equal_write_does_not_bump_version() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, "a".to_string());

        signal.set("a".to_string()).unwrap();
        assert_eq!(signal.version(), 0);

        signal.set("b".to_string()).unwrap();
        assert_eq!(signal.version(), 1);
    }

    #[test]
    fn comparator_controls_change_detection() {
        let rt = Runtime::new();
        // Compare case-insensitively.
        let signal = Signal::with_comparator(&rt, "Hello".to_string(), |a, b| {
            a.eq_ignore_ascii_case(b)
        });

        signal.set("HELLO".to_string()).unwrap();
        assert_eq!(signal.peek(), "Hello");
        assert_eq!(signal.version(), 0);
    }

    #[test]
    fn signal_clone_shares_state() {
        let rt = Runtime::new();
        let signal1 = Signal::new(&rt, 0);
        let signal2 = signal1.clone();

        signal1.set(42).unwrap();
        assert_eq!(signal2.get(), 42);

        signal2.set(100).unwrap();
        assert_eq!(signal1.get(), 100);
    }

    #[test]
    fn signal_ids_are_unique() {
        let rt = Runtime::new();
        let s1 = Signal::new(&rt, 0);
        let s2 = Signal::new(&rt, 0);
        let s3 = Signal::new(&rt, 0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }

    #[test]
    fn dropping_last_handle_releases_node() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 1);
        let copy = signal.clone();
        assert_eq!(rt.node_count(), 1);

        drop(signal);
        assert_eq!(rt.node_count(), 1);
        drop(copy);
        assert_eq!(rt.node_count(), 0);
    }

    #[test]
    fn signal_outlives_runtime() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 1);
        drop(rt);

        signal.set(2).unwrap();
        assert_eq!(signal.get(), 2);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn debug_shows_value_and_version() {
        let rt = Runtime::new();
        let signal = Signal::new(&rt, 7);
        signal.set(8).unwrap();

        let shown = format!("{signal:?}");
        assert!(shown.contains("value: 8"));
        assert!(shown.contains("version: 1"));
    }
}
