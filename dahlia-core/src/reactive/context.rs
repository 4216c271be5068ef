//! Tracking Frames
//!
//! A read records a dependency on whichever computation is running. Which
//! one that is comes from a stack of frames kept per runtime.
//!
//! # Lifecycle
//!
//! Running a memo or effect pushes a frame naming it. Reads append to the
//! top frame's source list. Exiting pops the frame and the runtime replaces
//! the node's edges with what was collected.
//!
//! The stack lives inside the runtime rather than in a thread-local, so two
//! runtimes on the same thread never see each other's frames.

use std::cell::RefCell;

use crate::error::Error;
use crate::graph::{NodeId, SourceList};

/// One frame of the tracking stack.
#[derive(Debug, Default)]
pub(crate) struct ContextEntry {
    /// The node being computed. `None` marks an untracked region.
    pub observer: Option<NodeId>,
    /// Dependencies collected during this computation, in read order.
    pub dependencies: SourceList,
    /// Set when the computation hit a cycle. The computation fails with this
    /// error even if its body swallowed the one returned by the read.
    pub poisoned: Option<Error>,
}

/// Per-runtime stack of tracking frames.
#[derive(Debug, Default)]
pub(crate) struct TrackingStack {
    frames: RefCell<Vec<ContextEntry>>,
}

impl TrackingStack {
    /// Check if a computation is currently listening for reads.
    pub fn is_active(&self) -> bool {
        self.current_observer().is_some()
    }

    /// Get the current observer, if any.
    pub fn current_observer(&self) -> Option<NodeId> {
        self.frames.borrow().last().and_then(|entry| entry.observer)
    }

    /// Record a dependency on the given node.
    ///
    /// This is called by signals and memos when they are read.
    pub fn track(&self, source: NodeId) {
        let mut frames = self.frames.borrow_mut();
        if let Some(entry) = frames.last_mut() {
            if entry.observer.is_some() && !entry.dependencies.contains(&source) {
                entry.dependencies.push(source);
            }
        }
    }

    /// Fail the current computation with `error` once it returns.
    pub fn poison(&self, error: Error) {
        let mut frames = self.frames.borrow_mut();
        if let Some(entry) = frames.last_mut() {
            entry.poisoned.get_or_insert(error);
        }
    }

    #[cfg(test)]
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    fn push(&self, observer: Option<NodeId>) {
        self.frames.borrow_mut().push(ContextEntry {
            observer,
            ..ContextEntry::default()
        });
    }

    fn pop(&self) -> Option<ContextEntry> {
        self.frames.borrow_mut().pop()
    }
}

/// A pushed frame. Dropping it without [`exit`](Self::exit) (on unwind)
/// still pops it.
pub(crate) struct ReactiveContext<'a> {
    stack: &'a TrackingStack,
    observer: Option<NodeId>,
    finished: bool,
}

impl<'a> ReactiveContext<'a> {
    /// Push a frame for `observer`. `None` opens an untracked region.
    pub fn enter(stack: &'a TrackingStack, observer: Option<NodeId>) -> Self {
        stack.push(observer);
        Self {
            stack,
            observer,
            finished: false,
        }
    }

    /// Leave the context, returning what it collected.
    pub fn exit(mut self) -> ContextEntry {
        self.finished = true;
        let entry = self.stack.pop().unwrap_or_default();
        debug_assert_eq!(
            entry.observer, self.observer,
            "ReactiveContext mismatch: expected {:?}, got {:?}",
            self.observer, entry.observer
        );
        entry
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.stack.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_observer() {
        let stack = TrackingStack::default();
        let id = NodeId::new();

        assert!(!stack.is_active());
        assert!(stack.current_observer().is_none());

        {
            let _ctx = ReactiveContext::enter(&stack, Some(id));
            assert!(stack.is_active());
            assert_eq!(stack.current_observer(), Some(id));
        }

        // popped on drop
        assert!(!stack.is_active());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn context_collects_unique_dependencies() {
        let stack = TrackingStack::default();
        let ctx = ReactiveContext::enter(&stack, Some(NodeId::new()));
        let (a, b) = (NodeId::new(), NodeId::new());

        stack.track(a);
        stack.track(b);
        stack.track(a);

        let entry = ctx.exit();
        assert_eq!(entry.dependencies.as_slice(), &[a, b]);
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn untracked_frame_shadows_outer_observer() {
        let stack = TrackingStack::default();
        let outer = ReactiveContext::enter(&stack, Some(NodeId::new()));
        let source = NodeId::new();

        {
            let _untracked = ReactiveContext::enter(&stack, None);
            assert!(!stack.is_active());
            stack.track(source);
        }

        assert!(outer.exit().dependencies.is_empty());
    }

    #[test]
    fn nested_contexts() {
        let stack = TrackingStack::default();
        let id1 = NodeId::new();
        let id2 = NodeId::new();

        let ctx1 = ReactiveContext::enter(&stack, Some(id1));
        {
            let ctx2 = ReactiveContext::enter(&stack, Some(id2));
            assert_eq!(stack.current_observer(), Some(id2));
            stack.poison(Error::CyclicDependency { node: id2 });
            assert!(ctx2.exit().poisoned.is_some());
        }

        // After inner context exits, outer should be current and untouched
        assert_eq!(stack.current_observer(), Some(id1));
        assert!(ctx1.exit().poisoned.is_none());
    }
}
