//! Update Scheduler
//!
//! The scheduler owns every node of one runtime's dependency graph and
//! propagates dirty marks through it.
//!
//! # Algorithm
//!
//! Propagation is push-dirty / pull-compute:
//!
//! 1. When a source node changes, its direct observers are marked `Dirty`.
//! 2. Nodes that go from `Clean` to anything else mark their own observers
//!    `MaybeDirty`, recursively. Effects reached this way are reported back to
//!    the runtime exactly once, on their first transition out of `Clean`.
//! 3. The runtime later pulls each reported effect: a `MaybeDirty` node first
//!    brings its memo sources up to date, and only runs if one of them actually
//!    produced a new value (which marks it `Dirty`).
//!
//! Because a node is reported only on its first transition, a diamond
//! (`a -> b, a -> c, b + c -> d`) queues `d` once, and `d` runs after both `b`
//! and `c` have settled.

use std::collections::HashMap;

use super::node::{DirtyState, Node, NodeId, NodeKind, SourceList};

/// Node storage plus mark propagation for one runtime.
#[derive(Debug, Default)]
pub struct UpdateScheduler {
    nodes: HashMap<NodeId, Node>,
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node. The removed node is handed
    /// back so the caller can drop its computation outside any borrow.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&node_id)?;

        for source_id in node.sources() {
            if let Some(source) = self.nodes.get_mut(source_id) {
                source.remove_observer(node_id);
            }
        }

        // Observers keep a stale source entry; it is dropped on their next run.
        Some(node)
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn kind(&self, node_id: NodeId) -> Option<NodeKind> {
        self.nodes.get(&node_id).map(Node::kind)
    }

    pub fn state(&self, node_id: NodeId) -> Option<DirtyState> {
        self.nodes.get(&node_id).map(Node::dirty_state)
    }

    pub fn mark_clean(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.mark_clean();
        }
    }

    /// Replace the sources of `node_id` with the set read during its latest
    /// run, updating the reverse (observer) edges to match.
    pub fn set_sources(&mut self, node_id: NodeId, sources: SourceList) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        let previous = node.replace_sources(sources.clone());

        for old in previous.iter().filter(|id| !sources.contains(id)) {
            if let Some(source) = self.nodes.get_mut(old) {
                source.remove_observer(node_id);
            }
        }
        for new in &sources {
            if let Some(source) = self.nodes.get_mut(new) {
                source.add_observer(node_id);
            }
        }
    }

    /// Sources of a node, cloned so the caller may run computations while
    /// walking them.
    pub fn sources(&self, node_id: NodeId) -> SourceList {
        self.nodes
            .get(&node_id)
            .map(|node| node.sources().clone())
            .unwrap_or_default()
    }

    /// `source_id` was written: its observers become `Dirty`, everything
    /// further out `MaybeDirty`. Returns the effects that left `Clean`, in
    /// discovery order.
    pub fn mark_changed(&mut self, source_id: NodeId) -> Vec<NodeId> {
        let mut reached = Vec::new();
        let observers: Vec<NodeId> = match self.nodes.get(&source_id) {
            Some(source) => source.observers().iter().copied().collect(),
            None => return reached,
        };
        for observer in observers {
            self.mark(observer, DirtyState::Dirty, &mut reached);
        }
        reached
    }

    /// Raise `node_id` to `state` and propagate `MaybeDirty` to everything
    /// downstream that was clean.
    pub fn mark(&mut self, node_id: NodeId, state: DirtyState, reached: &mut Vec<NodeId>) {
        let mut stack = vec![(node_id, state)];

        while let Some((id, state)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            let previous = node.raise(state);
            if previous != DirtyState::Clean || state == DirtyState::Clean {
                continue;
            }
            if node.kind() == NodeKind::Effect {
                reached.push(id);
            }
            // Push in reverse so the first observer is visited first.
            for &observer in node.observers().iter().rev() {
                stack.push((observer, DirtyState::MaybeDirty));
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
