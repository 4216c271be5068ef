//! Dependency Graph
//!
//! Bookkeeping for who-reads-whom between signals, memos and effects.
//!
//! # Shape
//!
//! - One node per signal, memo or effect
//! - If A read B during its last run, B lists A as an observer and A lists B
//!   as a source; edges are rebuilt after every run
//!
//! A write walks observers outward, raising dirty marks as it goes. The runtime then pulls dirty effects, recomputing
//! only the memos whose inputs actually changed.
//!
//! Each [`crate::reactive::Runtime`] owns exactly one graph. Nothing here is
//! global, so independent roots never observe each other's nodes.

mod node;
mod scheduler;

pub use node::{DirtyState, Node, NodeId, NodeKind, SourceList};
pub(crate) use node::ComputationRef;
pub use scheduler::UpdateScheduler;
