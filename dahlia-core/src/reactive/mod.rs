//! Reactive Primitives
//!
//! Signals, memos, effects and the scopes that own them, all hanging off a
//! [`Runtime`].
//!
//! # Pieces
//!
//! ## Signals
//!
//! Writable cells. A tracked read subscribes the running computation; an
//! effective write notifies every subscriber.
//!
//! ## Memos
//!
//! Derived values, computed on first read and cached until an input really
//! changes.
//!
//! ## Effects
//!
//! Computations kept for their side effects, run once at creation and again
//! whenever something they read changes.
//!
//! ## Scopes
//!
//! Every effect and cleanup belongs to a scope. Disposing a scope tears down
//! everything it owns and guarantees its effects never run again.
//!
//! # Tracking
//!
//! Tracking uses a per-runtime stack of contexts rather than global state:
//! every handle knows the runtime it was created on, and a read registers a
//! dependency on whichever computation is on top of that runtime's stack.

mod context;
mod effect;
mod memo;
mod runtime;
mod scope;
mod signal;

pub use effect::Effect;
pub use memo::Memo;
pub use runtime::{on_cleanup, Runtime, RuntimeConfig};
pub use scope::{Scope, ScopeId};
pub use signal::Signal;

pub(crate) use runtime::Computation;
