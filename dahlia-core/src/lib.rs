//! Dahlia Core
//!
//! This crate provides the core runtime for the Dahlia reactive UI framework.
//! It implements:
//!
//! - Reactive primitives (signals, memos, effects) with batching and scoped
//!   disposal
//! - Template materialization with a per-document clone cache
//! - Keyed and unkeyed list reconciliation
//! - Server-side rendering with typed markers, and hydration of that markup
//!
//! There is no virtual DOM. Effects patch individual nodes of a host document
//! directly when the values they read change.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Dependency graph nodes and dirty-state propagation
//! - `reactive`: Runtime, signals, memos, effects and scopes
//! - `dom`: In-memory host document, markup parser and serializer
//! - `template`: Static tree descriptions and the materializer
//! - `reconcile`: List reconciler
//! - `bind`: Effects that keep single nodes in sync with reactive values
//! - `ssr`: Marker protocol, string renderer and state payload
//! - `hydrate`: Reattaching bindings to server-rendered markup
//!
//! # Example
//!
//! ```rust
//! use dahlia_core::bind::bind_text;
//! use dahlia_core::dom::Document;
//! use dahlia_core::reactive::{Runtime, Signal};
//! use dahlia_core::template::{self, Namespace, SlotNode, Template};
//!
//! let rt = Runtime::new();
//! let doc = Document::new();
//! let name = Signal::new(&rt, "world".to_string());
//!
//! let greeting = Template::new(vec![template::element("p")
//!     .child(template::text("Hello, "))
//!     .child(template::text_slot())
//!     .into()]);
//! let instance = template::materialize(&doc, &greeting, Namespace::Html)?.instantiate()?;
//!
//! let ((), _scope) = rt.create_scope(|| {
//!     if let Some(SlotNode::Text(node)) = instance.slots().first().copied() {
//!         let name = name.clone();
//!         bind_text(&rt, &doc, node, move || name.get()).map(drop).ok();
//!     }
//! });
//! assert_eq!(doc.to_html(instance.fragment()), "<p>Hello, world</p>");
//!
//! name.set("Dahlia".to_string())?;
//! assert_eq!(doc.to_html(instance.fragment()), "<p>Hello, Dahlia</p>");
//! # Ok::<(), dahlia_core::Error>(())
//! ```

pub mod bind;
pub mod dom;
pub mod error;
pub mod graph;
pub mod hydrate;
pub mod reactive;
pub mod reconcile;
pub mod ssr;
pub mod template;

pub use error::{Error, Result, SlotKind};
