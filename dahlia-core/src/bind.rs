//! Reactive Bindings
//!
//! Each binding is one effect (or one listener) in the current scope that
//! keeps a single node in sync with reactive values. Disposing the scope
//! stops the effect and detaches the listener; the nodes themselves are left
//! where they are.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use serde_json::Value;

use crate::dom::{Document, DomId, Event, ListenerId};
use crate::error::{Error, Result};
use crate::reactive::{Effect, Runtime, Scope};
use crate::reconcile::{ListKey, Reconciler};
use crate::template::AttrValue;

/// Keep a text (or comment) node's data equal to `value()`.
pub fn bind_text<F>(runtime: &Runtime, document: &Document, node: DomId, value: F) -> Result<Effect>
where
    F: Fn() -> String + 'static,
{
    let document = document.clone();
    Effect::try_new(runtime, move || document.set_data(node, &value()))
}

/// Keep an attribute in sync. Values that render to nothing (`false`, null)
/// remove the attribute.
pub fn bind_attribute<F>(
    runtime: &Runtime,
    document: &Document,
    element: DomId,
    name: &str,
    value: F,
) -> Result<Effect>
where
    F: Fn() -> AttrValue + 'static,
{
    let document = document.clone();
    let name = name.to_string();
    Effect::try_new(runtime, move || match value().to_attribute() {
        Some(text) => document.set_attribute(element, &name, &text),
        None => document.remove_attribute(element, &name).map(drop),
    })
}

/// Keep a live property in sync.
pub fn bind_property<F>(
    runtime: &Runtime,
    document: &Document,
    element: DomId,
    name: &str,
    value: F,
) -> Result<Effect>
where
    F: Fn() -> Value + 'static,
{
    let document = document.clone();
    let name = name.to_string();
    Effect::try_new(runtime, move || document.set_property(element, &name, value()))
}

/// Attach a listener that is detached when the current scope is disposed.
///
/// Fails with [`Error::DisposedScopeUsage`] (and attaches nothing) when no
/// scope is active.
pub fn bind_event<F>(
    runtime: &Runtime,
    document: &Document,
    element: DomId,
    event: &str,
    handler: F,
) -> Result<ListenerId>
where
    F: Fn(&Event) + 'static,
{
    let listener = document.add_event_listener(element, event, handler)?;
    let detach = {
        let document = document.clone();
        move || {
            document.remove_event_listener(element, listener);
        }
    };
    if let Err(error) = runtime.on_cleanup(detach) {
        document.remove_event_listener(element, listener);
        return Err(error);
    }
    Ok(listener)
}

/// Content for an insertion point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insert {
    Empty,
    Text(String),
    /// Caller-owned nodes. They are detached, not destroyed, when replaced.
    Nodes(Vec<DomId>),
}

impl From<String> for Insert {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Insert {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Option<DomId>> for Insert {
    fn from(node: Option<DomId>) -> Self {
        node.map_or(Self::Empty, |node| Self::Nodes(vec![node]))
    }
}

/// Keep the content in front of `anchor` equal to `value()`.
///
/// Text replacing text reuses the same text node.
pub fn bind_insert<F>(runtime: &Runtime, document: &Document, anchor: DomId, value: F) -> Result<Effect>
where
    F: Fn() -> Insert + 'static,
{
    let document = document.clone();
    let mut text_node: Option<DomId> = None;
    let mut nodes: Vec<DomId> = Vec::new();

    Effect::try_new(runtime, move || {
        let next = value();
        let parent = document
            .parent(anchor)
            .ok_or_else(|| Error::dom(format!("insertion anchor {anchor} is detached")))?;

        if let (Insert::Text(text), Some(node)) = (&next, text_node) {
            return document.set_data(node, text);
        }

        if let Some(node) = text_node.take() {
            document.destroy(node);
        }
        for node in nodes.drain(..) {
            if document.parent(node) == Some(parent) {
                document.remove(node)?;
            }
        }

        match next {
            Insert::Empty => {}
            Insert::Text(text) => {
                let node = document.create_text_node(&text);
                document.insert_before(parent, node, Some(anchor))?;
                text_node = Some(node);
            }
            Insert::Nodes(next) => {
                for node in &next {
                    document.insert_before(parent, *node, Some(anchor))?;
                }
                nodes = next;
            }
        }
        Ok(())
    })
}

/// Keep a managed list in sync with `items()`.
///
/// Each created item gets its own root scope: effects and listeners set up
/// in `create` live exactly as long as the item's node, and are disposed
/// when the item is removed or when the current scope is disposed. `create`
/// and `update` run untracked, so only `items()` drives the list.
pub fn bind_list<T, K, I, C, U>(
    runtime: &Runtime,
    reconciler: &Rc<RefCell<Reconciler<T, K>>>,
    list: ListKey,
    items: I,
    key_fn: Option<Rc<dyn Fn(&T) -> K>>,
    mut create: C,
    mut update: U,
) -> Result<Effect>
where
    T: 'static,
    K: Hash + Eq + Clone + Debug + 'static,
    I: Fn() -> Vec<T> + 'static,
    C: FnMut(&T) -> Result<DomId> + 'static,
    U: FnMut(DomId, &T) -> Result<()> + 'static,
{
    let scopes: Rc<RefCell<HashMap<DomId, Scope>>> = Rc::default();
    {
        let scopes = Rc::clone(&scopes);
        runtime.on_cleanup(move || {
            let drained: Vec<Scope> = scopes.borrow_mut().drain().map(|(_, scope)| scope).collect();
            for scope in drained {
                scope.dispose();
            }
        })?;
    }

    let rt = runtime.clone();
    let reconciler = Rc::clone(reconciler);
    Effect::try_new(runtime, move || {
        let items = items();
        let mut lists = reconciler
            .try_borrow_mut()
            .map_err(|_| Error::dom("reconciler is already reconciling"))?;

        rt.untrack(|| {
            lists.reconcile(
                list,
                items,
                key_fn.as_deref(),
                |item| {
                    let (node, scope) = rt.create_root(|| create(item));
                    match node {
                        Ok(node) => {
                            scopes.borrow_mut().insert(node, scope);
                            Ok(node)
                        }
                        Err(error) => {
                            scope.dispose();
                            Err(error)
                        }
                    }
                },
                &mut update,
            )
        })?;

        let live: HashSet<DomId> = lists.entries(&list).iter().map(|entry| entry.node).collect();
        drop(lists);
        let stale: Vec<Scope> = {
            let mut scopes = scopes.borrow_mut();
            let dead: Vec<DomId> = scopes
                .keys()
                .filter(|node| !live.contains(node))
                .copied()
                .collect();
            dead.iter().filter_map(|node| scopes.remove(node)).collect()
        };
        for scope in stale {
            scope.dispose();
        }
        Ok(())
    })
}
