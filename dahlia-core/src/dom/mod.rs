//! Host Document
//!
//! An in-memory document the rest of the crate patches: the minimal surface a
//! fine-grained runtime needs from a host (namespaced node creation,
//! attributes and properties, child insertion and sibling queries, event
//! listeners), plus a markup parser and serializer so that server output can
//! be loaded and hydrated.
//!
//! # Layout
//!
//! Nodes live in an arena keyed by [`DomId`]. Ids are issued monotonically
//! per document and never reused, so a stale id simply stops resolving once
//! its node is destroyed. Detached nodes (including template prototypes)
//! stay in the arena until [`Document::destroy`] frees them.
//!
//! `Document` is a cheap handle; clones share one arena.

mod parse;
mod serialize;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::template::TemplateCache;

pub use serialize::{escape_attribute, escape_text};

/// Identifier of a node inside one [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomId(u64);

impl DomId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Identifier of an attached event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Element namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Namespace {
    #[default]
    Html,
    Svg,
    MathMl,
}

impl Namespace {
    pub fn uri(self) -> &'static str {
        match self {
            Self::Html => "http://www.w3.org/1999/xhtml",
            Self::Svg => "http://www.w3.org/2000/svg",
            Self::MathMl => "http://www.w3.org/1998/Math/MathML",
        }
    }

    /// Namespace of an element named `tag` opened inside `self`, and the
    /// namespace its children inherit.
    pub fn enter(self, tag: &str) -> (Self, Self) {
        match (self, tag) {
            (_, "svg") => (Self::Svg, Self::Svg),
            (_, "math") => (Self::MathMl, Self::MathMl),
            (Self::Svg, "foreignObject") => (Self::Svg, Self::Html),
            (ns, _) => (ns, ns),
        }
    }
}

/// What kind of node an id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Element,
    Text,
    Comment,
    Fragment,
}

/// HTML elements that never have children or a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|void| void.eq_ignore_ascii_case(tag))
}

/// A dispatched event, as seen by a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: String,
    pub target: DomId,
    pub current_target: DomId,
}

pub type Listener = Rc<dyn Fn(&Event)>;

struct ElementData {
    tag: String,
    namespace: Namespace,
    attributes: IndexMap<String, String>,
    properties: IndexMap<String, Value>,
    listeners: Vec<(ListenerId, String, Listener)>,
}

enum Content {
    Element(ElementData),
    Text(String),
    Comment(String),
    Fragment,
}

struct NodeData {
    parent: Option<DomId>,
    children: Vec<DomId>,
    content: Content,
}

impl NodeData {
    fn new(content: Content) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            content,
        }
    }

    fn node_type(&self) -> NodeType {
        match self.content {
            Content::Element(_) => NodeType::Element,
            Content::Text(_) => NodeType::Text,
            Content::Comment(_) => NodeType::Comment,
            Content::Fragment => NodeType::Fragment,
        }
    }

    fn element(&self) -> Option<&ElementData> {
        match &self.content {
            Content::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.content {
            Content::Element(element) => Some(element),
            _ => None,
        }
    }
}

#[derive(Default)]
pub(crate) struct Tree {
    nodes: HashMap<DomId, NodeData>,
    next_id: u64,
    next_listener: u64,
}

impl Tree {
    fn push(&mut self, content: Content) -> DomId {
        let id = DomId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, NodeData::new(content));
        id
    }

    fn node(&self, id: DomId) -> Result<&NodeData> {
        self.nodes
            .get(&id)
            .ok_or_else(|| Error::dom(format!("node {id} does not exist")))
    }

    fn node_mut(&mut self, id: DomId) -> Result<&mut NodeData> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| Error::dom(format!("node {id} does not exist")))
    }

    fn element_mut(&mut self, id: DomId) -> Result<&mut ElementData> {
        self.node_mut(id)?
            .element_mut()
            .ok_or_else(|| Error::dom(format!("node {id} is not an element")))
    }

    fn detach(&mut self, id: DomId) {
        let parent = self.nodes.get_mut(&id).and_then(|node| node.parent.take());
        if let Some(parent) = parent.and_then(|parent| self.nodes.get_mut(&parent)) {
            parent.children.retain(|child| *child != id);
        }
    }

    fn is_inclusive_ancestor(&self, ancestor: DomId, mut node: DomId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes.get(&node).and_then(|data| data.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn insert_before(&mut self, parent: DomId, child: DomId, reference: Option<DomId>) -> Result<()> {
        match self.node(parent)?.node_type() {
            NodeType::Element | NodeType::Fragment => {}
            other => return Err(Error::dom(format!("{other:?} node {parent} cannot have children"))),
        }
        let child_type = self.node(child)?.node_type();
        if self.is_inclusive_ancestor(child, parent) {
            return Err(Error::dom(format!("cannot insert {child} into its own subtree")));
        }
        if let Some(reference) = reference {
            if self.node(reference)?.parent != Some(parent) {
                return Err(Error::dom(format!("{reference} is not a child of {parent}")));
            }
            if reference == child {
                return Ok(());
            }
        }

        let moved = if child_type == NodeType::Fragment {
            let children = std::mem::take(&mut self.node_mut(child)?.children);
            for moved in &children {
                if let Some(node) = self.nodes.get_mut(moved) {
                    node.parent = None;
                }
            }
            children
        } else {
            self.detach(child);
            vec![child]
        };

        let siblings = &self.node(parent)?.children;
        let mut index = match reference {
            Some(reference) => siblings
                .iter()
                .position(|sibling| *sibling == reference)
                .unwrap_or(siblings.len()),
            None => siblings.len(),
        };
        for node in moved {
            if let Some(data) = self.nodes.get_mut(&node) {
                data.parent = Some(parent);
            }
            self.node_mut(parent)?.children.insert(index, node);
            index += 1;
        }
        Ok(())
    }

    fn clone_subtree(&mut self, id: DomId) -> Result<DomId> {
        let (content, children) = {
            let node = self.node(id)?;
            let content = match &node.content {
                Content::Element(element) => Content::Element(ElementData {
                    tag: element.tag.clone(),
                    namespace: element.namespace,
                    attributes: element.attributes.clone(),
                    properties: IndexMap::new(),
                    listeners: Vec::new(),
                }),
                Content::Text(text) => Content::Text(text.clone()),
                Content::Comment(data) => Content::Comment(data.clone()),
                Content::Fragment => Content::Fragment,
            };
            (content, node.children.clone())
        };
        let copy = self.push(content);
        for child in children {
            let child_copy = self.clone_subtree(child)?;
            self.node_mut(child_copy)?.parent = Some(copy);
            self.node_mut(copy)?.children.push(child_copy);
        }
        Ok(copy)
    }

    fn subtree(&self, root: DomId) -> Vec<DomId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                out.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }
}

#[derive(Default)]
struct DocumentInner {
    tree: RefCell<Tree>,
    templates: RefCell<TemplateCache>,
    hydrated: RefCell<HashSet<DomId>>,
}

/// Handle to an in-memory document.
///
/// # Example
///
/// ```rust
/// use dahlia_core::dom::Document;
///
/// let doc = Document::new();
/// let list = doc.create_element("ul");
/// let item = doc.create_element("li");
/// doc.append_child(list, item)?;
/// doc.append_child(item, doc.create_text_node("a < b"))?;
///
/// assert_eq!(doc.to_html(list), "<ul><li>a &lt; b</li></ul>");
/// # Ok::<(), dahlia_core::Error>(())
/// ```
#[derive(Clone, Default)]
pub struct Document {
    inner: Rc<DocumentInner>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether two handles refer to the same document.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn templates(&self) -> &RefCell<TemplateCache> {
        &self.inner.templates
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    pub fn create_element(&self, tag: &str) -> DomId {
        self.create_element_ns(tag, Namespace::Html)
    }

    pub fn create_element_ns(&self, tag: &str, namespace: Namespace) -> DomId {
        self.inner.tree.borrow_mut().push(Content::Element(ElementData {
            tag: tag.to_string(),
            namespace,
            attributes: IndexMap::new(),
            properties: IndexMap::new(),
            listeners: Vec::new(),
        }))
    }

    pub fn create_text_node(&self, text: &str) -> DomId {
        self.inner
            .tree
            .borrow_mut()
            .push(Content::Text(text.to_string()))
    }

    pub fn create_comment(&self, data: &str) -> DomId {
        self.inner
            .tree
            .borrow_mut()
            .push(Content::Comment(data.to_string()))
    }

    pub fn create_fragment(&self) -> DomId {
        self.inner.tree.borrow_mut().push(Content::Fragment)
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn contains(&self, id: DomId) -> bool {
        self.inner.tree.borrow().nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.inner.tree.borrow().nodes.len()
    }

    pub fn node_type(&self, id: DomId) -> Option<NodeType> {
        self.inner.tree.borrow().nodes.get(&id).map(NodeData::node_type)
    }

    pub fn tag_name(&self, id: DomId) -> Option<String> {
        let tree = self.inner.tree.borrow();
        tree.nodes
            .get(&id)
            .and_then(NodeData::element)
            .map(|element| element.tag.clone())
    }

    pub fn namespace(&self, id: DomId) -> Option<Namespace> {
        let tree = self.inner.tree.borrow();
        tree.nodes
            .get(&id)
            .and_then(NodeData::element)
            .map(|element| element.namespace)
    }

    /// Character data of a text or comment node.
    pub fn data(&self, id: DomId) -> Option<String> {
        let tree = self.inner.tree.borrow();
        match &tree.nodes.get(&id)?.content {
            Content::Text(text) | Content::Comment(text) => Some(text.clone()),
            _ => None,
        }
    }

    /// Replace the character data of a text or comment node.
    pub fn set_data(&self, id: DomId, value: &str) -> Result<()> {
        let mut tree = self.inner.tree.borrow_mut();
        match &mut tree.node_mut(id)?.content {
            Content::Text(text) | Content::Comment(text) => {
                if text != value {
                    value.clone_into(text);
                }
                Ok(())
            }
            _ => Err(Error::dom(format!("node {id} has no character data"))),
        }
    }

    /// Concatenated text of every text node under `id`.
    pub fn text_content(&self, id: DomId) -> String {
        let tree = self.inner.tree.borrow();
        tree.subtree(id)
            .into_iter()
            .filter_map(|node| match &tree.nodes.get(&node)?.content {
                Content::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Attributes and properties
    // ------------------------------------------------------------------

    pub fn attribute(&self, id: DomId, name: &str) -> Option<String> {
        let tree = self.inner.tree.borrow();
        tree.nodes
            .get(&id)
            .and_then(NodeData::element)
            .and_then(|element| element.attributes.get(name).cloned())
    }

    pub fn has_attribute(&self, id: DomId, name: &str) -> bool {
        let tree = self.inner.tree.borrow();
        tree.nodes
            .get(&id)
            .and_then(NodeData::element)
            .is_some_and(|element| element.attributes.contains_key(name))
    }

    /// All attributes in insertion order.
    pub fn attributes(&self, id: DomId) -> Vec<(String, String)> {
        let tree = self.inner.tree.borrow();
        tree.nodes
            .get(&id)
            .and_then(NodeData::element)
            .map(|element| {
                element
                    .attributes
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_attribute(&self, id: DomId, name: &str, value: &str) -> Result<()> {
        let mut tree = self.inner.tree.borrow_mut();
        let element = tree.element_mut(id)?;
        match element.attributes.get_mut(name) {
            Some(current) if current == value => {}
            Some(current) => value.clone_into(current),
            None => {
                element.attributes.insert(name.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    /// Remove an attribute. Returns whether it was present.
    pub fn remove_attribute(&self, id: DomId, name: &str) -> Result<bool> {
        let mut tree = self.inner.tree.borrow_mut();
        Ok(tree.element_mut(id)?.attributes.shift_remove(name).is_some())
    }

    pub fn property(&self, id: DomId, name: &str) -> Option<Value> {
        let tree = self.inner.tree.borrow();
        tree.nodes
            .get(&id)
            .and_then(NodeData::element)
            .and_then(|element| element.properties.get(name).cloned())
    }

    /// Set a live property. Properties are never serialized.
    pub fn set_property(&self, id: DomId, name: &str, value: Value) -> Result<()> {
        let mut tree = self.inner.tree.borrow_mut();
        tree.element_mut(id)?
            .properties
            .insert(name.to_string(), value);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    pub fn parent(&self, id: DomId) -> Option<DomId> {
        self.inner.tree.borrow().nodes.get(&id)?.parent
    }

    pub fn children(&self, id: DomId) -> Vec<DomId> {
        self.inner
            .tree
            .borrow()
            .nodes
            .get(&id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    pub fn first_child(&self, id: DomId) -> Option<DomId> {
        self.inner.tree.borrow().nodes.get(&id)?.children.first().copied()
    }

    pub fn last_child(&self, id: DomId) -> Option<DomId> {
        self.inner.tree.borrow().nodes.get(&id)?.children.last().copied()
    }

    pub fn next_sibling(&self, id: DomId) -> Option<DomId> {
        self.sibling(id, 1)
    }

    pub fn previous_sibling(&self, id: DomId) -> Option<DomId> {
        self.sibling(id, -1)
    }

    fn sibling(&self, id: DomId, offset: isize) -> Option<DomId> {
        let tree = self.inner.tree.borrow();
        let parent = tree.nodes.get(&id)?.parent?;
        let siblings = &tree.nodes.get(&parent)?.children;
        let index = siblings.iter().position(|sibling| *sibling == id)?;
        let target = index.checked_add_signed(offset)?;
        siblings.get(target).copied()
    }

    /// Append `child` as the last child of `parent`. Appending a fragment
    /// moves the fragment's children and leaves it empty.
    pub fn append_child(&self, parent: DomId, child: DomId) -> Result<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` before `reference`, or at the end when `reference` is
    /// `None`. A child that already has a parent is moved.
    pub fn insert_before(&self, parent: DomId, child: DomId, reference: Option<DomId>) -> Result<()> {
        self.inner
            .tree
            .borrow_mut()
            .insert_before(parent, child, reference)
    }

    /// Detach `id` from its parent. The node stays alive.
    pub fn remove(&self, id: DomId) -> Result<()> {
        let mut tree = self.inner.tree.borrow_mut();
        tree.node(id)?;
        tree.detach(id);
        Ok(())
    }

    /// Detach and free `id` with its whole subtree. Unknown ids are ignored.
    pub fn destroy(&self, id: DomId) {
        let removed: Vec<NodeData> = {
            let mut tree = self.inner.tree.borrow_mut();
            tree.detach(id);
            let subtree = tree.subtree(id);
            let mut hydrated = self.inner.hydrated.borrow_mut();
            subtree
                .into_iter()
                .filter_map(|node| {
                    hydrated.remove(&node);
                    tree.nodes.remove(&node)
                })
                .collect()
        };
        // Listeners may own handles into this document; drop them unborrowed.
        drop(removed);
    }

    /// Deep-clone `id`. Attributes are copied; properties and listeners are not.
    pub fn clone_node(&self, id: DomId) -> Result<DomId> {
        self.inner.tree.borrow_mut().clone_subtree(id)
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn add_event_listener(
        &self,
        id: DomId,
        event: &str,
        listener: impl Fn(&Event) + 'static,
    ) -> Result<ListenerId> {
        let mut tree = self.inner.tree.borrow_mut();
        let listener_id = ListenerId(tree.next_listener);
        tree.element_mut(id)?
            .listeners
            .push((listener_id, event.to_string(), Rc::new(listener)));
        tree.next_listener += 1;
        Ok(listener_id)
    }

    /// Detach a listener. Returns whether it was attached.
    pub fn remove_event_listener(&self, id: DomId, listener: ListenerId) -> bool {
        let removed = {
            let mut tree = self.inner.tree.borrow_mut();
            let Some(element) = tree.nodes.get_mut(&id).and_then(NodeData::element_mut) else {
                return false;
            };
            let index = element
                .listeners
                .iter()
                .position(|(attached, _, _)| *attached == listener);
            index.map(|index| element.listeners.remove(index))
        };
        removed.is_some()
    }

    pub fn listener_count(&self, id: DomId) -> usize {
        let tree = self.inner.tree.borrow();
        tree.nodes
            .get(&id)
            .and_then(NodeData::element)
            .map_or(0, |element| element.listeners.len())
    }

    /// Dispatch `event` at `target`, bubbling to the root. Returns how many
    /// listeners ran.
    pub fn dispatch_event(&self, target: DomId, event: &str) -> Result<usize> {
        let path: Vec<(DomId, Vec<Listener>)> = {
            let tree = self.inner.tree.borrow();
            tree.node(target)?;
            let mut path = Vec::new();
            let mut current = Some(target);
            while let Some(id) = current {
                let Some(node) = tree.nodes.get(&id) else {
                    break;
                };
                if let Some(element) = node.element() {
                    let listeners: Vec<Listener> = element
                        .listeners
                        .iter()
                        .filter(|(_, kind, _)| kind == event)
                        .map(|(_, _, listener)| Rc::clone(listener))
                        .collect();
                    if !listeners.is_empty() {
                        path.push((id, listeners));
                    }
                }
                current = node.parent;
            }
            path
        };

        let mut ran = 0;
        for (current_target, listeners) in path {
            let event = Event {
                kind: event.to_string(),
                target,
                current_target,
            };
            for listener in listeners {
                listener(&event);
                ran += 1;
            }
        }
        Ok(ran)
    }

    // ------------------------------------------------------------------
    // Markup
    // ------------------------------------------------------------------

    /// Serialize `id`. Elements include their own tag; fragments serialize
    /// only their children.
    pub fn to_html(&self, id: DomId) -> String {
        let tree = self.inner.tree.borrow();
        let mut out = String::new();
        serialize::write_node(&tree, id, &mut out);
        out
    }

    /// Serialize the children of `id`.
    pub fn inner_html(&self, id: DomId) -> String {
        let tree = self.inner.tree.borrow();
        let mut out = String::new();
        if let Some(node) = tree.nodes.get(&id) {
            for child in &node.children {
                serialize::write_node(&tree, *child, &mut out);
            }
        }
        out
    }

    /// Parse markup into a new, detached fragment.
    pub fn parse_html(&self, markup: &str) -> Result<DomId> {
        let mut tree = self.inner.tree.borrow_mut();
        let fragment = tree.push(Content::Fragment);
        parse::parse_into(&mut tree, fragment, "body", Namespace::Html, markup);
        Ok(fragment)
    }

    /// Replace the children of `id` with parsed markup.
    ///
    /// `id` is the parsing context, so table and list content lands where a
    /// browser would put it. Fragments parse as if inside `<body>`.
    pub fn set_inner_html(&self, id: DomId, markup: &str) -> Result<()> {
        let context = self.tag_name(id).unwrap_or_else(|| "body".to_string());
        let namespace = self.namespace(id).unwrap_or_default();
        for child in self.children(id) {
            self.destroy(child);
        }
        let mut tree = self.inner.tree.borrow_mut();
        tree.node(id)?;
        parse::parse_into(&mut tree, id, &context, namespace, markup);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Hydration bookkeeping
    // ------------------------------------------------------------------

    /// Record `root` as hydrated. Returns `false` if it already was.
    pub(crate) fn mark_hydrated(&self, root: DomId) -> bool {
        self.inner.hydrated.borrow_mut().insert(root)
    }

    pub fn is_hydrated(&self, root: DomId) -> bool {
        self.inner.hydrated.borrow().contains(&root)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.node_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn list(doc: &Document, items: &[&str]) -> (DomId, Vec<DomId>) {
        let parent = doc.create_element("ul");
        let children = items
            .iter()
            .map(|text| {
                let item = doc.create_element("li");
                doc.append_child(item, doc.create_text_node(text)).unwrap();
                doc.append_child(parent, item).unwrap();
                item
            })
            .collect();
        (parent, children)
    }

    #[test]
    fn insert_before_moves_existing_child() {
        let doc = Document::new();
        let (parent, items) = list(&doc, &["a", "b", "c"]);

        doc.insert_before(parent, items[2], Some(items[0])).unwrap();
        assert_eq!(doc.children(parent), vec![items[2], items[0], items[1]]);
        assert_eq!(doc.previous_sibling(items[0]), Some(items[2]));
        assert_eq!(doc.next_sibling(items[1]), None);
    }

    #[test]
    fn appending_fragment_moves_its_children() {
        let doc = Document::new();
        let fragment = doc.create_fragment();
        let a = doc.create_text_node("a");
        let b = doc.create_comment("b");
        doc.append_child(fragment, a).unwrap();
        doc.append_child(fragment, b).unwrap();

        let parent = doc.create_element("div");
        doc.append_child(parent, fragment).unwrap();

        assert_eq!(doc.children(parent), vec![a, b]);
        assert!(doc.children(fragment).is_empty());
        assert_eq!(doc.parent(a), Some(parent));
    }

    #[test]
    fn cannot_insert_into_own_subtree() {
        let doc = Document::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        doc.append_child(outer, inner).unwrap();

        assert!(doc.append_child(inner, outer).is_err());
        assert!(doc.append_child(doc.create_text_node("x"), outer).is_err());
    }

    #[test]
    fn clone_is_deep_and_independent() {
        let doc = Document::new();
        let (parent, _) = list(&doc, &["a", "b"]);
        doc.set_attribute(parent, "class", "todo").unwrap();

        let copy = doc.clone_node(parent).unwrap();
        assert_eq!(doc.to_html(copy), doc.to_html(parent));

        let first = doc.first_child(copy).unwrap();
        doc.set_attribute(first, "id", "changed").unwrap();
        assert_ne!(doc.to_html(copy), doc.to_html(parent));
    }

    #[test]
    fn destroy_frees_whole_subtree() {
        let doc = Document::new();
        let (parent, items) = list(&doc, &["a", "b"]);
        assert_eq!(doc.node_count(), 5);

        doc.destroy(items[0]);
        assert_eq!(doc.node_count(), 3);
        assert_eq!(doc.children(parent), vec![items[1]]);

        doc.destroy(parent);
        assert_eq!(doc.node_count(), 0);
        doc.destroy(parent);
    }

    #[test]
    fn attributes_keep_insertion_order() {
        let doc = Document::new();
        let input = doc.create_element("input");
        doc.set_attribute(input, "type", "text").unwrap();
        doc.set_attribute(input, "disabled", "").unwrap();
        doc.set_attribute(input, "type", "email").unwrap();

        assert_eq!(doc.to_html(input), r#"<input type="email" disabled>"#);
        assert!(doc.remove_attribute(input, "disabled").unwrap());
        assert!(!doc.has_attribute(input, "disabled"));
    }

    #[test]
    fn events_bubble_and_detach() {
        let doc = Document::new();
        let (parent, items) = list(&doc, &["a"]);
        let hits = Rc::new(Cell::new(0));

        let inner = {
            let hits = Rc::clone(&hits);
            doc.add_event_listener(items[0], "click", move |event| {
                assert_eq!(event.current_target, event.target);
                hits.set(hits.get() + 1);
            })
            .unwrap()
        };
        {
            let hits = Rc::clone(&hits);
            doc.add_event_listener(parent, "click", move |_| hits.set(hits.get() + 10))
                .unwrap();
        }

        assert_eq!(doc.dispatch_event(items[0], "click").unwrap(), 2);
        assert_eq!(hits.get(), 11);

        assert!(doc.remove_event_listener(items[0], inner));
        assert_eq!(doc.dispatch_event(items[0], "click").unwrap(), 1);
        assert_eq!(doc.dispatch_event(items[0], "input").unwrap(), 0);
    }

    #[test]
    fn namespace_switching() {
        assert_eq!(Namespace::Html.enter("svg"), (Namespace::Svg, Namespace::Svg));
        assert_eq!(
            Namespace::Svg.enter("foreignObject"),
            (Namespace::Svg, Namespace::Html)
        );
        assert_eq!(Namespace::Html.enter("math"), (Namespace::MathMl, Namespace::MathMl));
        assert_eq!(Namespace::Svg.enter("circle"), (Namespace::Svg, Namespace::Svg));
    }
}
