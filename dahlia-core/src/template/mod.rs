//! Templates
//!
//! A [`Template`] is an immutable description of a static tree with holes
//! ("slots") for dynamic content. The same description drives both sides of
//! rendering: the materializer clones it into live nodes on the client, and
//! the SSR renderer walks it to emit markup with markers. Both walk it in the
//! same depth-first, pre-order sequence, so slot ids agree.
//!
//! # Slots
//!
//! | Node                 | Slot kind   | Materialized as             |
//! |----------------------|-------------|-----------------------------|
//! | `text_slot()`        | text        | empty text node             |
//! | `insertion_slot()`   | insertion   | empty comment (anchor)      |
//! | `block_slot()`       | block       | `dh:b:<id>` ... `/dh:b`     |
//! | element with `.on()` | element     | the element itself          |
//!
//! Event handlers are never materialized or serialized; declaring one only
//! turns the element into an anchor that bindings can attach listeners to.

mod materialize;

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::SlotKind;

pub use crate::dom::Namespace;
pub use materialize::{cache_size, materialize, Instance, SlotNode, TemplateFactory};
pub(crate) use materialize::TemplateCache;

/// Stable identity of a template, used as the clone-cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateId(u64);

impl TemplateId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A static attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// `true` renders a valueless attribute, `false` omits it.
    Bool(bool),
    /// Omitted.
    Null,
    Text(String),
    Number(f64),
    /// A live callback. Never rendered.
    Handler,
}

impl AttrValue {
    /// The attribute text this value renders to, or `None` when omitted.
    pub fn to_attribute(&self) -> Option<String> {
        match self {
            Self::Bool(true) => Some(String::new()),
            Self::Bool(false) | Self::Null | Self::Handler => None,
            Self::Text(text) => Some(text.clone()),
            Self::Number(number) => Some(number.to_string()),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// An element in a template.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: String,
    pub attributes: Vec<(String, AttrValue)>,
    pub children: Vec<TemplateNode>,
}

impl ElementNode {
    pub fn attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.push((name.to_string(), value.into()));
        self
    }

    /// Declare an event handler. `event` may be a bare event name (`click`)
    /// or a handler prop (`onClick`, `on:click`).
    pub fn on(mut self, event: &str) -> Self {
        let prop = if event.starts_with("on") {
            event.to_string()
        } else {
            format!("on:{event}")
        };
        self.attributes.push((prop, AttrValue::Handler));
        self
    }

    pub fn child(mut self, child: impl Into<TemplateNode>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = TemplateNode>) -> Self {
        self.children.extend(children);
        self
    }

    /// Whether any attribute is a handler, making this element a slot.
    pub fn is_anchor(&self) -> bool {
        self.attributes
            .iter()
            .any(|(_, value)| *value == AttrValue::Handler)
    }

    /// Void elements (`br`, `img`, ...) never materialize or render children.
    pub fn is_void(&self) -> bool {
        crate::dom::is_void_element(&self.tag)
    }

    /// Event names declared through handler attributes.
    pub fn events(&self) -> impl Iterator<Item = String> + '_ {
        self.attributes
            .iter()
            .filter(|(_, value)| *value == AttrValue::Handler)
            .map(|(name, _)| event_name(name))
    }
}

/// One node of a template tree.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    Element(ElementNode),
    Text(String),
    TextSlot,
    BlockSlot,
    InsertionSlot,
}

impl From<ElementNode> for TemplateNode {
    fn from(element: ElementNode) -> Self {
        Self::Element(element)
    }
}

impl From<&str> for TemplateNode {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

pub fn element(tag: &str) -> ElementNode {
    ElementNode {
        tag: tag.to_string(),
        attributes: Vec::new(),
        children: Vec::new(),
    }
}

/// An `<svg>` root element.
pub fn svg() -> ElementNode {
    element("svg")
}

pub fn text(text: &str) -> TemplateNode {
    TemplateNode::Text(text.to_string())
}

pub fn text_slot() -> TemplateNode {
    TemplateNode::TextSlot
}

pub fn block_slot() -> TemplateNode {
    TemplateNode::BlockSlot
}

pub fn insertion_slot() -> TemplateNode {
    TemplateNode::InsertionSlot
}

pub(crate) struct TemplateInner {
    id: TemplateId,
    children: Vec<TemplateNode>,
    slots: Vec<SlotKind>,
}

/// An immutable, identity-cached tree description.
///
/// Clones share identity, so they hit the same cache entry.
#[derive(Clone)]
pub struct Template {
    inner: Rc<TemplateInner>,
}

impl Template {
    pub fn new(children: Vec<TemplateNode>) -> Self {
        let mut slots = Vec::new();
        collect_slots(&children, &mut slots);
        Self {
            inner: Rc::new(TemplateInner {
                id: TemplateId::next(),
                children,
                slots,
            }),
        }
    }

    pub fn id(&self) -> TemplateId {
        self.inner.id
    }

    pub fn children(&self) -> &[TemplateNode] {
        &self.inner.children
    }

    /// Slot kinds in marker order; a slot's id is its index.
    pub fn slots(&self) -> &[SlotKind] {
        &self.inner.slots
    }

    pub(crate) fn downgrade(&self) -> std::rc::Weak<TemplateInner> {
        Rc::downgrade(&self.inner)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("id", &self.inner.id)
            .field("slots", &self.inner.slots)
            .finish()
    }
}

fn collect_slots(nodes: &[TemplateNode], slots: &mut Vec<SlotKind>) {
    for node in nodes {
        match node {
            TemplateNode::Element(element) => {
                if element.is_anchor() {
                    slots.push(SlotKind::Element);
                }
                if !element.is_void() {
                    collect_slots(&element.children, slots);
                }
            }
            TemplateNode::Text(_) => {}
            TemplateNode::TextSlot => slots.push(SlotKind::Text),
            TemplateNode::BlockSlot => slots.push(SlotKind::Block),
            TemplateNode::InsertionSlot => slots.push(SlotKind::Insertion),
        }
    }
}

/// Map a handler prop name to the event it listens for.
///
/// `on:foo` becomes `foo`, `onFooBar` becomes `foobar`, anything else is
/// lowercased as-is.
pub fn event_name(prop: &str) -> String {
    if let Some(name) = prop.strip_prefix("on:") {
        return name.to_string();
    }
    match prop.strip_prefix("on") {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_uppercase()) => rest.to_lowercase(),
        _ => prop.to_lowercase(),
    }
}
