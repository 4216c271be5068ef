//! Hydration
//!
//! Reattaches bindings to server-rendered markup without re-creating nodes.
//! The matcher makes one forward, pre-order walk over the root's subtree,
//! picking up marker comments and `data-dh` elements and checking them
//! against the template's slot sequence. Everything between a block's start
//! and end markers was produced by nested renders and is skipped; the region
//! is handed to the block binding as-is.
//!
//! # Example
//!
//! ```rust
//! use dahlia_core::dom::Document;
//! use dahlia_core::hydrate::{hydrate, Bindings};
//! use dahlia_core::reactive::{Runtime, Signal};
//! use dahlia_core::ssr::{render_tree, SlotValue};
//! use dahlia_core::template::{self, Template};
//!
//! let counter = Template::new(vec![template::element("p").child(template::text_slot()).into()]);
//! let html = render_tree(&counter, &[SlotValue::text(1)])?;
//!
//! let rt = Runtime::new();
//! let doc = Document::new();
//! let root = doc.create_element("main");
//! doc.set_inner_html(root, &html)?;
//!
//! let count = Signal::new(&rt, 1);
//! let (hydration, _scope) = rt.create_scope(|| {
//!     let count = count.clone();
//!     hydrate(&rt, &doc, root, &counter, Bindings::new().text(0, move || count.get().to_string()))
//! });
//! assert!(hydration?.is_some());
//!
//! count.set(2)?;
//! assert_eq!(doc.inner_html(root), "<p><!--dh:t:0-->2</p>");
//! # Ok::<(), dahlia_core::Error>(())
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bind::{bind_event, bind_insert, bind_text, Insert};
use crate::dom::{Document, DomId, Event, ListenerId, NodeType};
use crate::error::{Error, Result, SlotKind};
use crate::reactive::{Effect, Runtime};
use crate::ssr::{parse_anchor, Marker, ANCHOR_ATTRIBUTE};
use crate::template::{SlotNode, Template};

/// What to do when no text node follows a text marker.
///
/// An empty server value renders no text, so the browser-side parse leaves
/// nothing to reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingTextPolicy {
    /// Insert an empty text node after the marker.
    #[default]
    Create,
    /// Treat it as a hydration mismatch.
    Mismatch,
}

/// Hydration knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydrateOptions {
    pub missing_text: MissingTextPolicy,
}

/// A server-rendered block: its markers and the top-level nodes between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRegion {
    pub start: DomId,
    pub end: DomId,
    pub items: Vec<DomId>,
}

type BlockFn = Box<dyn FnOnce(BlockRegion) -> Result<()>>;

enum Binding {
    Text(Box<dyn Fn() -> String>),
    Event(String, Box<dyn Fn(&Event)>),
    Insert(Box<dyn Fn() -> Insert>),
    Block(BlockFn),
}

impl Binding {
    fn kind(&self) -> SlotKind {
        match self {
            Self::Text(_) => SlotKind::Text,
            Self::Event(..) => SlotKind::Element,
            Self::Insert(_) => SlotKind::Insertion,
            Self::Block(_) => SlotKind::Block,
        }
    }
}

/// Bindings to attach, by slot id.
#[derive(Default)]
pub struct Bindings {
    entries: Vec<(u32, Binding)>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive text slot `id`.
    pub fn text(mut self, id: u32, value: impl Fn() -> String + 'static) -> Self {
        self.entries.push((id, Binding::Text(Box::new(value))));
        self
    }

    /// Listen for `event` on the element anchored as `id`.
    pub fn on(mut self, id: u32, event: &str, handler: impl Fn(&Event) + 'static) -> Self {
        self.entries
            .push((id, Binding::Event(event.to_string(), Box::new(handler))));
        self
    }

    /// Drive insertion point `id`.
    pub fn insert(mut self, id: u32, value: impl Fn() -> Insert + 'static) -> Self {
        self.entries.push((id, Binding::Insert(Box::new(value))));
        self
    }

    /// Take over block `id`, typically by adopting its items into a
    /// reconciler.
    pub fn block(mut self, id: u32, f: impl FnOnce(BlockRegion) -> Result<()> + 'static) -> Self {
        self.entries.push((id, Binding::Block(Box::new(f))));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(id, binding)| (id, binding.kind())))
            .finish()
    }
}

/// The result of hydrating one root.
#[derive(Debug)]
pub struct Hydration {
    root: DomId,
    slots: Vec<SlotNode>,
    blocks: Vec<BlockRegion>,
    effects: Vec<Effect>,
    listeners: Vec<ListenerId>,
}

impl Hydration {
    pub fn root(&self) -> DomId {
        self.root
    }

    /// Matched slot nodes, indexed by slot id.
    pub fn slots(&self) -> &[SlotNode] {
        &self.slots
    }

    pub fn blocks(&self) -> &[BlockRegion] {
        &self.blocks
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn listeners(&self) -> &[ListenerId] {
        &self.listeners
    }
}

/// Hydrate `root` with default options.
///
/// Returns `Ok(None)` if `root` was already hydrated.
pub fn hydrate(
    runtime: &Runtime,
    document: &Document,
    root: DomId,
    template: &Template,
    bindings: Bindings,
) -> Result<Option<Hydration>> {
    hydrate_with(runtime, document, root, template, bindings, &HydrateOptions::default())
}

/// Hydrate `root`, binding inside the caller's current scope.
///
/// Bindings are checked against the template before the markup is touched,
/// and nothing is bound unless the whole subtree matches. If a binding fails,
/// whatever was attached before it is torn down again and the root stays
/// unhydrated, so the call can be retried.
pub fn hydrate_with(
    runtime: &Runtime,
    document: &Document,
    root: DomId,
    template: &Template,
    bindings: Bindings,
    options: &HydrateOptions,
) -> Result<Option<Hydration>> {
    if document.is_hydrated(root) {
        debug!(%root, "root already hydrated");
        return Ok(None);
    }
    if !document.contains(root) {
        return Err(Error::dom(format!("hydration root {root} does not exist")));
    }

    let expected = template.slots();
    for (id, binding) in &bindings.entries {
        let want = expected.get(*id as usize).copied();
        if want != Some(binding.kind()) {
            return Err(Error::computation(format_args!(
                "{} binding for slot {id}, but the template has {}",
                binding.kind(),
                want.map_or_else(|| "no such slot".to_string(), |kind| format!("a {kind} slot")),
            )));
        }
    }

    debug!(%root, template = ?template.id(), slots = expected.len(), "hydration started");
    let matched = Matcher::new(document, expected, options).run(root)?;
    let (slots, created) = matched.fill_missing_text(document)?;

    let mut hydration = Hydration {
        root,
        slots,
        blocks: Vec::new(),
        effects: Vec::new(),
        listeners: Vec::new(),
    };
    let mut listeners = Vec::new();
    if let Err(error) = attach(runtime, document, &mut hydration, &mut listeners, bindings.entries) {
        warn!(%root, %error, "binding failed, hydration rolled back");
        for effect in &hydration.effects {
            effect.dispose();
        }
        for (element, listener) in listeners {
            document.remove_event_listener(element, listener);
        }
        for node in created {
            document.destroy(node);
        }
        return Err(error);
    }
    hydration.listeners = listeners.into_iter().map(|(_, listener)| listener).collect();
    document.mark_hydrated(root);

    debug!(
        %root,
        effects = hydration.effects.len(),
        listeners = hydration.listeners.len(),
        blocks = hydration.blocks.len(),
        "hydration finished"
    );
    Ok(Some(hydration))
}

fn attach(
    runtime: &Runtime,
    document: &Document,
    hydration: &mut Hydration,
    listeners: &mut Vec<(DomId, ListenerId)>,
    entries: Vec<(u32, Binding)>,
) -> Result<()> {
    for (id, binding) in entries {
        let slot = hydration.slots[id as usize];
        match (binding, slot) {
            (Binding::Text(value), SlotNode::Text(node)) => {
                hydration.effects.push(bind_text(runtime, document, node, value)?);
            }
            (Binding::Event(event, handler), SlotNode::Element(node)) => {
                let listener = bind_event(runtime, document, node, &event, handler)?;
                listeners.push((node, listener));
            }
            (Binding::Insert(value), SlotNode::Insertion(node)) => {
                hydration.effects.push(bind_insert(runtime, document, node, value)?);
            }
            (Binding::Block(f), SlotNode::Block { start, end }) => {
                let region = block_region(document, start, end);
                hydration.blocks.push(region.clone());
                f(region)?;
            }
            (binding, slot) => {
                return Err(Error::computation(format_args!(
                    "{} binding cannot attach to {} slot {id}",
                    binding.kind(),
                    slot.kind(),
                )));
            }
        }
    }
    Ok(())
}

fn block_region(document: &Document, start: DomId, end: DomId) -> BlockRegion {
    let mut items = Vec::new();
    let mut cursor = document.next_sibling(start);
    while let Some(node) = cursor.filter(|node| *node != end) {
        items.push(node);
        cursor = document.next_sibling(node);
    }
    BlockRegion { start, end, items }
}

struct Matcher<'a> {
    document: &'a Document,
    expected: &'a [SlotKind],
    options: &'a HydrateOptions,
    found: Vec<SlotNode>,
    /// Text slots whose marker has no text node yet, by slot index.
    missing_text: Vec<(usize, DomId)>,
    /// Open block nesting; only depth 0 belongs to this template.
    depth: usize,
    open_block: Option<DomId>,
}

impl<'a> Matcher<'a> {
    fn new(document: &'a Document, expected: &'a [SlotKind], options: &'a HydrateOptions) -> Self {
        Self {
            document,
            expected,
            options,
            found: Vec::with_capacity(expected.len()),
            missing_text: Vec::new(),
            depth: 0,
            open_block: None,
        }
    }

    fn run(mut self, root: DomId) -> Result<Matched> {
        let mut stack: Vec<DomId> = self.document.children(root).into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            match self.document.node_type(node) {
                Some(NodeType::Comment) => self.comment(node)?,
                Some(NodeType::Element) => {
                    if self.depth == 0 {
                        self.element(node)?;
                    }
                    stack.extend(self.document.children(node).into_iter().rev());
                }
                _ => {}
            }
        }

        if self.depth > 0 {
            return Err(Error::HydrationMismatch {
                marker: self.found.len() as u32,
                kind: SlotKind::Block,
                expected: format!("marker {}", Marker::BlockEnd),
                found: "end of markup".to_string(),
            });
        }
        if let Some(kind) = self.expected.get(self.found.len()) {
            let id = self.found.len() as u32;
            return Err(Error::HydrationMismatch {
                marker: id,
                kind: *kind,
                expected: describe(*kind, id),
                found: "end of markup".to_string(),
            });
        }
        Ok(Matched {
            slots: self.found,
            missing_text: self.missing_text,
        })
    }

    fn comment(&mut self, node: DomId) -> Result<()> {
        let data = self.document.data(node).unwrap_or_default();
        let Some(marker) = Marker::parse(&data) else {
            return Ok(());
        };
        match marker {
            Marker::BlockStart(id) => {
                if self.depth == 0 {
                    self.expect_slot(SlotKind::Block, id, || format!("marker {marker}"))?;
                    self.open_block = Some(node);
                }
                self.depth += 1;
            }
            Marker::BlockEnd => match self.depth {
                0 => {
                    let id = self.found.len() as u32;
                    return Err(Error::HydrationMismatch {
                        marker: id,
                        kind: self.expected.get(id as usize).copied().unwrap_or(SlotKind::Block),
                        expected: "an open block".to_string(),
                        found: format!("marker {marker}"),
                    });
                }
                1 => {
                    self.depth = 0;
                    if let Some(start) = self.open_block.take() {
                        self.found.push(SlotNode::Block { start, end: node });
                    }
                }
                _ => self.depth -= 1,
            },
            Marker::Text(id) if self.depth == 0 => {
                self.expect_slot(SlotKind::Text, id, || format!("marker {marker}"))?;
                match self.text_after(node, id)? {
                    Some(text) => self.found.push(SlotNode::Text(text)),
                    None => {
                        // Stands in for the text node until matching succeeds.
                        self.missing_text.push((self.found.len(), node));
                        self.found.push(SlotNode::Text(node));
                    }
                }
            }
            Marker::Insertion(id) if self.depth == 0 => {
                self.expect_slot(SlotKind::Insertion, id, || format!("marker {marker}"))?;
                self.found.push(SlotNode::Insertion(node));
            }
            Marker::Text(_) | Marker::Insertion(_) => {}
        }
        Ok(())
    }

    fn element(&mut self, node: DomId) -> Result<()> {
        let Some(value) = self.document.attribute(node, ANCHOR_ATTRIBUTE) else {
            return Ok(());
        };
        let tag = self.document.tag_name(node).unwrap_or_default();
        let found = || format!("element <{tag} {ANCHOR_ATTRIBUTE}=\"{value}\">");
        let Some(id) = parse_anchor(&value) else {
            let index = self.found.len() as u32;
            return Err(Error::HydrationMismatch {
                marker: index,
                kind: SlotKind::Element,
                expected: describe(SlotKind::Element, index),
                found: found(),
            });
        };
        self.expect_slot(SlotKind::Element, id, found)?;
        self.found.push(SlotNode::Element(node));
        Ok(())
    }

    /// Check that the next expected slot is `kind` with id `id`.
    fn expect_slot(&self, kind: SlotKind, id: u32, found: impl FnOnce() -> String) -> Result<()> {
        let index = self.found.len();
        match self.expected.get(index) {
            Some(want) if *want == kind && id as usize == index => Ok(()),
            Some(want) => Err(Error::HydrationMismatch {
                marker: index as u32,
                kind: *want,
                expected: describe(*want, index as u32),
                found: found(),
            }),
            None => Err(Error::HydrationMismatch {
                marker: id,
                kind,
                expected: "end of template".to_string(),
                found: found(),
            }),
        }
    }

    /// The text node after a text marker, or `None` if one must be created.
    fn text_after(&self, marker: DomId, id: u32) -> Result<Option<DomId>> {
        let next = self.document.next_sibling(marker);
        if let Some(node) = next.filter(|node| self.document.node_type(*node) == Some(NodeType::Text)) {
            return Ok(Some(node));
        }
        match self.options.missing_text {
            MissingTextPolicy::Create => Ok(None),
            MissingTextPolicy::Mismatch => Err(Error::HydrationMismatch {
                marker: id,
                kind: SlotKind::Text,
                expected: "a text node".to_string(),
                found: next.map_or_else(
                    || "end of parent".to_string(),
                    |node| describe_node(self.document, node),
                ),
            }),
        }
    }
}

/// A successful match. Nothing in the document has been touched yet.
struct Matched {
    slots: Vec<SlotNode>,
    missing_text: Vec<(usize, DomId)>,
}

impl Matched {
    /// Insert an empty text node after each bare text marker. Returns the
    /// slots and the nodes created.
    fn fill_missing_text(mut self, document: &Document) -> Result<(Vec<SlotNode>, Vec<DomId>)> {
        let mut created = Vec::with_capacity(self.missing_text.len());
        for (index, marker) in self.missing_text {
            let inserted = document
                .parent(marker)
                .ok_or_else(|| Error::dom(format!("text marker {marker} is detached")))
                .and_then(|parent| {
                    let node = document.create_text_node("");
                    document.insert_before(parent, node, document.next_sibling(marker))?;
                    Ok(node)
                });
            let node = match inserted {
                Ok(node) => node,
                Err(error) => {
                    for node in created {
                        document.destroy(node);
                    }
                    return Err(error);
                }
            };
            warn!(marker = index, "no text after text marker, inserted an empty node");
            self.slots[index] = SlotNode::Text(node);
            created.push(node);
        }
        Ok((self.slots, created))
    }
}

fn describe(kind: SlotKind, id: u32) -> String {
    match kind {
        SlotKind::Text => format!("marker {}", Marker::Text(id)),
        SlotKind::Insertion => format!("marker {}", Marker::Insertion(id)),
        SlotKind::Block => format!("marker {}", Marker::BlockStart(id)),
        SlotKind::Element => format!("element with {ANCHOR_ATTRIBUTE}=\"{id}\""),
    }
}

fn describe_node(document: &Document, node: DomId) -> String {
    match document.node_type(node) {
        Some(NodeType::Element) => format!("element <{}>", document.tag_name(node).unwrap_or_default()),
        Some(NodeType::Comment) => format!("comment `{}`", document.data(node).unwrap_or_default()),
        Some(NodeType::Text) => "text".to_string(),
        Some(NodeType::Fragment) | None => format!("node {node}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use crate::ssr::{render_tree, SlotValue};
    use crate::template::{block_slot, element, insertion_slot, text, text_slot};
    use std::cell::Cell;
    use std::rc::Rc;

    fn mount(doc: &Document, html: &str) -> DomId {
        let root = doc.create_element("div");
        doc.set_inner_html(root, html).unwrap();
        root
    }

    fn counter() -> Template {
        Template::new(vec![element("section")
            .child(element("button").on("click").child(text("+")))
            .child(text_slot())
            .child(text(" clicks"))
            .into()])
    }

    #[test]
    fn round_trip_reuses_server_nodes() {
        let template = counter();
        let html = render_tree(&template, &[SlotValue::Empty, SlotValue::text(0)]).unwrap();
        let rt = Runtime::new();
        let doc = Document::new();
        let root = mount(&doc, &html);
        let before = doc.node_count();

        let count = Signal::new(&rt, 0);
        let (hydration, _scope) = rt.create_scope(|| {
            let shown = count.clone();
            let clicked = count.clone();
            hydrate(
                &rt,
                &doc,
                root,
                &template,
                Bindings::new()
                    .on(0, "click", move |_| {
                        clicked.update(|n| *n += 1).ok();
                    })
                    .text(1, move || shown.get().to_string()),
            )
        });
        let hydration = hydration.unwrap().unwrap();
        assert_eq!(doc.node_count(), before);
        assert_eq!(hydration.slots().len(), 2);

        let SlotNode::Element(button) = hydration.slots()[0] else {
            panic!("expected the button anchor");
        };
        doc.dispatch_event(button, "click").unwrap();
        doc.dispatch_event(button, "click").unwrap();
        assert_eq!(doc.text_content(root), "+2 clicks");
    }

    #[test]
    fn second_call_binds_nothing() {
        let template = counter();
        let html = render_tree(&template, &[SlotValue::Empty, SlotValue::text(0)]).unwrap();
        let rt = Runtime::new();
        let doc = Document::new();
        let root = mount(&doc, &html);

        let hits = Rc::new(Cell::new(0));
        let ((), _scope) = rt.create_scope(|| {
            for _ in 0..2 {
                let hits = Rc::clone(&hits);
                hydrate(
                    &rt,
                    &doc,
                    root,
                    &template,
                    Bindings::new().on(0, "click", move |_| hits.set(hits.get() + 1)),
                )
                .unwrap();
            }
        });

        let button = doc.first_child(doc.first_child(root).unwrap()).unwrap();
        doc.dispatch_event(button, "click").unwrap();
        assert_eq!(hits.get(), 1);
        assert!(doc.is_hydrated(root));
    }

    #[test]
    fn divergent_markup_is_a_mismatch() {
        let template = counter();
        let rt = Runtime::new();
        let doc = Document::new();
        let root = mount(&doc, "<section><button>+</button><!--dh:t:0-->0 clicks</section>");

        let (result, _scope) = rt.create_scope(|| hydrate(&rt, &doc, root, &template, Bindings::new()));
        let err = result.unwrap_err();
        assert_eq!(
            err,
            Error::HydrationMismatch {
                marker: 0,
                kind: SlotKind::Element,
                expected: "element with data-dh=\"0\"".to_string(),
                found: "marker dh:t:0".to_string(),
            }
        );
        assert!(!doc.is_hydrated(root));
    }

    #[test]
    fn missing_markers_are_reported() {
        let template = Template::new(vec![text_slot(), insertion_slot()]);
        let rt = Runtime::new();
        let doc = Document::new();
        let root = mount(&doc, "<!--dh:t:0-->x");

        let (result, _scope) = rt.create_scope(|| hydrate(&rt, &doc, root, &template, Bindings::new()));
        assert!(matches!(
            result,
            Err(Error::HydrationMismatch { marker: 1, kind: SlotKind::Insertion, .. })
        ));
    }

    #[test]
    fn block_contents_are_skipped_and_handed_over() {
        let template = Template::new(vec![element("ul").child(block_slot()).into(), text_slot()]);
        let item = Template::new(vec![element("li").child(text_slot()).into()]);
        let items: Vec<String> = ["a", "b"]
            .iter()
            .map(|v| render_tree(&item, &[SlotValue::text(v)]).unwrap())
            .collect();
        let html = render_tree(&template, &[SlotValue::Block(items), SlotValue::text("done")]).unwrap();

        let rt = Runtime::new();
        let doc = Document::new();
        let root = mount(&doc, &html);
        let seen = Rc::new(Cell::new(0));

        let (hydration, _scope) = rt.create_scope(|| {
            let seen = Rc::clone(&seen);
            hydrate(
                &rt,
                &doc,
                root,
                &template,
                Bindings::new().block(0, move |region| {
                    seen.set(region.items.len());
                    Ok(())
                }),
            )
        });
        let hydration = hydration.unwrap().unwrap();
        assert_eq!(seen.get(), 2);
        assert_eq!(hydration.blocks().len(), 1);
        assert_eq!(hydration.slots()[1].kind(), SlotKind::Text);
    }

    #[test]
    fn unterminated_block_is_a_mismatch() {
        let template = Template::new(vec![block_slot()]);
        let rt = Runtime::new();
        let doc = Document::new();
        let root = mount(&doc, "<!--dh:b:0--><li></li>");

        let (result, _scope) = rt.create_scope(|| hydrate(&rt, &doc, root, &template, Bindings::new()));
        assert!(matches!(
            result,
            Err(Error::HydrationMismatch { kind: SlotKind::Block, .. })
        ));
    }

    #[test]
    fn missing_text_follows_policy() {
        let template = Template::new(vec![element("p").child(text_slot()).into()]);
        let html = render_tree(&template, &[]).unwrap();
        let rt = Runtime::new();

        let doc = Document::new();
        let root = mount(&doc, &html);
        let (result, _scope) = rt.create_scope(|| hydrate(&rt, &doc, root, &template, Bindings::new()));
        let hydration = result.unwrap().unwrap();
        let SlotNode::Text(node) = hydration.slots()[0] else {
            panic!("expected a text slot");
        };
        assert_eq!(doc.data(node).as_deref(), Some(""));

        let doc = Document::new();
        let root = mount(&doc, &html);
        let options = HydrateOptions {
            missing_text: MissingTextPolicy::Mismatch,
        };
        let (result, _scope) =
            rt.create_scope(|| hydrate_with(&rt, &doc, root, &template, Bindings::new(), &options));
        assert!(matches!(
            result,
            Err(Error::HydrationMismatch { kind: SlotKind::Text, .. })
        ));
    }

    #[test]
    fn mismatch_after_missing_text_leaves_markup_untouched() {
        let template = Template::new(vec![element("p").child(text_slot()).into(), insertion_slot()]);
        let rt = Runtime::new();
        let doc = Document::new();
        let root = mount(&doc, "<p><!--dh:t:0--></p>");
        let before = doc.node_count();

        let (result, _scope) = rt.create_scope(|| hydrate(&rt, &doc, root, &template, Bindings::new()));
        assert!(matches!(
            result,
            Err(Error::HydrationMismatch { marker: 1, kind: SlotKind::Insertion, .. })
        ));
        assert_eq!(doc.node_count(), before);
        assert_eq!(doc.inner_html(root), "<p><!--dh:t:0--></p>");
    }

    #[test]
    fn failed_binding_rolls_back_and_allows_retry() {
        let template = Template::new(vec![
            element("button").on("click").child(text_slot()).into(),
            element("ul").child(block_slot()).into(),
        ]);
        let html = render_tree(&template, &[SlotValue::Empty, SlotValue::text("go")]).unwrap();
        let rt = Runtime::new();
        let doc = Document::new();
        let root = mount(&doc, &html);
        let label = Signal::new(&rt, "live".to_string());
        let clicks = Rc::new(Cell::new(0));

        let bindings = || {
            let label = label.clone();
            let clicks = Rc::clone(&clicks);
            Bindings::new()
                .on(0, "click", move |_| clicks.set(clicks.get() + 1))
                .text(1, move || label.get())
        };

        let (first, _scope) = rt.create_scope(|| {
            hydrate(
                &rt,
                &doc,
                root,
                &template,
                bindings().block(2, |_| Err(Error::computation("boom"))),
            )
        });
        assert!(matches!(first, Err(Error::Computation { .. })));
        assert!(!doc.is_hydrated(root));

        let button = doc.first_child(root).unwrap();
        assert_eq!(doc.listener_count(button), 0);
        label.set("ignored".to_string()).unwrap();
        assert_eq!(doc.text_content(button), "live");

        let (second, _scope) =
            rt.create_scope(|| hydrate(&rt, &doc, root, &template, bindings().block(2, |_| Ok(()))));
        assert!(second.unwrap().is_some());
        assert!(doc.is_hydrated(root));

        doc.dispatch_event(button, "click").unwrap();
        assert_eq!(clicks.get(), 1);
        label.set("again".to_string()).unwrap();
        assert_eq!(doc.text_content(button), "again");
    }

    #[test]
    fn bindings_are_checked_against_the_template() {
        let template = counter();
        let rt = Runtime::new();
        let doc = Document::new();
        let root = mount(&doc, "");

        let (result, _scope) = rt.create_scope(|| {
            hydrate(&rt, &doc, root, &template, Bindings::new().text(0, String::new))
        });
        assert!(matches!(result, Err(Error::Computation { .. })));
    }

    #[test]
    fn options_deserialize() {
        let options: HydrateOptions = serde_json::from_str(r#"{"missing_text":"mismatch"}"#).unwrap();
        assert_eq!(options.missing_text, MissingTextPolicy::Mismatch);
        let options: HydrateOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, HydrateOptions::default());
    }
}
