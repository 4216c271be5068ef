//! Template materialization with a per-document clone cache.
//!
//! The first materialization of a template in a document builds a detached
//! prototype fragment and records where each slot sits in it. Every
//! instantiation after that is a deep clone of the prototype plus a walk down
//! the recorded paths, so building a template costs one tree walk no matter
//! how many times it is stamped out.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::{Namespace, Template, TemplateId, TemplateInner, TemplateNode};
use crate::dom::{Document, DomId};
use crate::error::{Error, Result, SlotKind};
use crate::ssr::Marker;

/// A slot's position in a prototype, as child indices from the fragment.
#[derive(Debug, Clone)]
struct SlotPath {
    kind: SlotKind,
    path: Vec<usize>,
}

struct CacheEntry {
    template: Weak<TemplateInner>,
    prototype: DomId,
    slots: Rc<[SlotPath]>,
}

/// Prototype fragments of one document, keyed by template identity.
#[derive(Default)]
pub(crate) struct TemplateCache {
    entries: HashMap<(TemplateId, Namespace), CacheEntry>,
}

impl TemplateCache {
    /// Drop entries whose template is gone, returning their prototypes.
    fn prune(&mut self) -> Vec<DomId> {
        let mut evicted = Vec::new();
        self.entries.retain(|_, entry| {
            let live = entry.template.strong_count() > 0;
            if !live {
                evicted.push(entry.prototype);
            }
            live
        });
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// A live node standing in for one template slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotNode {
    Text(DomId),
    Insertion(DomId),
    Block { start: DomId, end: DomId },
    Element(DomId),
}

impl SlotNode {
    pub fn kind(&self) -> SlotKind {
        match self {
            Self::Text(_) => SlotKind::Text,
            Self::Insertion(_) => SlotKind::Insertion,
            Self::Block { .. } => SlotKind::Block,
            Self::Element(_) => SlotKind::Element,
        }
    }

    /// The node a binding attaches to. For blocks this is the start marker.
    pub fn node(&self) -> DomId {
        match *self {
            Self::Text(id) | Self::Insertion(id) | Self::Element(id) => id,
            Self::Block { start, .. } => start,
        }
    }
}

/// One stamped-out copy of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    fragment: DomId,
    slots: Vec<SlotNode>,
}

impl Instance {
    /// The fragment holding the copy. Appending it moves its children out.
    pub fn fragment(&self) -> DomId {
        self.fragment
    }

    /// Slot nodes in marker order.
    pub fn slots(&self) -> &[SlotNode] {
        &self.slots
    }

    pub fn slot(&self, id: usize) -> Option<SlotNode> {
        self.slots.get(id).copied()
    }
}

/// Stamps out instances of one template in one document.
///
/// Two factories compare equal when they share a prototype, which is how a
/// cache hit can be observed.
#[derive(Clone)]
pub struct TemplateFactory {
    document: Document,
    template: Template,
    prototype: DomId,
    slots: Rc<[SlotPath]>,
}

impl TemplateFactory {
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Clone the prototype and locate its slots.
    pub fn instantiate(&self) -> Result<Instance> {
        let fragment = self.document.clone_node(self.prototype)?;
        let slots = self
            .slots
            .iter()
            .map(|slot| {
                let node = resolve(&self.document, fragment, &slot.path)?;
                Ok(match slot.kind {
                    SlotKind::Text => SlotNode::Text(node),
                    SlotKind::Insertion => SlotNode::Insertion(node),
                    SlotKind::Element => SlotNode::Element(node),
                    SlotKind::Block => SlotNode::Block {
                        start: node,
                        end: self
                            .document
                            .next_sibling(node)
                            .ok_or_else(|| Error::dom("block slot lost its end marker"))?,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        trace!(template = ?self.template.id(), slots = slots.len(), "instantiate");
        Ok(Instance { fragment, slots })
    }
}

impl PartialEq for TemplateFactory {
    fn eq(&self, other: &Self) -> bool {
        self.document.ptr_eq(&other.document) && self.prototype == other.prototype
    }
}

impl std::fmt::Debug for TemplateFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateFactory")
            .field("template", &self.template.id())
            .field("prototype", &self.prototype)
            .finish()
    }
}

/// Get a factory for `template` in `document`, building its prototype on
/// first use.
///
/// # Example
///
/// ```rust
/// use dahlia_core::dom::Document;
/// use dahlia_core::template::{self, materialize, Namespace, Template};
///
/// let doc = Document::new();
/// let row = Template::new(vec![template::element("li").child(template::text_slot()).into()]);
///
/// let first = materialize(&doc, &row, Namespace::Html)?;
/// let again = materialize(&doc, &row, Namespace::Html)?;
/// assert_eq!(first, again);
///
/// let a = first.instantiate()?;
/// let b = first.instantiate()?;
/// assert_ne!(a.fragment(), b.fragment());
/// # Ok::<(), dahlia_core::Error>(())
/// ```
pub fn materialize(document: &Document, template: &Template, namespace: Namespace) -> Result<TemplateFactory> {
    let key = (template.id(), namespace);
    let evicted = document.templates().borrow_mut().prune();
    for prototype in evicted {
        document.destroy(prototype);
    }

    if let Some(entry) = document.templates().borrow().entries.get(&key) {
        trace!(template = ?key.0, "template cache hit");
        return Ok(TemplateFactory {
            document: document.clone(),
            template: template.clone(),
            prototype: entry.prototype,
            slots: Rc::clone(&entry.slots),
        });
    }

    let prototype = document.create_fragment();
    let mut slots = Vec::new();
    build(
        document,
        prototype,
        template.children(),
        namespace,
        &mut Vec::new(),
        &mut slots,
    )?;
    let slots: Rc<[SlotPath]> = slots.into();
    debug!(template = ?key.0, ?namespace, slots = slots.len(), "template prototype built");

    document.templates().borrow_mut().entries.insert(
        key,
        CacheEntry {
            template: template.downgrade(),
            prototype,
            slots: Rc::clone(&slots),
        },
    );
    Ok(TemplateFactory {
        document: document.clone(),
        template: template.clone(),
        prototype,
        slots,
    })
}

/// Number of prototypes currently cached for `document`.
pub fn cache_size(document: &Document) -> usize {
    document.templates().borrow().len()
}

fn build(
    doc: &Document,
    parent: DomId,
    nodes: &[TemplateNode],
    namespace: Namespace,
    path: &mut Vec<usize>,
    slots: &mut Vec<SlotPath>,
) -> Result<()> {
    let mut index = 0;
    for node in nodes {
        path.push(index);
        match node {
            TemplateNode::Element(element) => {
                let (own, inner) = namespace.enter(&element.tag);
                let id = doc.create_element_ns(&element.tag, own);
                for (name, value) in &element.attributes {
                    if let Some(value) = value.to_attribute() {
                        doc.set_attribute(id, name, &value)?;
                    }
                }
                doc.append_child(parent, id)?;
                if element.is_anchor() {
                    slots.push(SlotPath {
                        kind: SlotKind::Element,
                        path: path.clone(),
                    });
                }
                if !element.is_void() {
                    build(doc, id, &element.children, inner, path, slots)?;
                }
            }
            TemplateNode::Text(text) => {
                doc.append_child(parent, doc.create_text_node(text))?;
            }
            TemplateNode::TextSlot => {
                doc.append_child(parent, doc.create_text_node(""))?;
                slots.push(SlotPath {
                    kind: SlotKind::Text,
                    path: path.clone(),
                });
            }
            TemplateNode::InsertionSlot => {
                doc.append_child(parent, doc.create_comment(""))?;
                slots.push(SlotPath {
                    kind: SlotKind::Insertion,
                    path: path.clone(),
                });
            }
            TemplateNode::BlockSlot => {
                let id = u32::try_from(slots.len()).map_err(|_| Error::dom("too many slots"))?;
                let start = Marker::BlockStart(id).to_string();
                doc.append_child(parent, doc.create_comment(&start))?;
                doc.append_child(parent, doc.create_comment(&Marker::BlockEnd.to_string()))?;
                slots.push(SlotPath {
                    kind: SlotKind::Block,
                    path: path.clone(),
                });
                index += 1;
            }
        }
        path.pop();
        index += 1;
    }
    Ok(())
}

fn resolve(doc: &Document, root: DomId, path: &[usize]) -> Result<DomId> {
    path.iter().try_fold(root, |node, index| {
        doc.children(node)
            .get(*index)
            .copied()
            .ok_or_else(|| Error::dom(format!("slot path {path:?} does not resolve")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeType;
    use crate::template::{block_slot, element, insertion_slot, svg, text, text_slot};

    fn card() -> Template {
        Template::new(vec![element("div")
            .attr("class", "card")
            .attr("hidden", false)
            .attr("draggable", true)
            .child(element("h2").child(text_slot()))
            .child(element("button").on("click").child(text("Go")))
            .child(element("ul").child(block_slot()))
            .child(insertion_slot())
            .into()])
    }

    #[test]
    fn first_materialization_builds_prototype() {
        let doc = Document::new();
        let template = card();
        let factory = materialize(&doc, &template, Namespace::Html).unwrap();
        let instance = factory.instantiate().unwrap();

        assert_eq!(
            doc.to_html(instance.fragment()),
            r#"<div class="card" draggable><h2></h2><button>Go</button><ul><!--dh:b:2--><!--/dh:b--></ul><!----></div>"#
        );
        assert_eq!(cache_size(&doc), 1);
    }

    #[test]
    fn second_materialization_hits_cache() {
        let doc = Document::new();
        let template = card();
        let first = materialize(&doc, &template, Namespace::Html).unwrap();
        let second = materialize(&doc, &template.clone(), Namespace::Html).unwrap();
        assert_eq!(first, second);

        let other = materialize(&doc, &card(), Namespace::Html).unwrap();
        assert_ne!(first, other);
    }

    #[test]
    fn slots_resolve_in_marker_order() {
        let doc = Document::new();
        let instance = materialize(&doc, &card(), Namespace::Html)
            .unwrap()
            .instantiate()
            .unwrap();
        let slots = instance.slots();

        let kinds: Vec<SlotKind> = slots.iter().map(SlotNode::kind).collect();
        assert_eq!(kinds, card().slots());
        assert_eq!(doc.node_type(slots[0].node()), Some(NodeType::Text));
        assert_eq!(doc.tag_name(slots[1].node()).as_deref(), Some("button"));
        let SlotNode::Block { start, end } = slots[2] else {
            panic!("expected a block slot");
        };
        assert_eq!(doc.next_sibling(start), Some(end));
        assert_eq!(doc.node_type(slots[3].node()), Some(NodeType::Comment));
    }

    #[test]
    fn instances_are_independent() {
        let doc = Document::new();
        let factory = materialize(&doc, &card(), Namespace::Html).unwrap();
        let a = factory.instantiate().unwrap();
        let b = factory.instantiate().unwrap();

        doc.set_data(a.slots()[0].node(), "changed").unwrap();
        assert_eq!(doc.text_content(b.fragment()), "Go");
        assert_ne!(doc.to_html(a.fragment()), doc.to_html(b.fragment()));
    }

    #[test]
    fn svg_and_foreign_object_namespaces() {
        let doc = Document::new();
        let template = Template::new(vec![svg()
            .child(element("circle").attr("r", 4))
            .child(element("foreignObject").child(element("p")))
            .into()]);
        let instance = materialize(&doc, &template, Namespace::Html)
            .unwrap()
            .instantiate()
            .unwrap();

        let root = doc.first_child(instance.fragment()).unwrap();
        let children = doc.children(root);
        let p = doc.first_child(children[1]).unwrap();
        assert_eq!(doc.namespace(root), Some(Namespace::Svg));
        assert_eq!(doc.namespace(children[0]), Some(Namespace::Svg));
        assert_eq!(doc.namespace(p), Some(Namespace::Html));
    }

    #[test]
    fn dropped_template_is_evicted() {
        let doc = Document::new();
        let template = card();
        materialize(&doc, &template, Namespace::Html).unwrap();
        let nodes = doc.node_count();
        assert!(nodes > 0);
        drop(template);

        materialize(&doc, &Template::new(vec![text("x")]), Namespace::Html).unwrap();
        assert_eq!(cache_size(&doc), 1);
        assert_eq!(doc.node_count(), 2);
    }
}
