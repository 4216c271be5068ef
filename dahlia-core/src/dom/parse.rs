//! Markup parsing.
//!
//! Fragments go through html5ever's fragment algorithm, the same one a
//! browser runs for `innerHTML`, so server output lands in the tree exactly
//! as a client would see it: adjacent text merged, character references
//! decoded, `script` bodies kept as raw text and foreign content namespaced.
//! The resulting `RcDom` is then copied into the arena.

use html5ever::tendril::TendrilSink;
use html5ever::{parse_fragment, LocalName, ParseOpts, QualName};
use indexmap::IndexMap;
use markup5ever_rcdom::{Handle, NodeData as Parsed, RcDom};
use tracing::trace;

use super::{Content, DomId, ElementData, Namespace, NodeData, Tree};

/// Parse `markup` as the children of an element named `context` in
/// `namespace`, appending the result to `parent`.
pub(crate) fn parse_into(tree: &mut Tree, parent: DomId, context: &str, namespace: Namespace, markup: &str) {
    let context = QualName::new(None, namespace.uri().into(), LocalName::from(context));
    let dom = parse_fragment(RcDom::default(), ParseOpts::default(), context.clone(), Vec::new()).one(markup);
    trace!(%parent, context = %context.local, bytes = markup.len(), "parsed fragment");

    // The fragment algorithm parks the parsed nodes under a synthetic
    // `<html>` element at the document root.
    let document = dom.document.children.borrow();
    for root in document.iter() {
        for child in root.children.borrow().iter() {
            copy(tree, parent, child);
        }
    }
}

fn copy(tree: &mut Tree, parent: DomId, handle: &Handle) {
    let content = match &handle.data {
        Parsed::Text { contents } => Content::Text(contents.borrow().to_string()),
        Parsed::Comment { contents } => Content::Comment(contents.to_string()),
        Parsed::Element { name, attrs, .. } => {
            let attributes = attrs
                .borrow()
                .iter()
                .map(|attr| {
                    let name = match &attr.name.prefix {
                        Some(prefix) => format!("{prefix}:{}", attr.name.local),
                        None => attr.name.local.to_string(),
                    };
                    (name, attr.value.to_string())
                })
                .collect();
            Content::Element(ElementData {
                tag: name.local.to_string(),
                namespace: namespace_of(name),
                attributes,
                properties: IndexMap::new(),
                listeners: Vec::new(),
            })
        }
        Parsed::Document | Parsed::Doctype { .. } | Parsed::ProcessingInstruction { .. } => return,
    };

    let id = tree.push(content);
    if let Some(node) = tree.nodes.get_mut(&id) {
        node.parent = Some(parent);
    }
    if let Some(NodeData { children, .. }) = tree.nodes.get_mut(&parent) {
        children.push(id);
    }

    for child in handle.children.borrow().iter() {
        copy(tree, id, child);
    }
    // `<template>` keeps its parsed body aside; flatten it back in.
    if let Parsed::Element { template_contents, .. } = &handle.data {
        if let Some(contents) = template_contents.borrow().as_ref() {
            for child in contents.children.borrow().iter() {
                copy(tree, id, child);
            }
        }
    }
}

fn namespace_of(name: &QualName) -> Namespace {
    [Namespace::Svg, Namespace::MathMl]
        .into_iter()
        .find(|namespace| &*name.ns == namespace.uri())
        .unwrap_or(Namespace::Html)
}
