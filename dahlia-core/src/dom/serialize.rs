//! Markup serialization.

use std::borrow::Cow;

use super::{is_void_element, Content, DomId, Tree};

/// Escape text content: `&`, `<` and `>`.
pub fn escape_text(input: &str) -> Cow<'_, str> {
    escape(input, false)
}

/// Escape an attribute value: everything [`escape_text`] escapes plus `"`.
pub fn escape_attribute(input: &str) -> Cow<'_, str> {
    escape(input, true)
}

fn escape(input: &str, quotes: bool) -> Cow<'_, str> {
    let needs_escape = |ch: char| matches!(ch, '&' | '<' | '>') || (quotes && ch == '"');
    if !input.contains(needs_escape) {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len() + 8);
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if quotes => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

fn is_raw_text(tag: &str) -> bool {
    tag.eq_ignore_ascii_case("script") || tag.eq_ignore_ascii_case("style")
}

pub(crate) fn write_node(tree: &Tree, id: DomId, out: &mut String) {
    let Some(node) = tree.nodes.get(&id) else {
        return;
    };
    match &node.content {
        Content::Text(text) => {
            let raw = node
                .parent
                .and_then(|parent| tree.nodes.get(&parent))
                .and_then(|parent| parent.element())
                .is_some_and(|parent| is_raw_text(&parent.tag));
            if raw {
                out.push_str(text);
            } else {
                out.push_str(&escape_text(text));
            }
        }
        Content::Comment(data) => {
            out.push_str("<!--");
            out.push_str(data);
            out.push_str("-->");
        }
        Content::Fragment => {
            for child in &node.children {
                write_node(tree, *child, out);
            }
        }
        Content::Element(element) => {
            out.push('<');
            out.push_str(&element.tag);
            for (name, value) in &element.attributes {
                out.push(' ');
                out.push_str(name);
                if !value.is_empty() {
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(value));
                    out.push('"');
                }
            }
            out.push('>');
            if is_void_element(&element.tag) {
                return;
            }
            for child in &node.children {
                write_node(tree, *child, out);
            }
            out.push_str("</");
            out.push_str(&element.tag);
            out.push('>');
        }
    }
}
