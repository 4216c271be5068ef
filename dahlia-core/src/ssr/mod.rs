//! Server-Side Rendering
//!
//! Renders a [`Template`] to markup in one depth-first, pre-order walk,
//! leaving a marker at every slot so the client can hydrate the result
//! without re-creating nodes. Ids are issued from 0 per render in the same
//! order as [`Template::slots`], so a slot's id is its index.
//!
//! | Slot      | Output                                                   |
//! |-----------|----------------------------------------------------------|
//! | text      | `<!--dh:t:N-->` then the escaped value                   |
//! | insertion | `<!--dh:i:N-->`                                          |
//! | block     | `<!--dh:b:N-->`, each pre-rendered item, `<!--/dh:b-->`  |
//! | element   | the element, with `data-dh="N"` added                    |
//!
//! A text value followed by static text would merge with it into one text
//! node when parsed, so an empty `<!---->` comment separates the two.

mod marker;
mod state;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dom::{escape_attribute, escape_text};
use crate::error::{Error, Result};
use crate::template::{Template, TemplateNode};

pub use marker::{parse_anchor, Marker, ANCHOR_ATTRIBUTE};
pub use state::{extract_state, extract_state_with, parse_state, serialize_state, State, StateValue};

/// Rendering knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Flag attribute identifying the state script element.
    pub state_attribute: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            state_attribute: "data-dh-state".to_string(),
        }
    }
}

/// The dynamic value for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SlotValue {
    /// Insertion points and element anchors take no value.
    #[default]
    Empty,
    Text(String),
    /// Already rendered items of a block, in order.
    Block(Vec<String>),
}

impl SlotValue {
    pub fn text(value: impl ToString) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<&str> for SlotValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SlotValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<String>> for SlotValue {
    fn from(items: Vec<String>) -> Self {
        Self::Block(items)
    }
}

struct Renderer<'a> {
    values: &'a [SlotValue],
    next_id: u32,
    out: String,
}

impl<'a> Renderer<'a> {
    fn take_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn value(&self, id: u32) -> &'a SlotValue {
        const EMPTY: &SlotValue = &SlotValue::Empty;
        usize::try_from(id)
            .ok()
            .and_then(|index| self.values.get(index))
            .unwrap_or(EMPTY)
    }

    fn nodes(&mut self, nodes: &[TemplateNode]) -> Result<()> {
        for (index, node) in nodes.iter().enumerate() {
            self.node(node)?;
            let next_is_text = matches!(nodes.get(index + 1), Some(TemplateNode::Text(_)));
            if matches!(node, TemplateNode::TextSlot) && next_is_text {
                self.out.push_str("<!---->");
            }
        }
        Ok(())
    }

    fn node(&mut self, node: &TemplateNode) -> Result<()> {
        match node {
            TemplateNode::Element(element) => {
                self.out.push('<');
                self.out.push_str(&element.tag);
                if element.is_anchor() {
                    let id = self.take_id();
                    self.out
                        .push_str(&format!(" {ANCHOR_ATTRIBUTE}=\"{id}\""));
                }
                for (name, value) in &element.attributes {
                    let Some(value) = value.to_attribute() else {
                        continue;
                    };
                    self.out.push(' ');
                    self.out.push_str(name);
                    if !value.is_empty() {
                        self.out.push_str("=\"");
                        self.out.push_str(&escape_attribute(&value));
                        self.out.push('"');
                    }
                }
                self.out.push('>');
                if element.is_void() {
                    return Ok(());
                }
                self.nodes(&element.children)?;
                self.out.push_str("</");
                self.out.push_str(&element.tag);
                self.out.push('>');
            }
            TemplateNode::Text(text) => self.out.push_str(&escape_text(text)),
            TemplateNode::TextSlot => {
                let id = self.take_id();
                self.out.push_str(&Marker::Text(id).to_comment());
                match self.value(id) {
                    SlotValue::Text(text) => self.out.push_str(&escape_text(text)),
                    SlotValue::Empty => {}
                    SlotValue::Block(_) => return Err(mismatched_value(id, "text")),
                }
            }
            TemplateNode::InsertionSlot => {
                let id = self.take_id();
                self.out.push_str(&Marker::Insertion(id).to_comment());
            }
            TemplateNode::BlockSlot => {
                let id = self.take_id();
                self.out.push_str(&Marker::BlockStart(id).to_comment());
                match self.value(id) {
                    SlotValue::Block(items) => {
                        for item in items {
                            self.out.push_str(item);
                        }
                    }
                    SlotValue::Empty => {}
                    SlotValue::Text(_) => return Err(mismatched_value(id, "block")),
                }
                self.out.push_str(&Marker::BlockEnd.to_comment());
            }
        }
        Ok(())
    }
}

fn mismatched_value(id: u32, expected: &str) -> Error {
    Error::computation(format!("slot {id} expects a {expected} value"))
}

/// Render `template` with `values[i]` filling slot `i`.
///
/// Missing values render as empty. Block items must already be rendered,
/// each by its own call, so their markers are independent of this one.
///
/// # Example
///
/// ```rust
/// use dahlia_core::ssr::{render_tree, SlotValue};
/// use dahlia_core::template::{self, Template};
///
/// let greeting = Template::new(vec![template::element("p")
///     .child(template::text_slot())
///     .child(template::text("!"))
///     .into()]);
///
/// let html = render_tree(&greeting, &[SlotValue::text("<hi>")])?;
/// assert_eq!(html, "<p><!--dh:t:0-->&lt;hi&gt;<!---->!</p>");
/// # Ok::<(), dahlia_core::Error>(())
/// ```
pub fn render_tree(template: &Template, values: &[SlotValue]) -> Result<String> {
    let mut renderer = Renderer {
        values,
        next_id: 0,
        out: String::new(),
    };
    renderer.nodes(template.children())?;
    debug!(
        template = ?template.id(),
        markers = renderer.next_id,
        bytes = renderer.out.len(),
        "rendered tree"
    );
    Ok(renderer.out)
}

/// Render `template` and append the serialized `state`, if any.
pub fn render_to_string(template: &Template, state: &State, values: &[SlotValue]) -> Result<String> {
    render_to_string_with(template, state, values, &RenderOptions::default())
}

pub fn render_to_string_with(
    template: &Template,
    state: &State,
    values: &[SlotValue],
    options: &RenderOptions,
) -> Result<String> {
    let mut html = render_tree(template, values)?;
    if let Some(payload) = serialize_state(state)? {
        html.push_str(&format!(
            "<script type=\"application/json\" {}>{payload}</script>",
            options.state_attribute
        ));
    }
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{block_slot, element, insertion_slot, text, text_slot};

    #[test]
    fn markers_follow_pre_order() {
        let template = Template::new(vec![element("div")
            .child(element("button").on("click").child(text("+")))
            .child(text_slot())
            .child(element("ul").child(block_slot()))
            .child(insertion_slot())
            .into()]);
        let html = render_tree(
            &template,
            &[
                SlotValue::Empty,
                SlotValue::text(3),
                SlotValue::Block(vec!["<li>a</li>".into(), "<li>b</li>".into()]),
            ],
        )
        .unwrap();

        assert_eq!(
            html,
            concat!(
                r#"<div><button data-dh="0">+</button>"#,
                "<!--dh:t:1-->3",
                "<ul><!--dh:b:2--><li>a</li><li>b</li><!--/dh:b--></ul>",
                "<!--dh:i:3--></div>"
            )
        );
    }

    #[test]
    fn values_and_attributes_are_escaped() {
        let template = Template::new(vec![element("a")
            .attr("title", r#"say "hi" & <bye>"#)
            .child(text_slot())
            .into()]);
        let html = render_tree(&template, &["<script>x</script>".into()]).unwrap();

        assert_eq!(
            html,
            r#"<a title="say &quot;hi&quot; &amp; &lt;bye&gt;"><!--dh:t:0-->&lt;script&gt;x&lt;/script&gt;</a>"#
        );
    }

    #[test]
    fn void_elements_render_no_children() {
        let template = Template::new(vec![element("input")
            .attr("disabled", true)
            .attr("value", "x")
            .into()]);
        assert_eq!(
            render_tree(&template, &[]).unwrap(),
            r#"<input disabled value="x">"#
        );
    }

    #[test]
    fn empty_state_adds_no_script() {
        let template = Template::new(vec![text("hi")]);
        assert_eq!(
            render_to_string(&template, &State::new(), &[]).unwrap(),
            "hi"
        );
    }

    #[test]
    fn state_script_is_appended() {
        let template = Template::new(vec![text("hi")]);
        let mut state = State::new();
        state.insert("n".to_string(), StateValue::from(1));

        let html = render_to_string(&template, &state, &[]).unwrap();
        assert_eq!(
            html,
            r#"hi<script type="application/json" data-dh-state>{"n":1.0}</script>"#
        );
    }

    #[test]
    fn wrong_value_kind_is_rejected() {
        let template = Template::new(vec![block_slot()]);
        assert!(render_tree(&template, &["text".into()]).is_err());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: RenderOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.state_attribute, "data-dh-state");
    }
}
