//! Marker protocol.
//!
//! Markers are comment payloads the renderer leaves in markup so the
//! hydrator can find dynamic positions again. The text format is fixed:
//!
//! | Marker              | Payload     |
//! |---------------------|-------------|
//! | text slot           | `dh:t:<id>` |
//! | insertion point     | `dh:i:<id>` |
//! | block start         | `dh:b:<id>` |
//! | block end           | `/dh:b`     |
//!
//! Elements carrying live bindings are marked with a `data-dh="<id>"`
//! attribute instead of a comment.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, SlotKind};

/// Attribute naming an element-anchored slot.
pub const ANCHOR_ATTRIBUTE: &str = "data-dh";

const TEXT_PREFIX: &str = "dh:t:";
const INSERTION_PREFIX: &str = "dh:i:";
const BLOCK_PREFIX: &str = "dh:b:";
const BLOCK_END: &str = "/dh:b";

/// A parsed comment marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    Text(u32),
    Insertion(u32),
    BlockStart(u32),
    BlockEnd,
}

impl Marker {
    /// Parse a comment payload. Anything that is not exactly a marker
    /// (including ids with signs or surrounding whitespace) is `None`.
    pub fn parse(data: &str) -> Option<Self> {
        if data == BLOCK_END {
            return Some(Self::BlockEnd);
        }
        if let Some(id) = data.strip_prefix(TEXT_PREFIX) {
            return parse_id(id).map(Self::Text);
        }
        if let Some(id) = data.strip_prefix(INSERTION_PREFIX) {
            return parse_id(id).map(Self::Insertion);
        }
        data.strip_prefix(BLOCK_PREFIX)
            .and_then(parse_id)
            .map(Self::BlockStart)
    }

    pub fn id(&self) -> Option<u32> {
        match *self {
            Self::Text(id) | Self::Insertion(id) | Self::BlockStart(id) => Some(id),
            Self::BlockEnd => None,
        }
    }

    /// Slot kind this marker opens. Block ends open nothing.
    pub fn kind(&self) -> Option<SlotKind> {
        match self {
            Self::Text(_) => Some(SlotKind::Text),
            Self::Insertion(_) => Some(SlotKind::Insertion),
            Self::BlockStart(_) => Some(SlotKind::Block),
            Self::BlockEnd => None,
        }
    }

    /// The marker as a markup comment.
    pub fn to_comment(&self) -> String {
        format!("<!--{self}-->")
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(id) => write!(f, "{TEXT_PREFIX}{id}"),
            Self::Insertion(id) => write!(f, "{INSERTION_PREFIX}{id}"),
            Self::BlockStart(id) => write!(f, "{BLOCK_PREFIX}{id}"),
            Self::BlockEnd => f.write_str(BLOCK_END),
        }
    }
}

impl FromStr for Marker {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::parse(0, format!("`{s}` is not a marker")))
    }
}

/// Parse the value of a `data-dh` attribute.
pub fn parse_anchor(value: &str) -> Option<u32> {
    parse_id(value)
}

fn parse_id(id: &str) -> Option<u32> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}
