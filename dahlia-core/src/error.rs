//! Error Types
//!
//! Every fallible operation in the crate returns [`Result`]. The error is
//! `Clone` because a failing memo caches its error and hands the same value to
//! every reader until one of its dependencies changes.

use std::fmt;

use crate::graph::NodeId;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The kind of slot a marker stands for.
///
/// Used in hydration errors to report what the matcher expected to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// A dynamic text position (`dh:t:<id>`).
    Text,
    /// A dynamic insertion point (`dh:i:<id>`).
    Insertion,
    /// A dynamic child block (`dh:b:<id>` ... `/dh:b`).
    Block,
    /// An element carrying live bindings (`data-dh="<id>"`).
    Element,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Insertion => "insertion",
            Self::Block => "block",
            Self::Element => "element",
        };
        f.write_str(name)
    }
}

/// Errors raised by the reactive graph, the DOM layer, the renderer and the
/// hydrator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A derivation re-entered itself, or a flush could not settle.
    #[error("cyclic dependency detected at node {node:?}")]
    CyclicDependency { node: NodeId },

    /// An effect or cleanup was registered without a live owning scope.
    #[error("{operation} requires an active, undisposed scope")]
    DisposedScopeUsage { operation: &'static str },

    /// Server markup does not match the structure the client expects.
    #[error("hydration mismatch at marker {marker} ({kind}): expected {expected}, found {found}")]
    HydrationMismatch {
        marker: u32,
        kind: SlotKind,
        expected: String,
        found: String,
    },

    /// The state payload contains a value that cannot be serialized.
    #[error("state value at `{path}` is not serializable ({kind})")]
    NonSerializableState { path: String, kind: &'static str },

    /// Two items in one reconciliation pass produced the same key.
    #[error("duplicate key `{key}` in reconciliation")]
    DuplicateKey { key: String },

    /// A user computation reported a failure.
    #[error("computation failed: {message}")]
    Computation { message: String },

    /// A host-document operation referenced a missing or unsuitable node.
    #[error("dom error: {message}")]
    Dom { message: String },

    /// A marker or state payload could not be parsed.
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },
}

impl Error {
    /// Build a [`Error::Computation`] from any displayable message.
    pub fn computation(message: impl fmt::Display) -> Self {
        Self::Computation {
            message: message.to_string(),
        }
    }

    pub(crate) fn dom(message: impl fmt::Display) -> Self {
        Self::Dom {
            message: message.to_string(),
        }
    }

    pub(crate) fn parse(offset: usize, message: impl fmt::Display) -> Self {
        Self::Parse {
            offset,
            message: message.to_string(),
        }
    }

    /// Whether this error came from hydration.
    pub fn is_hydration_mismatch(&self) -> bool {
        matches!(self, Self::HydrationMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_message_carries_position() {
        let err = Error::HydrationMismatch {
            marker: 3,
            kind: SlotKind::Text,
            expected: "marker dh:t:3".into(),
            found: "element <div>".into(),
        };
        let message = err.to_string();
        assert!(message.contains("marker 3"));
        assert!(message.contains("(text)"));
        assert!(message.contains("element <div>"));
        assert!(err.is_hydration_mismatch());
    }

    #[test]
    fn computation_helper_formats_message() {
        let err = Error::computation(format_args!("bad value {}", 7));
        assert_eq!(err, Error::Computation { message: "bad value 7".into() });
    }
}
