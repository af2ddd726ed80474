//! Newtype identifiers.
//!
//! A [`NodeIndex`] is a position inside one [`crate::Nodes`] collection; a
//! [`CommandId`] tags one command dispatch for log correlation. Keeping them
//! distinct prevents passing one where the other is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for usize-wrapped newtypes.
// Generates: struct (Copy), new(), as_usize(), Display.
// ---------------------------------------------------------------------------
macro_rules! usize_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(usize);

        impl $name {
            /// Creates a new identifier from a raw integer.
            pub fn new(value: usize) -> Self {
                Self(value)
            }

            /// Returns the underlying integer value.
            pub fn as_usize(self) -> usize {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

usize_id! {
    /// Position of a node inside its collection.
    ///
    /// Assigned at creation from the collection length, so indices are dense
    /// and start at zero. Never reused: the collection is append-only.
    NodeIndex
}

// ---------------------------------------------------------------------------

/// Correlation tag for one command dispatch.
///
/// Generated fresh for every `execute`/`execute_async` call and recorded on the
/// command's tracing span so its start, output and exit lines can be grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(Uuid);

impl CommandId {
    /// Generates a new random command identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------

/// Lookup key for [`crate::Nodes::get`]: a position or a node name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKey {
    /// Positional lookup by creation order.
    Index(usize),
    /// Exact match on [`crate::Node::name`].
    Name(String),
}

impl From<usize> for NodeKey {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<NodeIndex> for NodeKey {
    fn from(index: NodeIndex) -> Self {
        Self::Index(index.as_usize())
    }
}

impl From<&str> for NodeKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for NodeKey {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl std::str::FromStr for NodeKey {
    type Err = std::convert::Infallible;

    /// Digits parse as a position; anything else is a name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<usize>() {
            Ok(index) => Self::Index(index),
            Err(_) => Self::Name(s.to_string()),
        })
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(index) => write!(f, "#{index}"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}
