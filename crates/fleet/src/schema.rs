//! Provisioning specs consumed by the [`crate::Nodes`] constructors.
//!
//! These are the deserialised shapes of runbook entries. They are read
//! verbatim; validation happens when a node is created from them.

use serde::{Deserialize, Serialize};

use crate::{ConnectionInfo, FleetError};

pub const NODE_TYPE_LOCAL: &str = "local";
pub const NODE_TYPE_REMOTE: &str = "remote";

/// Whether a node runs commands on this machine or over a remote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Local,
    Remote,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => NODE_TYPE_LOCAL,
            Self::Remote => NODE_TYPE_REMOTE,
        }
    }
}

impl std::str::FromStr for NodeType {
    type Err = FleetError;

    /// Exact, case-sensitive match on `"local"` or `"remote"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            NODE_TYPE_LOCAL => Ok(Self::Local),
            NODE_TYPE_REMOTE => Ok(Self::Remote),
            other => Err(FleetError::configuration(format!(
                "unsupported node type '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Fixed nodes
// ---------------------------------------------------------------------------

/// A node that runs commands on the machine hosting this process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalNode {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// A pre-existing remote host with known credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNode {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub public_address: String,
    #[serde(default = "default_ssh_port")]
    pub public_port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub private_key_file: String,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_username() -> String {
    "root".to_string()
}

impl RemoteNode {
    /// Builds the connection descriptor from this entry's fields.
    ///
    /// Without a `public_address` the internal endpoint is dialled directly.
    pub fn connection_info(&self) -> ConnectionInfo {
        let (public_address, public_port) = if self.public_address.is_empty() {
            (self.address.clone(), self.port)
        } else {
            (self.public_address.clone(), self.public_port)
        };
        ConnectionInfo {
            address: self.address.clone(),
            port: self.port,
            public_address,
            public_port,
            username: self.username.clone(),
            password: self.password.clone(),
            private_key_file: self.private_key_file.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Requirements
// ---------------------------------------------------------------------------

/// A set of acceptable integer values.
///
/// In YAML: a bare integer is [`CountSpace::Exact`], a `{min, max}` map is a
/// [`CountSpace::Range`], and a list is [`CountSpace::Choices`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CountSpace {
    Exact(u32),
    // Ahead of `Range`: a struct variant would also accept a two-item list.
    Choices(Vec<u32>),
    Range {
        min: u32,
        #[serde(default)]
        max: Option<u32>,
    },
}

impl CountSpace {
    /// Returns the value if this space is concrete.
    pub fn exact(&self) -> Option<u32> {
        match self {
            Self::Exact(n) => Some(*n),
            _ => None,
        }
    }

    /// Smallest value in the space, or `None` if the space is empty.
    pub fn minimum(&self) -> Option<u32> {
        match self {
            Self::Exact(n) => Some(*n),
            Self::Range { min, max } => match max {
                Some(max) if max < min => None,
                _ => Some(*min),
            },
            Self::Choices(choices) => choices.iter().copied().min(),
        }
    }
}

impl Default for CountSpace {
    fn default() -> Self {
        Self::Exact(1)
    }
}

/// Abstract resource needs for a group of nodes that do not exist yet.
///
/// A platform turns this into machines; the collection only needs the node
/// count, which must be concrete after [`crate::CapabilityResolver::resolve_minimal`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRequirement {
    #[serde(default)]
    pub node_count: CountSpace,
    #[serde(default)]
    pub core_count: Option<CountSpace>,
    #[serde(default)]
    pub memory_mb: Option<CountSpace>,
    #[serde(default)]
    pub is_default: bool,
}
