//! Core domain for fleetrun.
//!
//! This crate owns the node lifecycle (lazy, retryable, single-flight
//! initialization), the node collection (default selection, lookup, and the
//! three provisioning strategies), and the port traits every collaborator
//! implements. Concrete sessions and diagnostic tools live in the `shell` and
//! `tools` crates.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** No transport code lives here. This
//! crate decides *when* to connect, identify, and create directories; the
//! adapters decide *how*.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`node`] | `Node` and its initialization state machine |
//! | [`nodes`] | `Nodes`, the append-only collection |
//! | [`process`] | `Process`, one dispatched command |
//! | [`transport`] | `Transport`, `TransportFactory`, `TransportKind` ports |
//! | [`tools`] | `OsIdentification`, `EnvironmentExpansion`, `ToolRegistry` |
//! | [`capability`] | `CapabilityResolver` and the minimal resolver |
//! | [`schema`] | Provisioning entries (`LocalNode`, `RemoteNode`, `NodeRequirement`) |
//! | [`services`] | `FleetServices`, `WorkingPathLayout` |
//! | [`identifiers`] | `NodeIndex`, `CommandId`, `NodeKey` |
//! | [`types`] | Value types (`ConnectionInfo`, `OsInfo`, `TargetPath`, ...) |
//! | [`errors`] | `FleetError`, `TransportError` |

pub mod capability;
pub mod errors;
pub mod identifiers;
pub mod node;
pub mod nodes;
pub mod process;
pub mod schema;
pub mod services;
pub mod tools;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use capability::{CapabilityResolver, MinimalCapabilityResolver};
pub use errors::{FleetError, ReleaseFailure, TransportError};
pub use identifiers::{CommandId, NodeIndex, NodeKey};
pub use node::{InitializationState, Node};
pub use nodes::Nodes;
pub use process::Process;
pub use schema::{CountSpace, LocalNode, NodeRequirement, NodeType, RemoteNode};
pub use services::{FleetServices, WorkingPathLayout};
pub use tools::{Capability, CommandRunner, EnvironmentExpansion, OsIdentification, ToolRegistry};
pub use transport::{
    CommandOutput, CommandRequest, RunningCommand, Transport, TransportFactory, TransportKind,
};
pub use types::{
    CommandOptions, ConnectionInfo, ExecutableResult, OsInfo, PathStyle, TargetPath, Timestamp,
};
