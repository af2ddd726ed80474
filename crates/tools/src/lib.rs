//! Fleetrun diagnostic tools.
//!
//! Concrete implementations of the tool ports a node uses while it
//! bootstraps:
//!
//! | Tool | Port | Command |
//! |------|------|---------|
//! | [`Uname`] | [`fleet::OsIdentification`] | `uname -vrio` |
//! | [`Echo`] | [`fleet::EnvironmentExpansion`] | `echo <template>` via the node's shell |
//!
//! [`default_registry`] wires both into a [`fleet::ToolRegistry`].

mod echo;
mod uname;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use fleet::ToolRegistry;

pub use echo::Echo;
pub use uname::{parse_uname, Uname};

/// Registry with every tool in this crate.
pub fn default_registry() -> ToolRegistry {
    ToolRegistry::new()
        .with_os_identification(Arc::new(Uname))
        .with_environment_expansion(Arc::new(Echo))
}
