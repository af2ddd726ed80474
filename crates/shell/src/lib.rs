//! Fleetrun transport adapters.
//!
//! Implements the [`fleet::Transport`] port with two backends:
//!
//! - [`LocalTransport`]: spawns processes on this machine via `tokio::process`.
//! - [`SshTransport`]: runs commands over an SSH session (`ssh2`). libssh2 is
//!   blocking, so every session call runs on tokio's blocking pool.
//!
//! [`ShellTransportFactory`] maps a [`fleet::TransportKind`] to the matching
//! backend and is what the CLI hands to [`fleet::FleetServices`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Process spawning, session handshakes, authentication,
//! quoting, and directory creation live here. The [`fleet`] crate sees only
//! [`fleet::Transport`].

mod command;
pub mod local;
pub mod ssh;

use std::sync::Arc;
use std::time::Duration;

use fleet::{Transport, TransportFactory, TransportKind};

pub use local::LocalTransport;
pub use ssh::SshTransport;

/// Default limit for TCP connect and blocking session calls.
pub const DEFAULT_SSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds [`LocalTransport`]s and [`SshTransport`]s.
#[derive(Debug, Clone, Copy)]
pub struct ShellTransportFactory {
    ssh_timeout: Duration,
}

impl ShellTransportFactory {
    pub fn new(ssh_timeout: Duration) -> Self {
        Self { ssh_timeout }
    }
}

impl Default for ShellTransportFactory {
    fn default() -> Self {
        Self::new(DEFAULT_SSH_TIMEOUT)
    }
}

impl TransportFactory for ShellTransportFactory {
    fn create(&self, kind: &TransportKind) -> Arc<dyn Transport> {
        match kind {
            TransportKind::Local => Arc::new(LocalTransport::new()),
            TransportKind::Remote(info) => {
                Arc::new(SshTransport::new(info.clone(), self.ssh_timeout))
            }
        }
    }
}
