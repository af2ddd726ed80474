//! Transport port: the session a node uses to reach its machine.
//!
//! Implementations live in the `shell` crate. The domain only decides *which*
//! backend a node needs ([`TransportKind`]) and asks a [`TransportFactory`]
//! for it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{ConnectionInfo, TargetPath, TransportError};

/// Backend selection for a node, resolved at construction and again only when
/// connection info is supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportKind {
    Local,
    Remote(ConnectionInfo),
}

/// One command as handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub command: String,
    pub shell: bool,
    pub cwd: Option<TargetPath>,
    /// Classification of the target at dispatch time; selects quoting and
    /// shell syntax on remote sessions.
    pub is_linux: bool,
}

/// Raw process outcome before the domain attaches timing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// A command that has been started and not yet collected.
#[async_trait]
pub trait RunningCommand: Send {
    /// Waits for the command to finish and returns its output.
    async fn wait(self: Box<Self>) -> Result<CommandOutput, TransportError>;
}

/// A session to one machine.
///
/// All methods take `&self`; implementations guard their session state
/// internally so a [`crate::Process`] can hold a clone of the handle while the
/// owning node keeps issuing commands.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establishes the session. Called once per successful initialization.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Starts `request` and returns without waiting for it.
    async fn spawn(
        &self,
        request: &CommandRequest,
    ) -> Result<Box<dyn RunningCommand>, TransportError>;

    /// Creates `path` on the target.
    async fn make_dir(
        &self,
        path: &TargetPath,
        parents: bool,
        exist_ok: bool,
    ) -> Result<(), TransportError>;

    /// Releases the session. Safe to call on a transport that never connected.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Builds transports for nodes.
pub trait TransportFactory: Send + Sync {
    fn create(&self, kind: &TransportKind) -> Arc<dyn Transport>;
}
