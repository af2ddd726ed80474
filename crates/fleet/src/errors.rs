//! Error types for the fleet domain.
//!
//! [`FleetError`] covers every condition surfaced by [`crate::Node`] and
//! [`crate::Nodes`]. Failures raised by a concrete session (connect refused,
//! authentication rejected, spawn failed) are [`TransportError`]s and pass
//! through [`FleetError::Transport`] untouched.
//!
//! No variant is retried automatically. The only recovery built into the
//! domain is the initialization reset: a failed bootstrap leaves the node
//! uninitialized so the next call starts over.

use thiserror::Error;

use crate::NodeIndex;

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Errors produced by a [`crate::Transport`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The session to the target could not be established.
    #[error("Failed to connect to {endpoint}: {message}")]
    Connect {
        /// `host:port` or `"local"`.
        endpoint: String,
        /// Description of the failure reported by the backend.
        message: String,
    },

    /// The target rejected every configured credential.
    #[error("Authentication failed for {username}@{endpoint}: {message}")]
    Authentication {
        /// User the session tried to authenticate as.
        username: String,
        /// `host:port` of the target.
        endpoint: String,
        /// Description of the last rejection.
        message: String,
    },

    /// An operation was attempted on a transport that is not connected.
    #[error("Transport is not connected")]
    NotConnected,

    /// The command could not be started on the target.
    #[error("Failed to start '{command}': {message}")]
    Spawn {
        /// Command line that failed to start.
        command: String,
        /// Description of the failure.
        message: String,
    },

    /// A session-level failure after the command started (channel closed,
    /// read error, background task panicked).
    #[error("Session error: {message}")]
    Session {
        /// Description of the failure.
        message: String,
    },

    /// Local I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Domain errors
// ---------------------------------------------------------------------------

/// Errors returned by node and node-collection operations.
#[derive(Debug, Error)]
pub enum FleetError {
    /// Unrecognised node type, or a capability with no registered tool.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The operation is not legal in the current state (connection info
    /// set twice, direct assignment into a collection, remote node used
    /// without connection info).
    #[error("Invalid state: {message}")]
    State {
        /// Description of the violated state rule.
        message: String,
    },

    /// The environment has no node to satisfy the request.
    #[error("Environment error: {message}")]
    Environment {
        /// Description of what was missing.
        message: String,
    },

    /// A positional or named lookup did not match any node.
    #[error("Cannot find node {key}")]
    NotFound {
        /// Rendered lookup key (`#3` or a node name).
        key: String,
    },

    /// The capability resolver did not produce a concrete node count.
    #[error("Capability resolution failed: {message}")]
    Resolution {
        /// Description of why the requirement stayed abstract.
        message: String,
    },

    /// A command issued by a diagnostic tool exited non-zero.
    #[error("Command '{command}' exited with {exit_code:?}: {stderr}")]
    CommandFailed {
        /// Command line that failed.
        command: String,
        /// Exit code, `None` when the process was terminated by a signal.
        exit_code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// One or more nodes failed to release their transport during teardown.
    #[error("Failed to release {} node(s): {}", failures.len(), render_failures(failures))]
    Release {
        /// Every failure observed, in node order.
        failures: Vec<ReleaseFailure>,
    },

    /// A transport failure, propagated unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl FleetError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    pub(crate) fn environment(message: impl Into<String>) -> Self {
        Self::Environment {
            message: message.into(),
        }
    }

    pub(crate) fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution {
            message: message.into(),
        }
    }
}

/// A single node's teardown failure inside [`FleetError::Release`].
#[derive(Debug)]
pub struct ReleaseFailure {
    /// Node whose transport failed to close.
    pub index: NodeIndex,
    /// The underlying failure.
    pub error: TransportError,
}

fn render_failures(failures: &[ReleaseFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("node {}: {}", f.index, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}
