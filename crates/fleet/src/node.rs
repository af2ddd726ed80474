//! One compute target and its lazy initialization.
//!
//! A [`Node`] is created cold. The first command (or [`Node::is_linux`], or an
//! explicit [`Node::initialize`]) drives it through
//! `Uninitialized → Initializing → Initialized`:
//!
//! 1. connect the transport
//! 2. identify the OS (best effort)
//! 3. classify Linux / non-Linux
//! 4. resolve the working path
//! 5. create the working directory
//!
//! Any failure returns the node to `Uninitialized` and surfaces the error
//! unchanged; the next call starts again from step 1. Success is final.
//!
//! Steps 2 and 4 run commands on the node itself. They go through a
//! [`BootstrapShell`], which dispatches straight to the transport, so they
//! never re-enter initialization.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{Instrument, Span};

use crate::{
    CommandId, CommandOptions, CommandRunner, ConnectionInfo, ExecutableResult, FleetError,
    FleetServices, NodeIndex, NodeRequirement, NodeType, OsInfo, PathStyle, Process, TargetPath,
    Transport, TransportError, TransportKind,
};

const UNINITIALIZED: u8 = 0;
const INITIALIZING: u8 = 1;
const INITIALIZED: u8 = 2;

/// Observable phase of a node's lazy initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializationState {
    Uninitialized,
    Initializing,
    Initialized,
}

/// Facts learned during a successful initialization.
#[derive(Debug)]
struct Bootstrapped {
    os_info: OsInfo,
    is_linux: bool,
    working_path: TargetPath,
}

/// A local machine or remote host that commands run on.
pub struct Node {
    index: NodeIndex,
    is_remote: bool,
    is_default: bool,
    requirement: Option<NodeRequirement>,
    name: String,
    kind: TransportKind,
    // `None` for a remote node until its connection info is set.
    transport: Option<Arc<dyn Transport>>,
    services: Arc<FleetServices>,
    state: AtomicU8,
    // Single-flight: concurrent first callers queue here instead of
    // bootstrapping twice.
    init_lock: Mutex<()>,
    ready: OnceLock<Bootstrapped>,
    span: Span,
}

impl Node {
    /// Creates a node from a textual node type (`"local"` or `"remote"`).
    ///
    /// # Errors
    ///
    /// [`FleetError::Configuration`] for any other type string.
    pub fn create(
        index: NodeIndex,
        requirement: Option<NodeRequirement>,
        node_type: &str,
        is_default: bool,
        services: Arc<FleetServices>,
    ) -> Result<Self, FleetError> {
        let node_type: NodeType = node_type.parse()?;
        Ok(Self::new(index, requirement, node_type, is_default, services))
    }

    pub fn new(
        index: NodeIndex,
        requirement: Option<NodeRequirement>,
        node_type: NodeType,
        is_default: bool,
        services: Arc<FleetServices>,
    ) -> Self {
        let kind = TransportKind::Local;
        let transport = match node_type {
            NodeType::Local => Some(services.transports.create(&kind)),
            NodeType::Remote => None,
        };
        let span = tracing::info_span!("node", index = %index);
        tracing::debug!(parent: &span, node_type = %node_type, is_default, "created");

        Self {
            index,
            is_remote: node_type == NodeType::Remote,
            is_default,
            requirement,
            name: String::new(),
            kind,
            transport,
            services,
            state: AtomicU8::new(UNINITIALIZED),
            init_lock: Mutex::new(()),
            ready: OnceLock::new(),
            span,
        }
    }

    /// Binds the node to a remote endpoint and switches it to the remote
    /// transport.
    ///
    /// # Errors
    ///
    /// [`FleetError::State`] if connection info was already set, or if the
    /// node is already initialized on its current transport. The node is left
    /// unchanged.
    pub fn set_connection_info(&mut self, info: ConnectionInfo) -> Result<(), FleetError> {
        if let TransportKind::Remote(current) = &self.kind {
            return Err(FleetError::state(format!(
                "node {} is already connected to {}, cannot set connection information again",
                self.index,
                current.endpoint()
            )));
        }
        if self.ready.get().is_some() {
            return Err(FleetError::state(format!(
                "node {} is already initialized, cannot switch it to {}",
                self.index,
                info.endpoint()
            )));
        }

        tracing::debug!(
            parent: &self.span,
            endpoint = %info.endpoint(),
            username = %info.username,
            "connection info set"
        );
        let kind = TransportKind::Remote(info);
        self.transport = Some(self.services.transports.create(&kind));
        self.kind = kind;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Runs `command` and waits for it to finish.
    pub async fn execute(
        &self,
        command: &str,
        options: CommandOptions,
    ) -> Result<ExecutableResult, FleetError> {
        self.execute_async(command, options).await?.wait_result().await
    }

    /// Starts `command` and returns its handle; the caller decides when to
    /// wait. Initializes the node first if needed.
    pub async fn execute_async(
        &self,
        command: &str,
        options: CommandOptions,
    ) -> Result<Process, FleetError> {
        let ready = self.ensure_initialized().await?;
        self.dispatch(command, options, ready.is_linux).await
    }

    /// Initializes the node if needed and reports whether it runs Linux.
    pub async fn is_linux(&self) -> Result<bool, FleetError> {
        Ok(self.ensure_initialized().await?.is_linux)
    }

    /// Releases the transport.
    pub async fn close(&self) -> Result<(), TransportError> {
        match &self.transport {
            Some(transport) => {
                tracing::debug!(parent: &self.span, "closing");
                transport.close().await
            }
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Initialization
    // -----------------------------------------------------------------------

    /// Drives initialization to completion. A no-op once initialized.
    pub async fn initialize(&self) -> Result<(), FleetError> {
        self.ensure_initialized().await.map(|_| ())
    }

    async fn ensure_initialized(&self) -> Result<&Bootstrapped, FleetError> {
        if let Some(ready) = self.ready.get() {
            return Ok(ready);
        }

        let _flight = self.init_lock.lock().await;
        if let Some(ready) = self.ready.get() {
            return Ok(ready);
        }

        let guard = InitializingGuard::enter(&self.state);
        tracing::debug!(parent: &self.span, name = %self.name, "initializing");
        let bootstrapped = self.bootstrap().instrument(self.span.clone()).await?;

        let ready = self.ready.get_or_init(|| bootstrapped);
        guard.complete();
        Ok(ready)
    }

    async fn bootstrap(&self) -> Result<Bootstrapped, FleetError> {
        let transport = self.transport()?;
        transport.connect().await?;

        let tools = &self.services.tools;
        // Until identified, assume Linux.
        let mut shell = BootstrapShell {
            node: self,
            is_linux: true,
        };
        let os_info = tools.os_identification()?.identify(&shell).await;
        let is_linux = os_info.is_linux();
        shell.is_linux = is_linux;
        if is_linux {
            tracing::info!(
                name = %self.name,
                kernel_release = %os_info.kernel_release,
                kernel_version = %os_info.kernel_version,
                hardware_platform = %os_info.hardware_platform,
                "initialized Linux node"
            );
        } else {
            tracing::info!(name = %self.name, "initialized non-Linux node");
        }

        let working_path = if self.is_remote {
            let template = self.services.layout.remote_template(is_linux);
            let expanded = tools.environment_expansion()?.expand(&shell, &template).await?;
            let style = if is_linux { PathStyle::Posix } else { PathStyle::Windows };
            TargetPath::parse(&expanded, style)
        } else {
            self.services.layout.local_working_path()
        };

        transport.make_dir(&working_path, true, true).await?;
        tracing::debug!(working_path = %working_path, "working path ready");

        Ok(Bootstrapped {
            os_info,
            is_linux,
            working_path,
        })
    }

    async fn dispatch(
        &self,
        command: &str,
        options: CommandOptions,
        is_linux: bool,
    ) -> Result<Process, FleetError> {
        let transport = Arc::clone(self.transport()?);
        let mut process = Process::new(CommandId::new_random(), transport, &self.span, is_linux);
        process.start(command, options).await?;
        Ok(process)
    }

    fn transport(&self) -> Result<&Arc<dyn Transport>, FleetError> {
        self.transport.as_ref().ok_or_else(|| {
            FleetError::state(format!(
                "remote node {} has no connection information; set it before use",
                self.index
            ))
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn index(&self) -> NodeIndex {
        self.index
    }

    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn requirement(&self) -> Option<&NodeRequirement> {
        self.requirement.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn connection_info(&self) -> Option<&ConnectionInfo> {
        match &self.kind {
            TransportKind::Remote(info) => Some(info),
            TransportKind::Local => None,
        }
    }

    pub fn transport_kind(&self) -> &TransportKind {
        &self.kind
    }

    pub fn state(&self) -> InitializationState {
        match self.state.load(Ordering::Acquire) {
            INITIALIZED => InitializationState::Initialized,
            INITIALIZING => InitializationState::Initializing,
            _ => InitializationState::Uninitialized,
        }
    }

    /// OS facts; `None` until initialized.
    pub fn os_info(&self) -> Option<&OsInfo> {
        self.ready.get().map(|r| &r.os_info)
    }

    /// Working directory on the node; `None` until initialized.
    pub fn working_path(&self) -> Option<&TargetPath> {
        self.ready.get().map(|r| &r.working_path)
    }
}

#[async_trait]
impl CommandRunner for Node {
    async fn execute_async(
        &self,
        command: &str,
        options: CommandOptions,
    ) -> Result<Process, FleetError> {
        Node::execute_async(self, command, options).await
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("is_remote", &self.is_remote)
            .field("is_default", &self.is_default)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Bootstrap helpers
// ---------------------------------------------------------------------------

/// Runs commands on a node that is still initializing.
struct BootstrapShell<'a> {
    node: &'a Node,
    is_linux: bool,
}

#[async_trait]
impl CommandRunner for BootstrapShell<'_> {
    async fn execute_async(
        &self,
        command: &str,
        options: CommandOptions,
    ) -> Result<Process, FleetError> {
        self.node.dispatch(command, options, self.is_linux).await
    }
}

/// Holds the node in `Initializing`; dropping it without [`complete`] (error
/// or cancelled future) puts the node back to `Uninitialized`.
///
/// [`complete`]: InitializingGuard::complete
struct InitializingGuard<'a> {
    state: &'a AtomicU8,
    done: bool,
}

impl<'a> InitializingGuard<'a> {
    fn enter(state: &'a AtomicU8) -> Self {
        state.store(INITIALIZING, Ordering::Release);
        Self { state, done: false }
    }

    fn complete(mut self) {
        self.state.store(INITIALIZED, Ordering::Release);
        self.done = true;
    }
}

impl Drop for InitializingGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.state.store(UNINITIALIZED, Ordering::Release);
        }
    }
}
