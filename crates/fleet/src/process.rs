//! A single command dispatched to a node.

use std::sync::Arc;
use std::time::Instant;

use tracing::{Instrument, Span};

use crate::{
    CommandId, CommandOptions, CommandRequest, ExecutableResult, FleetError, RunningCommand,
    Timestamp, Transport,
};

/// Handle for one command on one node.
///
/// Created unstarted by the node, started once with [`Process::start`], and
/// consumed by [`Process::wait_result`]. All log lines it emits are inside a
/// `cmd` span carrying its [`CommandId`], nested under the node's span.
pub struct Process {
    id: CommandId,
    transport: Arc<dyn Transport>,
    span: Span,
    is_linux: bool,
    running: Option<Running>,
}

struct Running {
    command: String,
    options: CommandOptions,
    started_at: Timestamp,
    started: Instant,
    handle: Box<dyn RunningCommand>,
}

impl Process {
    pub fn new(
        id: CommandId,
        transport: Arc<dyn Transport>,
        parent: &Span,
        is_linux: bool,
    ) -> Self {
        let span = tracing::info_span!(parent: parent, "cmd", id = %id);
        Self {
            id,
            transport,
            span,
            is_linux,
            running: None,
        }
    }

    /// Hands `command` to the transport. A process starts at most once.
    pub async fn start(
        &mut self,
        command: &str,
        options: CommandOptions,
    ) -> Result<(), FleetError> {
        if self.running.is_some() {
            return Err(FleetError::state(format!("command {} already started", self.id)));
        }

        let request = CommandRequest {
            command: command.to_string(),
            shell: options.shell,
            cwd: options.cwd.clone(),
            is_linux: self.is_linux,
        };
        if !options.no_info_log {
            tracing::info!(
                parent: &self.span,
                command,
                shell = options.shell,
                cwd = options.cwd.as_ref().map(|p| p.as_str()),
                "starting command"
            );
        }

        let started_at = Timestamp::now();
        let started = Instant::now();
        let handle = match self.transport.spawn(&request).instrument(self.span.clone()).await {
            Ok(handle) => handle,
            Err(e) => {
                if !options.no_error_log {
                    tracing::error!(
                        parent: &self.span,
                        command,
                        error = %e,
                        "failed to start command"
                    );
                }
                return Err(e.into());
            }
        };

        self.running = Some(Running {
            command: request.command,
            options,
            started_at,
            started,
            handle,
        });
        Ok(())
    }

    /// Waits for the command to finish.
    ///
    /// A non-zero exit is not an error here; it is reported in the result and
    /// logged at error level unless `no_error_log` was set.
    pub async fn wait_result(self) -> Result<ExecutableResult, FleetError> {
        let Process { id, span, running, .. } = self;
        let running =
            running.ok_or_else(|| FleetError::state(format!("command {id} was never started")))?;

        let output = running.handle.wait().instrument(span.clone()).await?;
        let result = ExecutableResult {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            elapsed: running.started.elapsed(),
        };

        tracing::debug!(parent: &span, stdout = %result.stdout.trim_end(), "command output");
        if !result.is_success() && !running.options.no_error_log {
            tracing::error!(
                parent: &span,
                command = %running.command,
                exit_code = ?result.exit_code,
                stderr = %result.stderr.trim_end(),
                "command failed"
            );
        } else if !running.options.no_info_log {
            tracing::info!(
                parent: &span,
                exit_code = ?result.exit_code,
                elapsed_ms = result.elapsed.as_millis() as u64,
                "command finished"
            );
        }
        Ok(result)
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn is_linux(&self) -> bool {
        self.is_linux
    }

    /// Command line, once started.
    pub fn command(&self) -> Option<&str> {
        self.running.as_ref().map(|r| r.command.as_str())
    }

    pub fn started_at(&self) -> Option<Timestamp> {
        self.running.as_ref().map(|r| r.started_at)
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("is_linux", &self.is_linux)
            .field("command", &self.command())
            .finish()
    }
}
