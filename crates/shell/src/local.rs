//! Runs commands on the machine hosting this process.

use std::process::Stdio;

use async_trait::async_trait;
use fleet::{CommandOutput, CommandRequest, RunningCommand, TargetPath, Transport, TransportError};
use tokio::process::{Child, Command};

/// Transport backed by `tokio::process`.
///
/// There is no session to open or release; `connect` and `close` succeed
/// immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTransport;

impl LocalTransport {
    pub fn new() -> Self {
        Self
    }

    fn build(request: &CommandRequest) -> Result<Command, TransportError> {
        let mut command = if request.shell {
            let (shell, flag) = if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") };
            let mut command = Command::new(shell);
            command.arg(flag).arg(&request.command);
            command
        } else {
            let mut parts = request.command.split_whitespace();
            let program = parts.next().ok_or_else(|| TransportError::Spawn {
                command: request.command.clone(),
                message: "empty command".to_string(),
            })?;
            let mut command = Command::new(program);
            command.args(parts);
            command
        };

        if let Some(cwd) = &request.cwd {
            command.current_dir(cwd.as_str());
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(command)
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn spawn(
        &self,
        request: &CommandRequest,
    ) -> Result<Box<dyn RunningCommand>, TransportError> {
        let child = Self::build(request)?.spawn().map_err(|e| TransportError::Spawn {
            command: request.command.clone(),
            message: e.to_string(),
        })?;
        tracing::trace!(pid = ?child.id(), "local process spawned");
        Ok(Box::new(LocalProcess { child }))
    }

    async fn make_dir(
        &self,
        path: &TargetPath,
        parents: bool,
        exist_ok: bool,
    ) -> Result<(), TransportError> {
        let exists = tokio::fs::metadata(path.as_str()).await.is_ok_and(|m| m.is_dir());
        if exists {
            return if exist_ok {
                Ok(())
            } else {
                Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("{path} already exists"),
                )))
            };
        }
        if parents {
            tokio::fs::create_dir_all(path.as_str()).await?;
        } else {
            tokio::fs::create_dir(path.as_str()).await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

struct LocalProcess {
    child: Child,
}

#[async_trait]
impl RunningCommand for LocalProcess {
    async fn wait(self: Box<Self>) -> Result<CommandOutput, TransportError> {
        let output = self.child.wait_with_output().await?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}
