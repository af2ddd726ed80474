use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fleet::{
    CommandId, CommandOptions, CommandOutput, CommandRequest, CommandRunner, FleetError, Process,
    RunningCommand, TargetPath, Transport, TransportError,
};

/// Runner that answers known command lines with canned output and fails to
/// spawn anything else.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    transport: Arc<Script>,
    calls: Mutex<Vec<(String, CommandOptions)>>,
}

#[derive(Default)]
struct Script {
    responses: HashMap<String, CommandOutput>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(mut self, command: &str, exit_code: i32, stdout: &str) -> Self {
        let script = Arc::get_mut(&mut self.transport).unwrap();
        script.responses.insert(
            command.to_string(),
            CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code: Some(exit_code),
            },
        );
        self
    }

    pub(crate) fn calls(&self) -> Vec<(String, CommandOptions)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn execute_async(
        &self,
        command: &str,
        options: CommandOptions,
    ) -> Result<Process, FleetError> {
        self.calls.lock().unwrap().push((command.to_string(), options.clone()));
        let mut process = Process::new(
            CommandId::new_random(),
            self.transport.clone(),
            &tracing::Span::none(),
            true,
        );
        process.start(command, options).await?;
        Ok(process)
    }
}

struct Canned(CommandOutput);

#[async_trait]
impl RunningCommand for Canned {
    async fn wait(self: Box<Self>) -> Result<CommandOutput, TransportError> {
        Ok(self.0)
    }
}

#[async_trait]
impl Transport for Script {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn spawn(
        &self,
        request: &CommandRequest,
    ) -> Result<Box<dyn RunningCommand>, TransportError> {
        match self.responses.get(&request.command) {
            Some(output) => Ok(Box::new(Canned(output.clone()))),
            None => Err(TransportError::Spawn {
                command: request.command.clone(),
                message: "not scripted".to_string(),
            }),
        }
    }

    async fn make_dir(
        &self,
        _path: &TargetPath,
        _parents: bool,
        _exist_ok: bool,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
