//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    CommandOptions, CommandOutput, CommandRequest, CommandRunner, EnvironmentExpansion, FleetError,
    FleetServices, OsIdentification, OsInfo, RunningCommand, TargetPath, ToolRegistry, Transport,
    TransportError, TransportFactory, TransportKind, WorkingPathLayout,
};

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Records every call and answers commands from a canned table.
#[derive(Default)]
pub(crate) struct FakeTransport {
    calls: Mutex<Vec<String>>,
    responses: Mutex<HashMap<String, CommandOutput>>,
    connect_failures: AtomicUsize,
    make_dir_failures: AtomicUsize,
    close_fails: AtomicBool,
    slow_connect: AtomicBool,
    hang_connect: AtomicBool,
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn respond(&self, command: &str, stdout: &str, exit_code: i32) {
        self.responses.lock().unwrap().insert(
            command.to_string(),
            CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code: Some(exit_code),
            },
        );
    }

    pub(crate) fn fail_connects(&self, times: usize) {
        self.connect_failures.store(times, Ordering::SeqCst);
    }

    pub(crate) fn fail_make_dirs(&self, times: usize) {
        self.make_dir_failures.store(times, Ordering::SeqCst);
    }

    pub(crate) fn fail_close(&self) {
        self.close_fails.store(true, Ordering::SeqCst);
    }

    pub(crate) fn slow_connect(&self) {
        self.slow_connect.store(true, Ordering::SeqCst);
    }

    pub(crate) fn hang_connect(&self) {
        self.hang_connect.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.record("connect".to_string());
        if self.hang_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.slow_connect.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if Self::take_failure(&self.connect_failures) {
            return Err(TransportError::Connect {
                endpoint: "fake".to_string(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn spawn(
        &self,
        request: &CommandRequest,
    ) -> Result<Box<dyn RunningCommand>, TransportError> {
        self.record(format!("spawn {}", request.command));
        let output = self
            .responses
            .lock()
            .unwrap()
            .get(&request.command)
            .cloned()
            .unwrap_or(CommandOutput {
                exit_code: Some(0),
                ..CommandOutput::default()
            });
        Ok(Box::new(FakeRunning(output)))
    }

    async fn make_dir(
        &self,
        path: &TargetPath,
        parents: bool,
        exist_ok: bool,
    ) -> Result<(), TransportError> {
        self.record(format!("make_dir {path} parents={parents} exist_ok={exist_ok}"));
        if Self::take_failure(&self.make_dir_failures) {
            return Err(TransportError::Session {
                message: "permission denied".to_string(),
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.record("close".to_string());
        if self.close_fails.load(Ordering::SeqCst) {
            return Err(TransportError::Session {
                message: "close failed".to_string(),
            });
        }
        Ok(())
    }
}

struct FakeRunning(CommandOutput);

#[async_trait]
impl RunningCommand for FakeRunning {
    async fn wait(self: Box<Self>) -> Result<CommandOutput, TransportError> {
        Ok(self.0)
    }
}

/// Hands out a fresh [`FakeTransport`] per request and keeps them for
/// inspection.
#[derive(Default)]
pub(crate) struct FakeTransportFactory {
    created: Mutex<Vec<(TransportKind, Arc<FakeTransport>)>>,
}

impl FakeTransportFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn created(&self) -> Vec<Arc<FakeTransport>> {
        self.created.lock().unwrap().iter().map(|(_, t)| Arc::clone(t)).collect()
    }

    /// Most recently created transport.
    pub(crate) fn last(&self) -> Arc<FakeTransport> {
        let created = self.created.lock().unwrap();
        Arc::clone(&created.last().expect("no transport created yet").1)
    }

    pub(crate) fn remote_endpoints(&self) -> Vec<String> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(kind, _)| match kind {
                TransportKind::Remote(info) => Some(info.endpoint()),
                TransportKind::Local => None,
            })
            .collect()
    }
}

impl TransportFactory for FakeTransportFactory {
    fn create(&self, kind: &TransportKind) -> Arc<dyn Transport> {
        let transport = FakeTransport::new();
        self.created.lock().unwrap().push((kind.clone(), Arc::clone(&transport)));
        transport
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Runs `uname -vrio` on the node, then reports a fixed answer.
pub(crate) struct FakeUname(pub(crate) OsInfo);

#[async_trait]
impl OsIdentification for FakeUname {
    async fn identify(&self, runner: &dyn CommandRunner) -> OsInfo {
        match runner.execute("uname -vrio", CommandOptions::default().quiet()).await {
            Ok(_) => self.0.clone(),
            Err(_) => OsInfo::default(),
        }
    }
}

/// Runs `echo <template>` on the node, then substitutes fixed values.
pub(crate) struct FakeEcho {
    pub(crate) home: String,
    pub(crate) temp: String,
}

#[async_trait]
impl EnvironmentExpansion for FakeEcho {
    async fn expand(
        &self,
        runner: &dyn CommandRunner,
        template: &str,
    ) -> Result<String, FleetError> {
        runner.execute(&format!("echo {template}"), CommandOptions::shell()).await?;
        Ok(template.replace("$HOME", &self.home).replace("%TEMP%", &self.temp))
    }
}

/// Services wired to `factory`, answering identification with `os`, and a
/// layout for run `run1`.
pub(crate) fn services(factory: &Arc<FakeTransportFactory>, os: OsInfo) -> Arc<FleetServices> {
    let tools = ToolRegistry::new()
        .with_os_identification(Arc::new(FakeUname(os)))
        .with_environment_expansion(Arc::new(FakeEcho {
            home: "/home/user".to_string(),
            temp: "C:\\Temp".to_string(),
        }));
    Arc::new(
        FleetServices::new(factory.clone(), tools)
            .with_layout(WorkingPathLayout::for_run("run1")),
    )
}
