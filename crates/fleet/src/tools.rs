//! Diagnostic tool ports and the registry that resolves them.
//!
//! A node needs two capabilities from its tools while it bootstraps: learning
//! what operating system it runs, and expanding environment references in a
//! path. Both run commands on the node through a [`CommandRunner`], which
//! during bootstrap is a view that bypasses initialization.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{CommandOptions, ExecutableResult, FleetError, OsInfo, Process};

/// Anything that can run a command on a node.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Starts `command` and returns its handle without waiting.
    async fn execute_async(
        &self,
        command: &str,
        options: CommandOptions,
    ) -> Result<Process, FleetError>;

    /// Starts `command` and waits for it to finish.
    async fn execute(
        &self,
        command: &str,
        options: CommandOptions,
    ) -> Result<ExecutableResult, FleetError> {
        self.execute_async(command, options).await?.wait_result().await
    }
}

/// Reports kernel and OS facts about a node.
#[async_trait]
pub trait OsIdentification: Send + Sync {
    /// Never fails. A node that cannot be identified yields an empty
    /// [`OsInfo`], which classifies as non-Linux.
    async fn identify(&self, runner: &dyn CommandRunner) -> OsInfo;
}

/// Expands environment references (`$HOME`, `%TEMP%`) using the node's shell.
#[async_trait]
pub trait EnvironmentExpansion: Send + Sync {
    async fn expand(
        &self,
        runner: &dyn CommandRunner,
        template: &str,
    ) -> Result<String, FleetError>;
}

/// Registry key for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    OsIdentification,
    EnvironmentExpansion,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OsIdentification => f.write_str("os identification"),
            Self::EnvironmentExpansion => f.write_str("environment expansion"),
        }
    }
}

/// Tools available to nodes, one implementation per [`Capability`].
#[derive(Clone, Default)]
pub struct ToolRegistry {
    os_identification: Option<Arc<dyn OsIdentification>>,
    environment_expansion: Option<Arc<dyn EnvironmentExpansion>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_os_identification(mut self, tool: Arc<dyn OsIdentification>) -> Self {
        self.os_identification = Some(tool);
        self
    }

    pub fn with_environment_expansion(mut self, tool: Arc<dyn EnvironmentExpansion>) -> Self {
        self.environment_expansion = Some(tool);
        self
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::OsIdentification => self.os_identification.is_some(),
            Capability::EnvironmentExpansion => self.environment_expansion.is_some(),
        }
    }

    pub fn os_identification(&self) -> Result<&dyn OsIdentification, FleetError> {
        self.os_identification
            .as_deref()
            .ok_or_else(|| missing(Capability::OsIdentification))
    }

    pub fn environment_expansion(&self) -> Result<&dyn EnvironmentExpansion, FleetError> {
        self.environment_expansion
            .as_deref()
            .ok_or_else(|| missing(Capability::EnvironmentExpansion))
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("os_identification", &self.os_identification.is_some())
            .field("environment_expansion", &self.environment_expansion.is_some())
            .finish()
    }
}

fn missing(capability: Capability) -> FleetError {
    FleetError::configuration(format!("no tool registered for {capability}"))
}
