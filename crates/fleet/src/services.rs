//! Collaborators shared by every node in a collection.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    CapabilityResolver, MinimalCapabilityResolver, TargetPath, ToolRegistry, TransportFactory,
};

pub const DEFAULT_REMOTE_ROOT: &str = "fleet_working";
pub const DEFAULT_LOCAL_ROOT: &str = "runtime/runs";

/// Where a node keeps run artifacts.
///
/// Remote nodes use `<home-or-temp>/<remote_root>/<run_segment>`; local nodes
/// use `local_path` as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingPathLayout {
    pub remote_root: String,
    pub run_segment: String,
    pub local_path: PathBuf,
}

impl WorkingPathLayout {
    /// Layout for a named run, with the default roots.
    pub fn for_run(run_segment: impl Into<String>) -> Self {
        let run_segment = run_segment.into();
        Self {
            remote_root: DEFAULT_REMOTE_ROOT.to_string(),
            local_path: PathBuf::from(DEFAULT_LOCAL_ROOT).join(&run_segment),
            run_segment,
        }
    }

    /// Unexpanded working path for a remote node. Always `/`-separated; the
    /// node's shell expands it and the node reparses the result.
    pub fn remote_template(&self, is_linux: bool) -> String {
        let root = if is_linux { "$HOME" } else { "%TEMP%" };
        format!("{root}/{}/{}", self.remote_root, self.run_segment)
    }

    pub fn local_working_path(&self) -> TargetPath {
        TargetPath::from_local(&self.local_path)
    }
}

impl Default for WorkingPathLayout {
    /// Names the run after the current UTC time, e.g. `20240131-174502-118`.
    fn default() -> Self {
        Self::for_run(Utc::now().format("%Y%m%d-%H%M%S-%3f").to_string())
    }
}

/// Everything a node needs besides its own provisioning entry.
#[derive(Clone)]
pub struct FleetServices {
    pub transports: Arc<dyn TransportFactory>,
    pub tools: ToolRegistry,
    pub capabilities: Arc<dyn CapabilityResolver>,
    pub layout: WorkingPathLayout,
}

impl FleetServices {
    /// Uses [`MinimalCapabilityResolver`] and a timestamped layout.
    pub fn new(transports: Arc<dyn TransportFactory>, tools: ToolRegistry) -> Self {
        Self {
            transports,
            tools,
            capabilities: Arc::new(MinimalCapabilityResolver),
            layout: WorkingPathLayout::default(),
        }
    }

    pub fn with_capabilities(mut self, capabilities: Arc<dyn CapabilityResolver>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_layout(mut self, layout: WorkingPathLayout) -> Self {
        self.layout = layout;
        self
    }
}

impl std::fmt::Debug for FleetServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetServices")
            .field("tools", &self.tools)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}
