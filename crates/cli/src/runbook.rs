//! Runbook loading: the YAML file that describes an environment.
//!
//! ```yaml
//! ssh_timeout_secs: 30
//! layout:
//!   remote_root: fleet_working
//! nodes:
//!   - type: local
//!     name: builder
//!     is_default: true
//!   - type: remote
//!     name: db
//!     address: 10.0.0.4
//!     public_address: db.example.net
//!     username: ci
//!     private_key_file: ~/.ssh/id_ed25519
//!   - type: requirement
//!     node_count: { min: 2, max: 4 }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fleet::{FleetServices, LocalNode, NodeRequirement, Nodes, RemoteNode, WorkingPathLayout};
use serde::Deserialize;
use shell::ShellTransportFactory;

/// One entry of the runbook's `nodes` list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeEntry {
    Local(LocalNode),
    Remote(RemoteNode),
    Requirement(NodeRequirement),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Runbook {
    #[serde(default)]
    pub layout: Option<WorkingPathLayout>,
    #[serde(default = "default_ssh_timeout_secs")]
    pub ssh_timeout_secs: u64,
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
}

fn default_ssh_timeout_secs() -> u64 {
    shell::DEFAULT_SSH_TIMEOUT.as_secs()
}

impl Default for Runbook {
    /// A single local node, used when no runbook is given.
    fn default() -> Self {
        Self {
            layout: None,
            ssh_timeout_secs: default_ssh_timeout_secs(),
            nodes: vec![NodeEntry::Local(LocalNode {
                name: Some("local".to_string()),
                is_default: true,
            })],
        }
    }
}

impl Runbook {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read runbook {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid runbook {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Wires the production adapters into shared services.
    pub fn services(&self) -> FleetServices {
        let timeout = Duration::from_secs(self.ssh_timeout_secs);
        let transports = Arc::new(ShellTransportFactory::new(timeout));
        let services = FleetServices::new(transports, tools::default_registry());
        match &self.layout {
            Some(layout) => services.with_layout(layout.clone()),
            None => services,
        }
    }

    /// Provisions every entry, in order, into a new collection.
    pub fn build(&self, services: FleetServices) -> Result<Nodes> {
        let mut nodes = Nodes::new(Arc::new(services));
        for (position, entry) in self.nodes.iter().enumerate() {
            let added = match entry {
                NodeEntry::Local(local) => nodes.from_local(local).map(|_| ()),
                NodeEntry::Remote(remote) => nodes.from_remote(remote).map(|_| ()),
                NodeEntry::Requirement(requirement) => {
                    nodes.from_requirement(requirement).map(|_| ())
                }
            };
            added.with_context(|| format!("runbook node entry {position}"))?;
        }
        tracing::debug!(count = nodes.len(), "environment provisioned");
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet::{CountSpace, FleetError};

    const SAMPLE: &str = r#"
ssh_timeout_secs: 5
layout:
  remote_root: ci_work
  run_segment: nightly
  local_path: /tmp/fleetrun/nightly
nodes:
  - type: local
    name: builder
  - type: remote
    name: db
    address: 10.0.0.4
    public_address: db.example.net
    public_port: 2222
    username: ci
    is_default: true
  - type: requirement
    node_count: { min: 2, max: 4 }
    core_count: [4, 8]
"#;

    #[test]
    fn test_parses_every_entry_type() {
        let runbook = Runbook::parse(SAMPLE).unwrap();

        assert_eq!(runbook.ssh_timeout_secs, 5);
        let layout = runbook.layout.clone().unwrap();
        assert_eq!(layout.remote_root, "ci_work");
        assert_eq!(layout.run_segment, "nightly");
        assert_eq!(runbook.nodes.len(), 3);

        match &runbook.nodes[1] {
            NodeEntry::Remote(remote) => {
                assert_eq!(remote.port, 22);
                assert_eq!(remote.connection_info().endpoint(), "db.example.net:2222");
            }
            other => panic!("unexpected entry: {other:?}"),
        }
        match &runbook.nodes[2] {
            NodeEntry::Requirement(requirement) => {
                assert_eq!(requirement.node_count, CountSpace::Range { min: 2, max: Some(4) });
                assert_eq!(requirement.core_count, Some(CountSpace::Choices(vec![4, 8])));
            }
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_node_type_is_rejected() {
        let err = Runbook::parse("nodes:\n  - type: docker\n").unwrap_err();
        assert!(err.to_string().contains("docker"), "{err}");
    }

    #[test]
    fn test_build_provisions_in_order() {
        let runbook = Runbook::parse(SAMPLE).unwrap();

        let nodes = runbook.build(runbook.services()).unwrap();

        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes.get("builder").unwrap().index().as_usize(), 0);
        assert!(nodes.get("db").unwrap().is_remote());
        assert_eq!(nodes.default_node().unwrap().name(), "db");
        assert!(nodes.get(3usize).unwrap().requirement().is_some());
    }

    #[test]
    fn test_build_reports_the_failing_entry() {
        let runbook =
            Runbook::parse("nodes:\n  - type: local\n  - type: requirement\n    node_count: []\n")
                .unwrap();

        let err = runbook.build(runbook.services()).unwrap_err();

        assert!(err.to_string().contains("entry 1"), "{err}");
        assert!(matches!(err.downcast_ref::<FleetError>(), Some(FleetError::Resolution { .. })));
    }

    #[test]
    fn test_default_runbook_is_one_local_node() {
        let runbook = Runbook::default();
        let nodes = runbook.build(runbook.services()).unwrap();

        assert_eq!(nodes.len(), 1);
        assert!(!nodes.default_node().unwrap().is_remote());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runbook.yml");
        std::fs::write(&path, "nodes: []\n").unwrap();

        let runbook = Runbook::load(&path).unwrap();

        assert!(runbook.nodes.is_empty());
        assert!(Runbook::load(&dir.path().join("missing.yml")).is_err());
    }
}
