//! The ordered, append-only collection of nodes in one environment.

use std::sync::{Arc, OnceLock};

use crate::{
    FleetError, FleetServices, LocalNode, Node, NodeIndex, NodeKey, NodeRequirement,
    NodeType, ReleaseFailure, RemoteNode,
};

/// Nodes in creation order, with name lookup and a cached default.
///
/// Membership only grows, and only through [`Nodes::from_local`],
/// [`Nodes::from_remote`] and [`Nodes::from_requirement`]. A node's index is
/// its position, so indices are dense and never reused.
pub struct Nodes {
    services: Arc<FleetServices>,
    nodes: Vec<Node>,
    default: OnceLock<usize>,
}

impl Nodes {
    pub fn new(services: Arc<FleetServices>) -> Self {
        Self {
            services,
            nodes: Vec::new(),
            default: OnceLock::new(),
        }
    }

    /// The node commands go to when the caller does not pick one.
    ///
    /// The first node flagged `is_default`, else the first node. Resolved on
    /// the first successful call and cached for the collection's lifetime;
    /// nodes added later never change the answer.
    ///
    /// # Errors
    ///
    /// [`FleetError::Environment`] when the collection is empty.
    pub fn default_node(&self) -> Result<&Node, FleetError> {
        if let Some(&position) = self.default.get() {
            return Ok(&self.nodes[position]);
        }
        if self.nodes.is_empty() {
            return Err(FleetError::environment("no node found in current environment"));
        }
        let position = self.nodes.iter().position(Node::is_default).unwrap_or(0);
        Ok(&self.nodes[*self.default.get_or_init(|| position)])
    }

    /// Iterates members in creation order. Each call starts a fresh pass.
    pub fn list(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks a node up by position or by exact name. Names are matched in
    /// creation order; the first match wins.
    ///
    /// # Errors
    ///
    /// [`FleetError::Environment`] on an empty collection,
    /// [`FleetError::NotFound`] when nothing matches.
    pub fn get(&self, key: impl Into<NodeKey>) -> Result<&Node, FleetError> {
        let position = self.position(&key.into())?;
        Ok(&self.nodes[position])
    }

    /// Mutable lookup, for owners assigning names.
    pub fn get_mut(&mut self, key: impl Into<NodeKey>) -> Result<&mut Node, FleetError> {
        let position = self.position(&key.into())?;
        Ok(&mut self.nodes[position])
    }

    /// Direct assignment is never allowed; use one of the `from_*`
    /// constructors.
    ///
    /// # Errors
    ///
    /// Always [`FleetError::State`].
    pub fn set(&mut self, key: impl Into<NodeKey>, _node: Node) -> Result<(), FleetError> {
        Err(FleetError::state(format!(
            "cannot assign node {} directly, use from_local, from_remote or from_requirement",
            key.into()
        )))
    }

    fn position(&self, key: &NodeKey) -> Result<usize, FleetError> {
        if self.nodes.is_empty() {
            return Err(FleetError::environment("no node found in current environment"));
        }
        let found = match key {
            NodeKey::Index(index) => (*index < self.nodes.len()).then_some(*index),
            NodeKey::Name(name) => self.nodes.iter().position(|n| n.name() == name),
        };
        found.ok_or_else(|| FleetError::NotFound { key: key.to_string() })
    }

    // -----------------------------------------------------------------------
    // Provisioning
    // -----------------------------------------------------------------------

    /// Appends one local node.
    #[allow(clippy::wrong_self_convention)]
    pub fn from_local(&mut self, entry: &LocalNode) -> Result<&Node, FleetError> {
        let mut node = Node::new(
            self.next_index(),
            None,
            NodeType::Local,
            entry.is_default,
            self.services.clone(),
        );
        if let Some(name) = &entry.name {
            node.set_name(name.clone());
        }
        Ok(self.push(node))
    }

    /// Appends one remote node bound to the entry's endpoint and credentials.
    ///
    /// The node is appended only once fully configured; on error the
    /// collection is unchanged.
    #[allow(clippy::wrong_self_convention)]
    pub fn from_remote(&mut self, entry: &RemoteNode) -> Result<&Node, FleetError> {
        let mut node = Node::new(
            self.next_index(),
            None,
            NodeType::Remote,
            entry.is_default,
            self.services.clone(),
        );
        if let Some(name) = &entry.name {
            node.set_name(name.clone());
        }
        node.set_connection_info(entry.connection_info())?;
        Ok(self.push(node))
    }

    /// Appends as many remote nodes as the minimal form of `requirement`
    /// asks for. Each new node keeps the original (unresolved) requirement.
    ///
    /// The nodes have no connection info yet; whoever provisions the
    /// machines supplies it before first use.
    ///
    /// # Errors
    ///
    /// [`FleetError::Resolution`] if the resolver fails or leaves the node
    /// count abstract. Nothing is appended in that case.
    #[allow(clippy::wrong_self_convention)]
    pub fn from_requirement(
        &mut self,
        requirement: &NodeRequirement,
    ) -> Result<&[Node], FleetError> {
        let resolved = self.services.capabilities.resolve_minimal(requirement)?;
        let count = resolved.node_count.exact().ok_or_else(|| {
            FleetError::resolution(format!(
                "node count must be an integer after resolution, actual: {:?}",
                resolved.node_count
            ))
        })?;

        let start = self.nodes.len();
        for _ in 0..count {
            let node = Node::new(
                self.next_index(),
                Some(requirement.clone()),
                NodeType::Remote,
                requirement.is_default,
                self.services.clone(),
            );
            self.nodes.push(node);
        }
        tracing::debug!(count, first_index = start, "nodes created from requirement");
        Ok(&self.nodes[start..])
    }

    fn next_index(&self) -> NodeIndex {
        NodeIndex::new(self.nodes.len())
    }

    fn push(&mut self, node: Node) -> &Node {
        let position = self.nodes.len();
        self.nodes.push(node);
        &self.nodes[position]
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Closes every node's transport. A failing node does not stop the
    /// others from being closed.
    ///
    /// # Errors
    ///
    /// [`FleetError::Release`] listing every node that failed.
    pub async fn close(&self) -> Result<(), FleetError> {
        let mut failures = Vec::new();
        for node in &self.nodes {
            if let Err(error) = node.close().await {
                tracing::warn!(index = %node.index(), error = %error, "failed to close node");
                failures.push(ReleaseFailure {
                    index: node.index(),
                    error,
                });
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(FleetError::Release { failures })
        }
    }
}

impl<'a> IntoIterator for &'a Nodes {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.list()
    }
}

impl std::fmt::Debug for Nodes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nodes")
            .field("nodes", &self.nodes)
            .field("default", &self.default.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{services, FakeTransportFactory};
    use crate::{CapabilityResolver, CountSpace, OsInfo};

    fn collection() -> (Arc<FakeTransportFactory>, Nodes) {
        let factory = FakeTransportFactory::new();
        let nodes = Nodes::new(services(&factory, OsInfo::default()));
        (factory, nodes)
    }

    fn local(name: &str, is_default: bool) -> LocalNode {
        LocalNode {
            name: Some(name.to_string()),
            is_default,
        }
    }

    fn remote(name: &str, address: &str) -> RemoteNode {
        RemoteNode {
            name: Some(name.to_string()),
            is_default: false,
            address: address.to_string(),
            port: 22,
            public_address: String::new(),
            public_port: 22,
            username: "root".to_string(),
            password: String::new(),
            private_key_file: String::new(),
        }
    }

    struct FixedCount(u32);

    impl CapabilityResolver for FixedCount {
        fn resolve_minimal(
            &self,
            requirement: &NodeRequirement,
        ) -> Result<NodeRequirement, FleetError> {
            Ok(NodeRequirement {
                node_count: CountSpace::Exact(self.0),
                ..requirement.clone()
            })
        }
    }

    struct Unresolved;

    impl CapabilityResolver for Unresolved {
        fn resolve_minimal(
            &self,
            requirement: &NodeRequirement,
        ) -> Result<NodeRequirement, FleetError> {
            Ok(requirement.clone())
        }
    }

    fn with_resolver(resolver: impl CapabilityResolver + 'static) -> Nodes {
        let factory = FakeTransportFactory::new();
        let services = (*services(&factory, OsInfo::default()))
            .clone()
            .with_capabilities(Arc::new(resolver));
        Nodes::new(Arc::new(services))
    }

    #[test]
    fn test_default_is_first_flagged_node() {
        let (_, mut nodes) = collection();
        nodes.from_local(&local("a", false)).unwrap();
        nodes.from_local(&local("b", true)).unwrap();
        nodes.from_local(&local("c", false)).unwrap();

        assert_eq!(nodes.default_node().unwrap().name(), "b");
    }

    #[test]
    fn test_default_falls_back_to_first_node() {
        let (_, mut nodes) = collection();
        nodes.from_local(&local("x", false)).unwrap();
        nodes.from_local(&local("y", false)).unwrap();

        assert_eq!(nodes.default_node().unwrap().name(), "x");
    }

    #[test]
    fn test_default_on_empty_collection_fails() {
        let (_, nodes) = collection();
        let err = nodes.default_node().unwrap_err();
        assert!(matches!(err, FleetError::Environment { .. }));
    }

    #[test]
    fn test_default_is_not_recomputed_after_growth() {
        let (_, mut nodes) = collection();
        nodes.from_local(&local("x", false)).unwrap();
        assert_eq!(nodes.default_node().unwrap().name(), "x");

        nodes.from_local(&local("late", true)).unwrap();
        assert_eq!(nodes.default_node().unwrap().name(), "x");
    }

    #[test]
    fn test_positional_lookup_follows_creation_order() {
        let (_, mut nodes) = collection();
        for name in ["n0", "n1", "n2"] {
            nodes.from_local(&local(name, false)).unwrap();
        }

        for (i, name) in ["n0", "n1", "n2"].iter().enumerate() {
            let node = nodes.get(i).unwrap();
            assert_eq!(node.name(), *name);
            assert_eq!(node.index(), NodeIndex::new(i));
        }
        let err = nodes.get(3usize).unwrap_err();
        assert!(matches!(err, FleetError::NotFound { .. }));
    }

    #[test]
    fn test_name_lookup_returns_first_match() {
        let (_, mut nodes) = collection();
        nodes.from_local(&local("dup", false)).unwrap();
        nodes.from_remote(&remote("dup", "10.0.0.1")).unwrap();

        let node = nodes.get("dup").unwrap();
        assert_eq!(node.index(), NodeIndex::new(0));
        let err = nodes.get("missing").unwrap_err();
        assert!(matches!(err, FleetError::NotFound { .. }));
        assert_eq!(err.to_string(), "Cannot find node 'missing'");
    }

    #[test]
    fn test_lookup_on_empty_collection_is_environment_error() {
        let (_, nodes) = collection();
        assert!(matches!(nodes.get(0usize).unwrap_err(), FleetError::Environment { .. }));
        assert!(matches!(nodes.get("a").unwrap_err(), FleetError::Environment { .. }));
    }

    #[test]
    fn test_direct_assignment_is_always_rejected() {
        let (factory, mut nodes) = collection();
        nodes.from_local(&local("a", false)).unwrap();

        for key in [NodeKey::Index(0), NodeKey::Index(7), NodeKey::Name("a".into())] {
            let replacement = Node::new(
                NodeIndex::new(0),
                None,
                NodeType::Local,
                false,
                services(&factory, OsInfo::default()),
            );
            let err = nodes.set(key, replacement).unwrap_err();
            assert!(matches!(err, FleetError::State { .. }));
        }
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_get_mut_allows_renaming() {
        let (_, mut nodes) = collection();
        nodes.from_local(&LocalNode::default()).unwrap();

        nodes.get_mut(0usize).unwrap().set_name("builder");

        assert_eq!(nodes.get("builder").unwrap().index(), NodeIndex::new(0));
    }

    #[test]
    fn test_from_remote_binds_connection_info() {
        let (factory, mut nodes) = collection();

        let node = nodes.from_remote(&remote("db", "10.1.2.3")).unwrap();

        assert!(node.is_remote());
        assert_eq!(node.connection_info().unwrap().endpoint(), "10.1.2.3:22");
        assert_eq!(factory.remote_endpoints(), vec!["10.1.2.3:22".to_string()]);
    }

    #[test]
    fn test_from_requirement_appends_resolved_count() {
        let mut nodes = with_resolver(FixedCount(3));
        nodes.from_local(&local("controller", false)).unwrap();
        let requirement = NodeRequirement {
            node_count: CountSpace::Range { min: 3, max: Some(10) },
            core_count: Some(CountSpace::Exact(8)),
            memory_mb: None,
            is_default: true,
        };

        let created = nodes.from_requirement(&requirement).unwrap();

        assert_eq!(created.len(), 3);
        let indices: Vec<usize> = created.iter().map(|n| n.index().as_usize()).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        for node in created {
            assert!(node.is_remote());
            assert!(node.is_default());
            assert_eq!(node.requirement(), Some(&requirement));
            assert!(node.connection_info().is_none());
        }
        assert_eq!(nodes.len(), 4);
        for i in 1..4usize {
            assert_eq!(nodes.get(i).unwrap().index(), NodeIndex::new(i));
        }
    }

    #[test]
    fn test_from_requirement_with_default_resolver() {
        let (_, mut nodes) = collection();
        let requirement = NodeRequirement {
            node_count: CountSpace::Choices(vec![4, 2]),
            ..NodeRequirement::default()
        };

        assert_eq!(nodes.from_requirement(&requirement).unwrap().len(), 2);
    }

    #[test]
    fn test_from_requirement_rejects_abstract_count() {
        let mut nodes = with_resolver(Unresolved);
        let requirement = NodeRequirement {
            node_count: CountSpace::Range { min: 1, max: None },
            ..NodeRequirement::default()
        };

        let err = nodes.from_requirement(&requirement).unwrap_err();

        assert!(matches!(err, FleetError::Resolution { .. }));
        assert!(nodes.is_empty());
    }

    #[test]
    fn test_list_is_restartable() {
        let (_, mut nodes) = collection();
        nodes.from_local(&local("a", false)).unwrap();
        nodes.from_local(&local("b", false)).unwrap();

        let first: Vec<&str> = nodes.list().map(Node::name).collect();
        let second: Vec<&str> = (&nodes).into_iter().map(Node::name).collect();
        assert_eq!(first, vec!["a", "b"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_close_attempts_every_node() {
        let (factory, mut nodes) = collection();
        for name in ["a", "b", "c"] {
            nodes.from_local(&local(name, false)).unwrap();
        }
        let transports = factory.created();
        transports[1].fail_close();

        let err = nodes.close().await.unwrap_err();

        match err {
            FleetError::Release { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].index, NodeIndex::new(1));
            }
            other => panic!("unexpected error: {other}"),
        }
        for transport in &transports {
            assert_eq!(transport.calls(), vec!["close"]);
        }
    }

    #[tokio::test]
    async fn test_default_node_executes_commands() {
        let (factory, mut nodes) = collection();
        nodes.from_local(&local("host", true)).unwrap();

        let result = nodes
            .default_node()
            .unwrap()
            .execute("hostname", crate::CommandOptions::default())
            .await
            .unwrap();

        assert!(result.is_success());
        assert!(factory.last().calls().contains(&"spawn hostname".to_string()));
    }
}
