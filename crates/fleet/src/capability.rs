//! Capability resolution: abstract requirement in, concrete requirement out.

use crate::{CountSpace, FleetError, NodeRequirement};

/// Turns an abstract [`NodeRequirement`] into the smallest concrete one that
/// satisfies it.
///
/// The returned requirement must have an exact `node_count`;
/// [`crate::Nodes::from_requirement`] rejects anything else.
pub trait CapabilityResolver: Send + Sync {
    fn resolve_minimal(&self, requirement: &NodeRequirement) -> Result<NodeRequirement, FleetError>;
}

/// Picks the minimum of every count space.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalCapabilityResolver;

impl CapabilityResolver for MinimalCapabilityResolver {
    fn resolve_minimal(
        &self,
        requirement: &NodeRequirement,
    ) -> Result<NodeRequirement, FleetError> {
        Ok(NodeRequirement {
            node_count: minimal("node_count", &requirement.node_count)?,
            core_count: requirement
                .core_count
                .as_ref()
                .map(|space| minimal("core_count", space))
                .transpose()?,
            memory_mb: requirement
                .memory_mb
                .as_ref()
                .map(|space| minimal("memory_mb", space))
                .transpose()?,
            is_default: requirement.is_default,
        })
    }
}

fn minimal(field: &str, space: &CountSpace) -> Result<CountSpace, FleetError> {
    space
        .minimum()
        .map(CountSpace::Exact)
        .ok_or_else(|| FleetError::resolution(format!("{field} {space:?} has no satisfying value")))
}
