//! Error types for topology operations.

use crate::NodeId;

/// Errors that can occur while building or querying a topology.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClusterError {
    /// Node not found in the cluster.
    #[error("node {0} does not belong to the cluster")]
    NodeNotFound(NodeId),

    /// Two descriptors in one snapshot share a node id.
    #[error("node {0} appears more than once in the topology")]
    DuplicateNode(NodeId),

    /// A node address could not be parsed.
    #[error("invalid node address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },
}

impl ClusterError {
    pub(crate) fn invalid_address(addr: &str, reason: impl Into<String>) -> Self {
        ClusterError::InvalidAddress {
            addr: addr.to_string(),
            reason: reason.into(),
        }
    }
}
