//! Error types for the cluster pub/sub client.

use std::fmt::Display;
use std::time::Duration;

use ember_cluster::{ClusterError, NodeId};

use crate::command::Reply;

/// Errors surfaced by connections, command views and providers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PubSubError {
    /// The node id is not part of the current topology.
    #[error("node {0} does not belong to the cluster")]
    NodeNotFound(NodeId),

    /// No physical connection could be obtained for the target.
    #[error("connection to {target} unavailable: {reason}")]
    Unavailable { target: String, reason: String },

    /// A blocking call did not complete within the command timeout.
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// The reply had a shape the command does not produce.
    #[error("unexpected reply to {command}: {reply:?}")]
    UnexpectedReply { command: &'static str, reply: Reply },

    #[error("connection closed")]
    Disconnected,

    /// Blocking calls need a multi-thread tokio runtime handle; background
    /// tasks need any runtime.
    #[error("no tokio runtime available")]
    NoRuntime,

    #[error("topology error: {0}")]
    Topology(ClusterError),
}

impl PubSubError {
    /// Creates an [`Unavailable`](PubSubError::Unavailable) error.
    pub fn unavailable(target: impl Display, reason: impl Display) -> Self {
        PubSubError::Unavailable {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if repeating the same call later may succeed.
    ///
    /// Routing errors are final: the node is not in the topology the
    /// caller asked against.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PubSubError::Unavailable { .. } | PubSubError::Timeout(_) | PubSubError::Disconnected
        )
    }
}

impl From<ClusterError> for PubSubError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::NodeNotFound(id) => PubSubError::NodeNotFound(id),
            other => PubSubError::Topology(other),
        }
    }
}
