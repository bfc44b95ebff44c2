//! Handle to the physical connection of one cluster node.

use std::sync::Arc;

use ember_cluster::{ClusterNode, NodeAddr, NodeId};

use crate::api::PubSubAsyncCommands;
use crate::command::CommandChannel;

/// A connection to a single node, as handed out by a
/// [`ConnectionProvider`](crate::ConnectionProvider).
///
/// Cheap to clone; clones share the underlying channel. Implements the
/// async command view directly, so node connections can be used the same
/// way as the cluster connection.
#[derive(Clone)]
pub struct NodeConnection {
    channel: Arc<dyn CommandChannel>,
    node: Option<ClusterNode>,
    addr: NodeAddr,
}

impl std::fmt::Debug for NodeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConnection")
            .field("addr", &self.addr)
            .field("node_id", &self.node_id())
            .finish()
    }
}

impl NodeConnection {
    /// `node` is `None` when the address is not part of the topology the
    /// connection was created against.
    pub fn new(channel: Arc<dyn CommandChannel>, node: Option<ClusterNode>, addr: NodeAddr) -> Self {
        Self {
            channel,
            node,
            addr,
        }
    }

    pub fn node(&self) -> Option<&ClusterNode> {
        self.node.as_ref()
    }

    pub fn node_id(&self) -> Option<&NodeId> {
        self.node.as_ref().map(|n| &n.id)
    }

    pub fn addr(&self) -> &NodeAddr {
        &self.addr
    }

    /// Returns true if both handles share the same physical channel.
    pub fn same_channel(&self, other: &NodeConnection) -> bool {
        Arc::as_ptr(&self.channel) as *const () == Arc::as_ptr(&other.channel) as *const ()
    }
}

impl PubSubAsyncCommands for NodeConnection {
    fn channel(&self) -> &dyn CommandChannel {
        &*self.channel
    }
}
