//! Routes outgoing commands to node connections.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use ember_cluster::{NodeId, Topology};
use tracing::debug;

use crate::api::PubSubAsyncCommands;
use crate::command::{Command, CommandChannel, Reply};
use crate::error::PubSubError;
use crate::provider::ConnectionProvider;

/// Holds the current topology and the connection provider, and forwards
/// commands either to the coordinator's own link or to a specific node.
pub struct RoutingWriter {
    default: Arc<dyn CommandChannel>,
    provider: Arc<dyn ConnectionProvider>,
    topology: ArcSwap<Topology>,
}

impl RoutingWriter {
    pub fn new(default: Arc<dyn CommandChannel>, provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            default,
            provider,
            topology: ArcSwap::from_pointee(Topology::empty()),
        }
    }

    /// Installs a topology and hands it to the provider.
    pub fn set_topology(&self, topology: Arc<Topology>) {
        self.topology.store(Arc::clone(&topology));
        self.provider.set_topology(topology);
    }

    pub fn topology(&self) -> Arc<Topology> {
        self.topology.load_full()
    }

    pub fn connection_provider(&self) -> &Arc<dyn ConnectionProvider> {
        &self.provider
    }

    /// Sends a command to one node, chosen by id.
    ///
    /// Fails with [`PubSubError::NodeNotFound`] if the node is not part of
    /// the current topology; the provider is not asked in that case.
    pub async fn dispatch_to(&self, node_id: &NodeId, command: Command) -> Result<Reply, PubSubError> {
        if !self.topology.load().contains(node_id.as_str()) {
            return Err(PubSubError::NodeNotFound(node_id.clone()));
        }
        debug!(node_id = node_id.short(), command = command.name(), "routing to node");
        let conn = self
            .connection_provider()
            .get_connection(command.intent(), node_id)
            .await?;
        conn.dispatch(command).await
    }
}

#[async_trait]
impl CommandChannel for RoutingWriter {
    async fn dispatch(&self, command: Command) -> Result<Reply, PubSubError> {
        self.default.dispatch(command).await
    }
}
