//! Resolving node ids and addresses to physical connections.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use ember_cluster::{ClusterNode, NodeAddr, NodeId, Topology};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::command::{CommandChannel, Intent};
use crate::endpoint::{ClusterEndpoint, NodeMessageSink};
use crate::error::PubSubError;
use crate::node::NodeConnection;

/// Hands out the physical connection responsible for a node.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Returns the connection for `node_id`, creating it if needed.
    async fn get_connection(
        &self,
        intent: Intent,
        node_id: &NodeId,
    ) -> Result<NodeConnection, PubSubError>;

    /// Returns the connection for a host and port, creating it if needed.
    /// The address doesn't have to be part of the topology.
    async fn get_connection_by_addr(
        &self,
        intent: Intent,
        host: &str,
        port: u16,
    ) -> Result<NodeConnection, PubSubError>;

    /// Called by the routing writer whenever a new topology is installed.
    fn set_topology(&self, _topology: Arc<Topology>) {}
}

/// Opens physical connections. Implemented by the transport layer.
///
/// Every event the new connection receives must be pushed into `sink`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        addr: &NodeAddr,
        sink: NodeMessageSink,
    ) -> Result<Arc<dyn CommandChannel>, PubSubError>;
}

/// Connection provider that keeps one connection per node address.
///
/// Lookups by id and by address share the cache, so both reach the same
/// physical connection. Concurrent requests for a node that isn't
/// connected yet wait on a single connect; a failed connect is not cached
/// and the next request tries again.
///
/// A cached connection keeps the node it was made for. When the topology
/// puts a different node (or any node, for an address that was unknown)
/// at a cached address, the entry is dropped and the next request
/// connects afresh, so events are attributed to the node now there.
pub struct CachingConnectionProvider<C> {
    connector: C,
    endpoint: Arc<ClusterEndpoint>,
    topology: ArcSwap<Topology>,
    connections: DashMap<NodeAddr, Arc<OnceCell<NodeConnection>>>,
}

impl<C: Connector> CachingConnectionProvider<C> {
    pub fn new(connector: C, endpoint: Arc<ClusterEndpoint>) -> Self {
        Self {
            connector,
            endpoint,
            topology: ArcSwap::from_pointee(Topology::empty()),
            connections: DashMap::new(),
        }
    }

    /// Number of established connections.
    pub fn connection_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|entry| entry.value().initialized())
            .count()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    async fn connection_for(
        &self,
        addr: NodeAddr,
        node: Option<ClusterNode>,
    ) -> Result<NodeConnection, PubSubError> {
        let node_id = node.as_ref().map(|n| &n.id);
        let cell = {
            let mut entry = self.connections.entry(addr.clone()).or_default();
            if entry.value().get().is_some_and(|conn| conn.node_id() != node_id) {
                debug!(%addr, "replacing connection made for another node");
                *entry.value_mut() = Arc::default();
            }
            Arc::clone(entry.value())
        };

        let conn = cell
            .get_or_try_init(|| async {
                let sink = self.endpoint.node_listener(node.clone());
                let channel = self.connector.connect(&addr, sink).await?;
                debug!(
                    %addr,
                    node_id = node.as_ref().map(|n| n.id.short()).unwrap_or("-"),
                    "node connection established"
                );
                Ok::<_, PubSubError>(NodeConnection::new(channel, node.clone(), addr.clone()))
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl<C: Connector> ConnectionProvider for CachingConnectionProvider<C> {
    async fn get_connection(
        &self,
        _intent: Intent,
        node_id: &NodeId,
    ) -> Result<NodeConnection, PubSubError> {
        let node = self
            .topology
            .load()
            .get(node_id.as_str())
            .cloned()
            .ok_or_else(|| PubSubError::NodeNotFound(node_id.clone()))?;
        self.connection_for(node.addr.clone(), Some(node)).await
    }

    async fn get_connection_by_addr(
        &self,
        _intent: Intent,
        host: &str,
        port: u16,
    ) -> Result<NodeConnection, PubSubError> {
        let node = self.topology.load().get_by_addr(host, port).cloned();
        let addr = match &node {
            Some(node) => node.addr.clone(),
            None => NodeAddr::new(host.trim_matches(|c| c == '[' || c == ']'), port),
        };
        self.connection_for(addr, node).await
    }

    fn set_topology(&self, topology: Arc<Topology>) {
        let before = self.connections.len();
        self.connections.retain(|addr, cell| {
            let Some(node) = topology.iter().find(|node| &node.addr == addr) else {
                return false;
            };
            cell.get().map_or(true, |conn| conn.node_id() == Some(&node.id))
        });
        let evicted = before.saturating_sub(self.connections.len());
        if evicted > 0 {
            debug!(evicted, nodes = topology.len(), "evicted stale node connections");
        }
        self.topology.store(topology);
    }
}
