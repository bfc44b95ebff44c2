//! The cluster pub/sub connection.
//!
//! One handle over many node connections. It owns the topology the
//! routing layer works against, hands out the three command views, and
//! figures out which node its own link landed on when it activates.

use std::sync::Arc;

use arc_swap::ArcSwap;
use ember_cluster::{ClusterNode, NodeId, Topology};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{
    Blocker, BlockingCommands, ClusterAsyncCommands, ClusterBlockingCommands,
    ClusterStreamCommands, PubSubAsyncCommands, StreamCommands,
};
use crate::command::{CommandChannel, Intent};
use crate::config::ClusterPubSubConfig;
use crate::endpoint::{ClusterEndpoint, NodeMessageSink};
use crate::error::PubSubError;
use crate::listener::SharedListener;
use crate::node::NodeConnection;
use crate::provider::ConnectionProvider;
use crate::writer::RoutingWriter;

struct Inner {
    endpoint: Arc<ClusterEndpoint>,
    writer: RoutingWriter,
    topology: ArcSwap<Topology>,
    config: ClusterPubSubConfig,
    runtime: Option<Handle>,
}

/// A pub/sub connection spanning every node of a cluster.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ClusterPubSubConnection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ClusterPubSubConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterPubSubConnection")
            .field("nodes", &self.topology().len())
            .field("endpoint", &self.inner.endpoint)
            .finish()
    }
}

impl ClusterPubSubConnection {
    /// Creates a connection over `channel`, its own link to the cluster.
    ///
    /// Captures the current tokio runtime, if any, for the blocking view
    /// and activation. Use [`with_runtime`](Self::with_runtime) when
    /// constructing outside a runtime.
    ///
    /// The endpoint keeps its own propagation setting; `config` doesn't
    /// override it.
    pub fn new(
        endpoint: Arc<ClusterEndpoint>,
        channel: Arc<dyn CommandChannel>,
        provider: Arc<dyn ConnectionProvider>,
        config: ClusterPubSubConfig,
    ) -> Self {
        Self::build(endpoint, channel, provider, config, Handle::try_current().ok())
    }

    /// Creates a connection whose blocking view and activation run on
    /// `runtime`. The blocking view needs a multi-thread runtime.
    pub fn with_runtime(
        endpoint: Arc<ClusterEndpoint>,
        channel: Arc<dyn CommandChannel>,
        provider: Arc<dyn ConnectionProvider>,
        config: ClusterPubSubConfig,
        runtime: Handle,
    ) -> Self {
        Self::build(endpoint, channel, provider, config, Some(runtime))
    }

    fn build(
        endpoint: Arc<ClusterEndpoint>,
        channel: Arc<dyn CommandChannel>,
        provider: Arc<dyn ConnectionProvider>,
        config: ClusterPubSubConfig,
        runtime: Option<Handle>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint,
                writer: RoutingWriter::new(channel, provider),
                topology: ArcSwap::from_pointee(Topology::empty()),
                config,
                runtime,
            }),
        }
    }

    // -- views --

    /// The canonical async view.
    pub fn async_commands(&self) -> ClusterAsyncCommands {
        ClusterAsyncCommands::new(self.clone())
    }

    /// Blocking view; every call is bounded by the command timeout.
    pub fn blocking_commands(&self) -> ClusterBlockingCommands {
        BlockingCommands::new(self.async_commands(), self.blocker())
    }

    /// Lazy stream view.
    pub fn stream_commands(&self) -> ClusterStreamCommands {
        StreamCommands::new(self.async_commands())
    }

    fn blocker(&self) -> Blocker {
        Blocker::new(self.inner.runtime.clone(), self.inner.config.command_timeout)
    }

    // -- lifecycle --

    /// Called when the connection's own link becomes usable.
    ///
    /// Asks the link which node it is on, in the background, and makes
    /// that node the endpoint's home node. Returns the probe task, or
    /// `None` if there is no runtime to run it on.
    pub fn on_activated(&self) -> Option<JoinHandle<()>> {
        let runtime = self
            .inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok());
        let Some(runtime) = runtime else {
            warn!("no tokio runtime, skipping home node probe");
            return None;
        };

        let this = self.clone();
        Some(runtime.spawn(async move { this.assign_home_node().await }))
    }

    async fn assign_home_node(&self) {
        let id = match self.async_commands().cluster_myid().await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "CLUSTER MYID failed, home node unchanged");
                return;
            }
        };

        match self.lookup(&id) {
            Some(node) => self.inner.endpoint.set_cluster_node(node),
            None => warn!(node_id = %id, "node not in topology, home node unchanged"),
        }
    }

    // -- node connections --

    /// Returns the connection of a node of the current topology.
    ///
    /// Fails with [`PubSubError::NodeNotFound`] without asking the
    /// provider if the id isn't part of the topology. Provider errors are
    /// returned unchanged.
    pub async fn get_connection(&self, node_id: &NodeId) -> Result<NodeConnection, PubSubError> {
        if self.lookup(node_id).is_none() {
            return Err(PubSubError::NodeNotFound(node_id.clone()));
        }
        self.inner
            .writer
            .connection_provider()
            .get_connection(Intent::Write, node_id)
            .await
    }

    /// Returns the connection for a host and port. No membership check.
    pub async fn get_connection_by_addr(
        &self,
        host: &str,
        port: u16,
    ) -> Result<NodeConnection, PubSubError> {
        self.inner
            .writer
            .connection_provider()
            .get_connection_by_addr(Intent::Write, host, port)
            .await
    }

    fn lookup(&self, node_id: &NodeId) -> Option<ClusterNode> {
        self.inner
            .topology
            .load()
            .iter()
            .find(|node| node.id == *node_id)
            .cloned()
    }

    // -- topology --

    /// Installs a new topology and hands it to the routing layer.
    ///
    /// In-flight commands keep the connection they were routed to.
    pub fn set_topology(&self, topology: impl Into<Arc<Topology>>) {
        let topology = topology.into();
        debug!(nodes = topology.len(), "installing cluster topology");
        self.inner.topology.store(Arc::clone(&topology));
        self.inner.writer.set_topology(topology);
    }

    /// The last installed topology, empty until one is set.
    pub fn topology(&self) -> Arc<Topology> {
        self.inner.topology.load_full()
    }

    // -- endpoint --

    /// Whether messages from nodes other than the home node reach
    /// listeners.
    pub fn set_node_message_propagation(&self, enabled: bool) {
        self.inner.endpoint.set_node_message_propagation(enabled);
    }

    /// Registers a listener; adding the same one twice is a no-op.
    pub fn add_listener(&self, listener: SharedListener) {
        self.inner.endpoint.add_listener(listener);
    }

    /// Unregisters a listener. Unknown listeners are ignored.
    pub fn remove_listener(&self, listener: &SharedListener) {
        self.inner.endpoint.remove_listener(listener);
    }

    /// Sink the connection's own link pushes incoming events into.
    pub fn upstream_listener(&self) -> NodeMessageSink {
        self.inner.endpoint.upstream_listener()
    }

    /// The node this connection's own link is on, once known.
    pub fn home_node(&self) -> Option<Arc<ClusterNode>> {
        self.inner.endpoint.cluster_node()
    }

    pub fn endpoint(&self) -> &Arc<ClusterEndpoint> {
        &self.inner.endpoint
    }

    pub fn config(&self) -> &ClusterPubSubConfig {
        &self.inner.config
    }

    pub(crate) fn writer(&self) -> &RoutingWriter {
        &self.inner.writer
    }
}
