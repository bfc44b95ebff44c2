//! The async command view. Every other view funnels through it.

use async_trait::async_trait;
use bytes::Bytes;
use ember_cluster::{ClusterNode, NodeId};

use crate::command::{
    expect_integer, expect_node_id, expect_numsub, expect_ok, expect_string, expect_string_list,
    Command, CommandChannel, Reply,
};
use crate::connection::ClusterPubSubConnection;
use crate::error::PubSubError;
use crate::node::NodeConnection;

use super::selection::AsyncNodeSelection;

pub(crate) fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Pub/sub commands as futures.
///
/// Implementors only provide the channel; every command is a provided
/// method that builds the [`Command`], dispatches it and decodes the
/// reply.
#[async_trait]
pub trait PubSubAsyncCommands: Send + Sync {
    fn channel(&self) -> &dyn CommandChannel;

    /// Sends a raw command and returns the undecoded reply.
    async fn dispatch(&self, command: Command) -> Result<Reply, PubSubError> {
        self.channel().dispatch(command).await
    }

    async fn subscribe(&self, channels: &[&str]) -> Result<(), PubSubError> {
        expect_ok(self.dispatch(Command::Subscribe(owned(channels))).await?)
    }

    async fn unsubscribe(&self, channels: &[&str]) -> Result<(), PubSubError> {
        expect_ok(self.dispatch(Command::Unsubscribe(owned(channels))).await?)
    }

    async fn psubscribe(&self, patterns: &[&str]) -> Result<(), PubSubError> {
        expect_ok(self.dispatch(Command::PSubscribe(owned(patterns))).await?)
    }

    async fn punsubscribe(&self, patterns: &[&str]) -> Result<(), PubSubError> {
        expect_ok(self.dispatch(Command::PUnsubscribe(owned(patterns))).await?)
    }

    /// Publishes a message. Returns the number of clients that received
    /// it, as counted by the node the command reached.
    async fn publish(&self, channel: &str, message: Bytes) -> Result<i64, PubSubError> {
        let command = Command::Publish {
            channel: channel.to_string(),
            message,
        };
        expect_integer("PUBLISH", self.dispatch(command).await?)
    }

    /// Active channels, optionally filtered by a glob pattern.
    async fn pubsub_channels(&self, pattern: Option<&str>) -> Result<Vec<String>, PubSubError> {
        let command = Command::PubSubChannels {
            pattern: pattern.map(String::from),
        };
        expect_string_list("PUBSUB CHANNELS", self.dispatch(command).await?)
    }

    /// Subscriber count per channel, in request order.
    async fn pubsub_numsub(&self, channels: &[&str]) -> Result<Vec<(String, i64)>, PubSubError> {
        expect_numsub(self.dispatch(Command::PubSubNumSub(owned(channels))).await?)
    }

    async fn pubsub_numpat(&self) -> Result<i64, PubSubError> {
        expect_integer("PUBSUB NUMPAT", self.dispatch(Command::PubSubNumPat).await?)
    }

    async fn ping(&self) -> Result<String, PubSubError> {
        expect_string("PING", self.dispatch(Command::Ping(None)).await?)
    }

    /// The id of the node this connection is attached to.
    async fn cluster_myid(&self) -> Result<NodeId, PubSubError> {
        expect_node_id(self.dispatch(Command::ClusterMyId).await?)
    }
}

/// Async view of a [`ClusterPubSubConnection`].
///
/// Plain commands go over the connection's own link; node-addressed
/// operations go through its routing writer.
#[derive(Clone)]
pub struct ClusterAsyncCommands {
    connection: ClusterPubSubConnection,
}

impl ClusterAsyncCommands {
    pub(crate) fn new(connection: ClusterPubSubConnection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &ClusterPubSubConnection {
        &self.connection
    }

    /// See [`ClusterPubSubConnection::get_connection`].
    pub async fn get_connection(&self, node_id: &NodeId) -> Result<NodeConnection, PubSubError> {
        self.connection.get_connection(node_id).await
    }

    pub async fn get_connection_by_addr(
        &self,
        host: &str,
        port: u16,
    ) -> Result<NodeConnection, PubSubError> {
        self.connection.get_connection_by_addr(host, port).await
    }

    /// Selects the nodes of the current topology matching `predicate`.
    ///
    /// The selection is a snapshot; later topology changes don't alter it.
    pub fn nodes<P>(&self, predicate: P) -> AsyncNodeSelection
    where
        P: Fn(&ClusterNode) -> bool,
    {
        let nodes = self
            .connection
            .topology()
            .iter()
            .filter(|node| predicate(node))
            .cloned()
            .collect();
        AsyncNodeSelection::new(self.connection.clone(), nodes)
    }

    pub fn primaries(&self) -> AsyncNodeSelection {
        self.nodes(ClusterNode::is_primary)
    }

    pub fn replicas(&self) -> AsyncNodeSelection {
        self.nodes(|node| !node.is_primary())
    }

    pub fn all_nodes(&self) -> AsyncNodeSelection {
        self.nodes(|_| true)
    }
}

impl PubSubAsyncCommands for ClusterAsyncCommands {
    fn channel(&self) -> &dyn CommandChannel {
        self.connection.writer()
    }
}
