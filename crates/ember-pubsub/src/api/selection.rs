//! Running a command on a set of nodes.

use std::future::Future;

use bytes::Bytes;
use ember_cluster::{ClusterNode, NodeId};
use futures::future::join_all;
use futures::stream::{BoxStream, FuturesUnordered, StreamExt};

use crate::command::{expect_integer, expect_ok, expect_string, Command, Reply};
use crate::connection::ClusterPubSubConnection;
use crate::error::PubSubError;

use super::asynchronous::owned;
use super::blocking::Blocker;

/// Per-node results of a command run on a node selection, in selection
/// order.
#[derive(Debug)]
pub struct Executions<T> {
    results: Vec<(NodeId, Result<T, PubSubError>)>,
}

impl<T> Executions<T> {
    pub fn get(&self, node_id: &str) -> Option<&Result<T, PubSubError>> {
        self.results
            .iter()
            .find(|(id, _)| id.as_str() == node_id)
            .map(|(_, result)| result)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Result<T, PubSubError>)> {
        self.results.iter().map(|(id, result)| (id, result))
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.results.iter().map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Returns true if the command succeeded on every node.
    pub fn all_ok(&self) -> bool {
        self.results.iter().all(|(_, result)| result.is_ok())
    }

    pub fn into_results(self) -> Vec<(NodeId, Result<T, PubSubError>)> {
        self.results
    }
}

impl<T> IntoIterator for Executions<T> {
    type Item = (NodeId, Result<T, PubSubError>);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// A snapshot of cluster nodes that commands run on concurrently.
#[derive(Clone)]
pub struct AsyncNodeSelection {
    connection: ClusterPubSubConnection,
    nodes: Vec<ClusterNode>,
}

impl std::fmt::Debug for AsyncNodeSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.nodes.iter().map(|n| &n.id))
            .finish()
    }
}

impl AsyncNodeSelection {
    pub(crate) fn new(connection: ClusterPubSubConnection, nodes: Vec<ClusterNode>) -> Self {
        Self { connection, nodes }
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// One future per selected node, each sending `command` through the
    /// routing writer and decoding the reply.
    fn per_node<T, D>(
        &self,
        command: Command,
        decode: D,
    ) -> Vec<impl Future<Output = (NodeId, Result<T, PubSubError>)> + Send + 'static>
    where
        T: Send + 'static,
        D: Fn(Reply) -> Result<T, PubSubError> + Clone + Send + 'static,
    {
        self.nodes
            .iter()
            .map(|node| {
                let connection = self.connection.clone();
                let id = node.id.clone();
                let command = command.clone();
                let decode = decode.clone();
                async move {
                    let result = connection
                        .writer()
                        .dispatch_to(&id, command)
                        .await
                        .and_then(decode);
                    (id, result)
                }
            })
            .collect()
    }

    async fn run<T, D>(&self, command: Command, decode: D) -> Executions<T>
    where
        T: Send + 'static,
        D: Fn(Reply) -> Result<T, PubSubError> + Clone + Send + 'static,
    {
        Executions {
            results: join_all(self.per_node(command, decode)).await,
        }
    }

    pub async fn dispatch(&self, command: Command) -> Executions<Reply> {
        self.run(command, Ok).await
    }

    pub async fn subscribe(&self, channels: &[&str]) -> Executions<()> {
        self.run(Command::Subscribe(owned(channels)), expect_ok).await
    }

    pub async fn unsubscribe(&self, channels: &[&str]) -> Executions<()> {
        self.run(Command::Unsubscribe(owned(channels)), expect_ok).await
    }

    pub async fn psubscribe(&self, patterns: &[&str]) -> Executions<()> {
        self.run(Command::PSubscribe(owned(patterns)), expect_ok).await
    }

    pub async fn punsubscribe(&self, patterns: &[&str]) -> Executions<()> {
        self.run(Command::PUnsubscribe(owned(patterns)), expect_ok).await
    }

    pub async fn ping(&self) -> Executions<String> {
        self.run(Command::Ping(None), |reply| expect_string("PING", reply))
            .await
    }

    pub async fn publish(&self, channel: &str, message: Bytes) -> Executions<i64> {
        let command = Command::Publish {
            channel: channel.to_string(),
            message,
        };
        self.run(command, |reply| expect_integer("PUBLISH", reply)).await
    }
}

/// Blocking adapter over a node selection. Waits for every node under a
/// single command timeout.
#[derive(Debug, Clone)]
pub struct BlockingNodeSelection {
    inner: AsyncNodeSelection,
    blocker: Blocker,
}

impl BlockingNodeSelection {
    pub(crate) fn new(inner: AsyncNodeSelection, blocker: Blocker) -> Self {
        Self { inner, blocker }
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        self.inner.nodes()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn wait<T>(
        &self,
        executions: impl Future<Output = Executions<T>>,
    ) -> Result<Executions<T>, PubSubError> {
        self.blocker
            .block_on(async { Ok::<_, PubSubError>(executions.await) })
    }

    pub fn subscribe(&self, channels: &[&str]) -> Result<Executions<()>, PubSubError> {
        self.wait(self.inner.subscribe(channels))
    }

    pub fn unsubscribe(&self, channels: &[&str]) -> Result<Executions<()>, PubSubError> {
        self.wait(self.inner.unsubscribe(channels))
    }

    pub fn psubscribe(&self, patterns: &[&str]) -> Result<Executions<()>, PubSubError> {
        self.wait(self.inner.psubscribe(patterns))
    }

    pub fn punsubscribe(&self, patterns: &[&str]) -> Result<Executions<()>, PubSubError> {
        self.wait(self.inner.punsubscribe(patterns))
    }

    pub fn ping(&self) -> Result<Executions<String>, PubSubError> {
        self.wait(self.inner.ping())
    }

    pub fn publish(&self, channel: &str, message: Bytes) -> Result<Executions<i64>, PubSubError> {
        self.wait(self.inner.publish(channel, message))
    }
}

/// Stream adapter over a node selection. Yields each node's result as it
/// completes; nothing is sent until the stream is polled.
#[derive(Debug, Clone)]
pub struct StreamNodeSelection {
    inner: AsyncNodeSelection,
}

type NodeResults<T> = BoxStream<'static, (NodeId, Result<T, PubSubError>)>;

impl StreamNodeSelection {
    pub(crate) fn new(inner: AsyncNodeSelection) -> Self {
        Self { inner }
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        self.inner.nodes()
    }

    fn run<T, D>(&self, command: Command, decode: D) -> NodeResults<T>
    where
        T: Send + 'static,
        D: Fn(Reply) -> Result<T, PubSubError> + Clone + Send + 'static,
    {
        self.inner
            .per_node(command, decode)
            .into_iter()
            .collect::<FuturesUnordered<_>>()
            .boxed()
    }

    pub fn dispatch(&self, command: Command) -> NodeResults<Reply> {
        self.run(command, Ok)
    }

    pub fn subscribe(&self, channels: &[&str]) -> NodeResults<()> {
        self.run(Command::Subscribe(owned(channels)), expect_ok)
    }

    pub fn unsubscribe(&self, channels: &[&str]) -> NodeResults<()> {
        self.run(Command::Unsubscribe(owned(channels)), expect_ok)
    }

    pub fn psubscribe(&self, patterns: &[&str]) -> NodeResults<()> {
        self.run(Command::PSubscribe(owned(patterns)), expect_ok)
    }

    pub fn punsubscribe(&self, patterns: &[&str]) -> NodeResults<()> {
        self.run(Command::PUnsubscribe(owned(patterns)), expect_ok)
    }

    pub fn ping(&self) -> NodeResults<String> {
        self.run(Command::Ping(None), |reply| expect_string("PING", reply))
    }

    pub fn publish(&self, channel: &str, message: Bytes) -> NodeResults<i64> {
        let command = Command::Publish {
            channel: channel.to_string(),
            message,
        };
        self.run(command, |reply| expect_integer("PUBLISH", reply))
    }
}
