//! The stream command view.
//!
//! Every command is a lazy stream over the async view: nothing is sent
//! until the stream is first polled. Single-value commands yield one item;
//! list replies are flattened into one item per entry.

use std::future::Future;

use bytes::Bytes;
use ember_cluster::{ClusterNode, NodeId};
use futures::stream::{self, BoxStream, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::connection::ClusterPubSubConnection;
use crate::error::PubSubError;
use crate::message::NodeEvent;
use crate::node::NodeConnection;

use super::asynchronous::{owned, ClusterAsyncCommands, PubSubAsyncCommands};
use super::selection::StreamNodeSelection;

/// A stream of command results.
pub type CommandStream<T> = BoxStream<'static, Result<T, PubSubError>>;

fn once<T, F>(future: F) -> CommandStream<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, PubSubError>> + Send + 'static,
{
    stream::once(future).boxed()
}

fn flatten<T, F>(future: F) -> CommandStream<T>
where
    T: Send + 'static,
    F: Future<Output = Result<Vec<T>, PubSubError>> + Send + 'static,
{
    stream::once(future)
        .flat_map(|result| match result {
            Ok(items) => stream::iter(items.into_iter().map(Ok)).left_stream(),
            Err(e) => stream::iter(Some(Err(e))).right_stream(),
        })
        .boxed()
}

/// Pub/sub commands as lazy streams.
pub trait PubSubStreamCommands {
    type Async: PubSubAsyncCommands + Clone + 'static;

    fn async_commands(&self) -> &Self::Async;

    fn subscribe(&self, channels: &[&str]) -> CommandStream<()> {
        let commands = self.async_commands().clone();
        let channels = owned(channels);
        once(async move {
            let channels: Vec<&str> = channels.iter().map(String::as_str).collect();
            commands.subscribe(&channels).await
        })
    }

    fn unsubscribe(&self, channels: &[&str]) -> CommandStream<()> {
        let commands = self.async_commands().clone();
        let channels = owned(channels);
        once(async move {
            let channels: Vec<&str> = channels.iter().map(String::as_str).collect();
            commands.unsubscribe(&channels).await
        })
    }

    fn psubscribe(&self, patterns: &[&str]) -> CommandStream<()> {
        let commands = self.async_commands().clone();
        let patterns = owned(patterns);
        once(async move {
            let patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();
            commands.psubscribe(&patterns).await
        })
    }

    fn punsubscribe(&self, patterns: &[&str]) -> CommandStream<()> {
        let commands = self.async_commands().clone();
        let patterns = owned(patterns);
        once(async move {
            let patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();
            commands.punsubscribe(&patterns).await
        })
    }

    fn publish(&self, channel: &str, message: Bytes) -> CommandStream<i64> {
        let commands = self.async_commands().clone();
        let channel = channel.to_string();
        once(async move { commands.publish(&channel, message).await })
    }

    /// One item per active channel.
    fn pubsub_channels(&self, pattern: Option<&str>) -> CommandStream<String> {
        let commands = self.async_commands().clone();
        let pattern = pattern.map(String::from);
        flatten(async move { commands.pubsub_channels(pattern.as_deref()).await })
    }

    /// One `(channel, count)` item per requested channel.
    fn pubsub_numsub(&self, channels: &[&str]) -> CommandStream<(String, i64)> {
        let commands = self.async_commands().clone();
        let channels = owned(channels);
        flatten(async move {
            let channels: Vec<&str> = channels.iter().map(String::as_str).collect();
            commands.pubsub_numsub(&channels).await
        })
    }

    fn pubsub_numpat(&self) -> CommandStream<i64> {
        let commands = self.async_commands().clone();
        once(async move { commands.pubsub_numpat().await })
    }

    fn ping(&self) -> CommandStream<String> {
        let commands = self.async_commands().clone();
        once(async move { commands.ping().await })
    }

    fn cluster_myid(&self) -> CommandStream<NodeId> {
        let commands = self.async_commands().clone();
        once(async move { commands.cluster_myid().await })
    }
}

/// Stream adapter over any async view.
#[derive(Clone)]
pub struct StreamCommands<A> {
    commands: A,
}

impl<A> StreamCommands<A> {
    pub fn new(commands: A) -> Self {
        Self { commands }
    }
}

impl<A: PubSubAsyncCommands + Clone + 'static> PubSubStreamCommands for StreamCommands<A> {
    type Async = A;

    fn async_commands(&self) -> &A {
        &self.commands
    }
}

/// Stream view of a [`ClusterPubSubConnection`](crate::ClusterPubSubConnection).
pub type ClusterStreamCommands = StreamCommands<ClusterAsyncCommands>;

impl StreamCommands<ClusterAsyncCommands> {
    /// The connection this view belongs to, for topology, listener and
    /// propagation settings.
    pub fn connection(&self) -> &ClusterPubSubConnection {
        self.commands.connection()
    }

    /// Every event delivered to listeners, from the moment this is called.
    ///
    /// A consumer that falls more than the configured event capacity
    /// behind skips the oldest events; listeners are unaffected.
    pub fn observe(&self) -> BoxStream<'static, NodeEvent> {
        let receiver = self.commands.connection().endpoint().subscribe_events();
        BroadcastStream::new(receiver)
            .filter_map(|item| async move {
                match item {
                    Ok(event) => Some(event),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "pub/sub observer lagging, events dropped");
                        None
                    }
                }
            })
            .boxed()
    }

    /// Like [`observe`](Self::observe), without subscription confirmations.
    pub fn observe_messages(&self) -> BoxStream<'static, NodeEvent> {
        self.observe()
            .filter(|e| std::future::ready(e.event.is_message()))
            .boxed()
    }

    /// Yields the node's connection, resolved when first polled.
    pub fn get_connection(
        &self,
        node_id: &NodeId,
    ) -> CommandStream<StreamCommands<NodeConnection>> {
        let commands = self.commands.clone();
        let node_id = node_id.clone();
        once(async move {
            let conn = commands.get_connection(&node_id).await?;
            Ok(StreamCommands::new(conn))
        })
    }

    /// Yields the connection for a host and port, resolved when first
    /// polled.
    pub fn get_connection_by_addr(
        &self,
        host: &str,
        port: u16,
    ) -> CommandStream<StreamCommands<NodeConnection>> {
        let commands = self.commands.clone();
        let host = host.to_string();
        once(async move {
            let conn = commands.get_connection_by_addr(&host, port).await?;
            Ok(StreamCommands::new(conn))
        })
    }

    pub fn nodes<P>(&self, predicate: P) -> StreamNodeSelection
    where
        P: Fn(&ClusterNode) -> bool,
    {
        StreamNodeSelection::new(self.commands.nodes(predicate))
    }

    pub fn primaries(&self) -> StreamNodeSelection {
        StreamNodeSelection::new(self.commands.primaries())
    }

    pub fn replicas(&self) -> StreamNodeSelection {
        StreamNodeSelection::new(self.commands.replicas())
    }

    pub fn all_nodes(&self) -> StreamNodeSelection {
        StreamNodeSelection::new(self.commands.all_nodes())
    }
}
