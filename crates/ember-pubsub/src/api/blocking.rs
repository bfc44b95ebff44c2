//! The blocking command view.
//!
//! Each call drives the matching async-view future on the connection's
//! tokio runtime and waits for it, up to the configured command timeout.
//! Calling into this view from inside an async task panics, the same as
//! [`Handle::block_on`]. The handle must belong to a multi-thread runtime:
//! a current-thread runtime's timers only run inside its own `block_on`,
//! so such a handle is treated as no runtime at all.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use ember_cluster::{ClusterNode, NodeId};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::warn;

use crate::connection::ClusterPubSubConnection;
use crate::error::PubSubError;
use crate::node::NodeConnection;

use super::asynchronous::{ClusterAsyncCommands, PubSubAsyncCommands};
use super::selection::BlockingNodeSelection;

/// Runs futures to completion on a runtime handle with a time bound.
#[derive(Debug, Clone)]
pub struct Blocker {
    runtime: Option<Handle>,
    timeout: Duration,
}

impl Blocker {
    /// A current-thread `runtime` is dropped with a warning; calls then
    /// fail with [`PubSubError::NoRuntime`].
    pub fn new(runtime: Option<Handle>, timeout: Duration) -> Self {
        let runtime = runtime.filter(|handle| {
            let usable = handle.runtime_flavor() != RuntimeFlavor::CurrentThread;
            if !usable {
                warn!("blocking calls need a multi-thread tokio runtime");
            }
            usable
        });
        Self { runtime, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Blocks the current thread until `future` completes or the timeout
    /// elapses.
    pub fn block_on<F, T>(&self, future: F) -> Result<T, PubSubError>
    where
        F: Future<Output = Result<T, PubSubError>>,
    {
        let runtime = self.runtime.as_ref().ok_or(PubSubError::NoRuntime)?;
        let timeout = self.timeout;
        runtime.block_on(async move {
            match tokio::time::timeout(timeout, future).await {
                Ok(result) => result,
                Err(_) => Err(PubSubError::Timeout(timeout)),
            }
        })
    }
}

/// Pub/sub commands that block until the reply arrives.
///
/// Every method wraps the async view's method of the same name.
pub trait PubSubBlockingCommands {
    type Async: PubSubAsyncCommands;

    fn async_commands(&self) -> &Self::Async;

    fn blocker(&self) -> &Blocker;

    fn subscribe(&self, channels: &[&str]) -> Result<(), PubSubError> {
        self.blocker().block_on(self.async_commands().subscribe(channels))
    }

    fn unsubscribe(&self, channels: &[&str]) -> Result<(), PubSubError> {
        self.blocker()
            .block_on(self.async_commands().unsubscribe(channels))
    }

    fn psubscribe(&self, patterns: &[&str]) -> Result<(), PubSubError> {
        self.blocker().block_on(self.async_commands().psubscribe(patterns))
    }

    fn punsubscribe(&self, patterns: &[&str]) -> Result<(), PubSubError> {
        self.blocker()
            .block_on(self.async_commands().punsubscribe(patterns))
    }

    fn publish(&self, channel: &str, message: Bytes) -> Result<i64, PubSubError> {
        self.blocker()
            .block_on(self.async_commands().publish(channel, message))
    }

    fn pubsub_channels(&self, pattern: Option<&str>) -> Result<Vec<String>, PubSubError> {
        self.blocker()
            .block_on(self.async_commands().pubsub_channels(pattern))
    }

    fn pubsub_numsub(&self, channels: &[&str]) -> Result<Vec<(String, i64)>, PubSubError> {
        self.blocker()
            .block_on(self.async_commands().pubsub_numsub(channels))
    }

    fn pubsub_numpat(&self) -> Result<i64, PubSubError> {
        self.blocker().block_on(self.async_commands().pubsub_numpat())
    }

    fn ping(&self) -> Result<String, PubSubError> {
        self.blocker().block_on(self.async_commands().ping())
    }

    fn cluster_myid(&self) -> Result<NodeId, PubSubError> {
        self.blocker().block_on(self.async_commands().cluster_myid())
    }
}

/// Blocking adapter over any async view.
#[derive(Clone)]
pub struct BlockingCommands<A> {
    commands: A,
    blocker: Blocker,
}

impl<A> BlockingCommands<A> {
    pub fn new(commands: A, blocker: Blocker) -> Self {
        Self { commands, blocker }
    }
}

impl<A: PubSubAsyncCommands> PubSubBlockingCommands for BlockingCommands<A> {
    type Async = A;

    fn async_commands(&self) -> &A {
        &self.commands
    }

    fn blocker(&self) -> &Blocker {
        &self.blocker
    }
}

/// Blocking view of a [`ClusterPubSubConnection`](crate::ClusterPubSubConnection).
pub type ClusterBlockingCommands = BlockingCommands<ClusterAsyncCommands>;

/// Cluster operations. Node selections are handed a node-selection
/// adapter rather than the per-connection one.
impl BlockingCommands<ClusterAsyncCommands> {
    /// The connection this view belongs to, for topology, listener and
    /// propagation settings.
    pub fn connection(&self) -> &ClusterPubSubConnection {
        self.commands.connection()
    }

    pub fn get_connection(
        &self,
        node_id: &NodeId,
    ) -> Result<BlockingCommands<NodeConnection>, PubSubError> {
        let conn = self
            .blocker
            .block_on(self.commands.get_connection(node_id))?;
        Ok(BlockingCommands::new(conn, self.blocker.clone()))
    }

    pub fn get_connection_by_addr(
        &self,
        host: &str,
        port: u16,
    ) -> Result<BlockingCommands<NodeConnection>, PubSubError> {
        let conn = self
            .blocker
            .block_on(self.commands.get_connection_by_addr(host, port))?;
        Ok(BlockingCommands::new(conn, self.blocker.clone()))
    }

    pub fn nodes<P>(&self, predicate: P) -> BlockingNodeSelection
    where
        P: Fn(&ClusterNode) -> bool,
    {
        BlockingNodeSelection::new(self.commands.nodes(predicate), self.blocker.clone())
    }

    pub fn primaries(&self) -> BlockingNodeSelection {
        BlockingNodeSelection::new(self.commands.primaries(), self.blocker.clone())
    }

    pub fn replicas(&self) -> BlockingNodeSelection {
        BlockingNodeSelection::new(self.commands.replicas(), self.blocker.clone())
    }

    pub fn all_nodes(&self) -> BlockingNodeSelection {
        BlockingNodeSelection::new(self.commands.all_nodes(), self.blocker.clone())
    }
}
