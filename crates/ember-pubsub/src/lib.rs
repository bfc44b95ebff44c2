//! ember-pubsub: cluster-aware pub/sub connection.
//!
//! A [`ClusterPubSubConnection`] is one logical pub/sub connection over
//! every node of a cluster. Commands go out over its own link or are
//! routed to a node's connection, which a [`ConnectionProvider`] hands
//! out. Messages pushed by any node arrive at the [`ClusterEndpoint`] and
//! reach the registered listeners, subject to the node message
//! propagation switch.
//!
//! Wire encoding and connection establishment live elsewhere: physical
//! links implement [`CommandChannel`] and are created by a [`Connector`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ember_cluster::ClusterNode;
//! use ember_pubsub::{
//!     ClusterEndpoint, ClusterPubSubConfig, ClusterPubSubConnection, CommandChannel,
//!     ConnectionProvider, PubSubAsyncCommands, PubSubEvent, SharedListener,
//! };
//!
//! # async fn demo(
//! #     link: Arc<dyn CommandChannel>,
//! #     provider: Arc<dyn ConnectionProvider>,
//! #     topology: ember_cluster::Topology,
//! # ) -> Result<(), ember_pubsub::PubSubError> {
//! let config = ClusterPubSubConfig::default();
//! let endpoint = Arc::new(ClusterEndpoint::new(&config));
//! let conn = ClusterPubSubConnection::new(endpoint, link, provider, config);
//! conn.set_topology(topology);
//! conn.on_activated();
//!
//! let listener: SharedListener = Arc::new(|node: Option<&ClusterNode>, event: &PubSubEvent| {
//!     println!("{:?} from {:?}", event, node.map(|n| &n.id));
//! });
//! conn.add_listener(listener);
//!
//! conn.async_commands().subscribe(&["news"]).await?;
//! conn.async_commands().primaries().publish("news", "hello".into()).await;
//! # Ok(())
//! # }
//! ```

mod api;
mod command;
mod config;
mod connection;
mod endpoint;
mod error;
mod listener;
mod message;
mod node;
mod provider;
mod writer;

pub use api::{
    AsyncNodeSelection, Blocker, BlockingCommands, BlockingNodeSelection, ClusterAsyncCommands,
    ClusterBlockingCommands, ClusterStreamCommands, CommandStream, Executions,
    PubSubAsyncCommands, PubSubBlockingCommands, PubSubStreamCommands, StreamCommands,
    StreamNodeSelection,
};
pub use command::{Command, CommandChannel, Intent, Reply};
pub use config::{ClusterPubSubConfig, DEFAULT_COMMAND_TIMEOUT, DEFAULT_EVENT_CAPACITY};
pub use connection::ClusterPubSubConnection;
pub use endpoint::{ClusterEndpoint, NodeMessageSink};
pub use error::PubSubError;
pub use listener::{ClusterPubSubListener, ListenerSet, SharedListener};
pub use message::{NodeEvent, PubSubEvent};
pub use node::NodeConnection;
pub use provider::{CachingConnectionProvider, ConnectionProvider, Connector};
pub use writer::RoutingWriter;
