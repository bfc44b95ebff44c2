//! The cluster endpoint: where messages from every node arrive.
//!
//! Physical connections push events into a [`NodeMessageSink`]. The
//! endpoint attributes each event to a node, applies the propagation
//! policy and fans the event out to listeners and observers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use ember_cluster::ClusterNode;
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::ClusterPubSubConfig;
use crate::listener::{ListenerSet, SharedListener};
use crate::message::{NodeEvent, PubSubEvent};

/// Owns the listener set, the propagation flag and the home node of a
/// cluster pub/sub connection.
pub struct ClusterEndpoint {
    listeners: ListenerSet,
    propagation: AtomicBool,
    home: ArcSwapOption<ClusterNode>,
    events: broadcast::Sender<NodeEvent>,
}

impl std::fmt::Debug for ClusterEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterEndpoint")
            .field("listeners", &self.listeners.len())
            .field("propagation", &self.node_message_propagation())
            .field("home", &self.cluster_node().map(|n| n.id.clone()))
            .finish()
    }
}

impl ClusterEndpoint {
    pub fn new(config: &ClusterPubSubConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            listeners: ListenerSet::new(),
            propagation: AtomicBool::new(config.node_message_propagation),
            home: ArcSwapOption::empty(),
            events,
        }
    }

    /// Sets the node this connection landed on. Last writer wins.
    pub fn set_cluster_node(&self, node: ClusterNode) {
        debug!(node_id = %node.id, addr = %node.addr, "home node assigned");
        self.home.store(Some(Arc::new(node)));
    }

    pub fn cluster_node(&self) -> Option<Arc<ClusterNode>> {
        self.home.load_full()
    }

    pub fn set_node_message_propagation(&self, enabled: bool) {
        self.propagation.store(enabled, Ordering::Release);
    }

    pub fn node_message_propagation(&self) -> bool {
        self.propagation.load(Ordering::Acquire)
    }

    /// Registers a listener. Adding the same listener twice is a no-op.
    pub fn add_listener(&self, listener: SharedListener) {
        self.listeners.add(listener);
    }

    /// Unregisters a listener; absent listeners are ignored. Once this
    /// returns, the listener is not invoked again.
    pub fn remove_listener(&self, listener: &SharedListener) {
        self.listeners.remove(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Sink for the coordinator's own link. Events are attributed to the
    /// home node as of delivery.
    pub fn upstream_listener(self: &Arc<Self>) -> NodeMessageSink {
        NodeMessageSink {
            endpoint: Arc::clone(self),
            source: Source::Upstream,
        }
    }

    /// Sink for a node connection. `None` means the connection's address
    /// isn't part of the known topology.
    pub fn node_listener(self: &Arc<Self>, node: Option<ClusterNode>) -> NodeMessageSink {
        NodeMessageSink {
            endpoint: Arc::clone(self),
            source: Source::Node(node.map(Arc::new)),
        }
    }

    /// Subscribes to every event that passes the propagation policy.
    pub fn subscribe_events(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    fn is_home(&self, node: Option<&ClusterNode>) -> bool {
        let home = self.home.load();
        match ((*home).as_ref(), node) {
            (Some(home), Some(node)) => home.id == node.id,
            _ => false,
        }
    }

    fn deliver(&self, node: Option<Arc<ClusterNode>>, event: PubSubEvent) -> bool {
        if !self.node_message_propagation() && !self.is_home(node.as_deref()) {
            debug!(
                node_id = node.as_ref().map(|n| n.id.short()).unwrap_or("-"),
                channel = event.channel(),
                "dropping non-home event, propagation disabled"
            );
            return false;
        }

        self.listeners.notify(node.as_deref(), &event);
        if self.events.receiver_count() > 0 {
            // no receivers is not an error, only a lost race with the last
            // observer going away
            let _ = self.events.send(NodeEvent { node, event });
        }
        true
    }
}

#[derive(Clone)]
enum Source {
    Upstream,
    Node(Option<Arc<ClusterNode>>),
}

/// Handle a physical connection pushes its incoming events into.
///
/// Cheap to clone. Holds the endpoint alive.
#[derive(Clone)]
pub struct NodeMessageSink {
    endpoint: Arc<ClusterEndpoint>,
    source: Source,
}

impl std::fmt::Debug for NodeMessageSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            Source::Upstream => "upstream".to_string(),
            Source::Node(Some(node)) => node.id.to_string(),
            Source::Node(None) => "unknown".to_string(),
        };
        f.debug_struct("NodeMessageSink")
            .field("source", &source)
            .finish()
    }
}

impl NodeMessageSink {
    /// Hands an event to the endpoint. Returns false if the propagation
    /// policy dropped it.
    pub fn deliver(&self, event: PubSubEvent) -> bool {
        let node = match &self.source {
            Source::Upstream => self.endpoint.cluster_node(),
            Source::Node(node) => node.clone(),
        };
        self.endpoint.deliver(node, event)
    }

    /// The node events are currently attributed to.
    pub fn node(&self) -> Option<Arc<ClusterNode>> {
        match &self.source {
            Source::Upstream => self.endpoint.cluster_node(),
            Source::Node(node) => node.clone(),
        }
    }

    /// Returns true for the coordinator's own link.
    pub fn is_upstream(&self) -> bool {
        matches!(self.source, Source::Upstream)
    }
}
