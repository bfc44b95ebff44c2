//! Events pushed by nodes to subscribed connections.

use std::sync::Arc;

use bytes::Bytes;
use ember_cluster::ClusterNode;

/// An event received on a subscribed connection.
///
/// Channel and pattern names are `Arc<str>` so every listener and
/// observer receiving the same event shares one allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubSubEvent {
    /// A message published to a subscribed channel.
    Message { channel: Arc<str>, data: Bytes },
    /// A message published to a channel matching a subscribed pattern.
    PMessage {
        pattern: Arc<str>,
        channel: Arc<str>,
        data: Bytes,
    },
    /// Confirmation of SUBSCRIBE, with the connection's subscription count.
    Subscribed { channel: Arc<str>, count: i64 },
    Unsubscribed { channel: Arc<str>, count: i64 },
    PSubscribed { pattern: Arc<str>, count: i64 },
    PUnsubscribed { pattern: Arc<str>, count: i64 },
}

impl PubSubEvent {
    pub fn message(channel: &str, data: impl Into<Bytes>) -> Self {
        PubSubEvent::Message {
            channel: Arc::from(channel),
            data: data.into(),
        }
    }

    pub fn pmessage(pattern: &str, channel: &str, data: impl Into<Bytes>) -> Self {
        PubSubEvent::PMessage {
            pattern: Arc::from(pattern),
            channel: Arc::from(channel),
            data: data.into(),
        }
    }

    /// Returns true for published messages, false for subscription
    /// confirmations.
    pub fn is_message(&self) -> bool {
        matches!(self, PubSubEvent::Message { .. } | PubSubEvent::PMessage { .. })
    }

    /// The channel for channel events, the pattern for pattern
    /// confirmations.
    pub fn channel(&self) -> &str {
        match self {
            PubSubEvent::Message { channel, .. }
            | PubSubEvent::PMessage { channel, .. }
            | PubSubEvent::Subscribed { channel, .. }
            | PubSubEvent::Unsubscribed { channel, .. } => &**channel,
            PubSubEvent::PSubscribed { pattern, .. } | PubSubEvent::PUnsubscribed { pattern, .. } => {
                &**pattern
            }
        }
    }

    /// The payload, for published messages.
    pub fn data(&self) -> Option<&Bytes> {
        match self {
            PubSubEvent::Message { data, .. } | PubSubEvent::PMessage { data, .. } => Some(data),
            _ => None,
        }
    }
}

/// An event together with the node it was attributed to.
///
/// `node` is `None` when the sending connection could not be tied to a
/// node of the current topology.
#[derive(Debug, Clone)]
pub struct NodeEvent {
    pub node: Option<Arc<ClusterNode>>,
    pub event: PubSubEvent,
}
