//! Pub/sub commands, replies, and the channel they travel over.
//!
//! Encoding to the wire is the channel's business. This module only
//! describes what is sent ([`Command`]), what comes back ([`Reply`]) and
//! how typed views decode the reply.

use async_trait::async_trait;
use bytes::Bytes;
use ember_cluster::NodeId;

use crate::error::PubSubError;

/// Routing hint passed to connection providers.
///
/// Read commands may be served by any equivalent connection for a node;
/// write commands need the node's primary link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Read,
    Write,
}

/// A pub/sub command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    PSubscribe(Vec<String>),
    PUnsubscribe(Vec<String>),
    Publish { channel: String, message: Bytes },
    /// PUBSUB CHANNELS [pattern]
    PubSubChannels { pattern: Option<String> },
    /// PUBSUB NUMSUB [channel ...]
    PubSubNumSub(Vec<String>),
    /// PUBSUB NUMPAT
    PubSubNumPat,
    Ping(Option<Bytes>),
    /// CLUSTER MYID, used to find the node a connection landed on.
    ClusterMyId,
}

impl Command {
    /// Returns the command name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Subscribe(_) => "SUBSCRIBE",
            Command::Unsubscribe(_) => "UNSUBSCRIBE",
            Command::PSubscribe(_) => "PSUBSCRIBE",
            Command::PUnsubscribe(_) => "PUNSUBSCRIBE",
            Command::Publish { .. } => "PUBLISH",
            Command::PubSubChannels { .. } => "PUBSUB CHANNELS",
            Command::PubSubNumSub(_) => "PUBSUB NUMSUB",
            Command::PubSubNumPat => "PUBSUB NUMPAT",
            Command::Ping(_) => "PING",
            Command::ClusterMyId => "CLUSTER MYID",
        }
    }

    /// Introspection commands only read; everything else changes
    /// connection or cluster state.
    pub fn intent(&self) -> Intent {
        match self {
            Command::PubSubChannels { .. }
            | Command::PubSubNumSub(_)
            | Command::PubSubNumPat
            | Command::Ping(_) => Intent::Read,
            _ => Intent::Write,
        }
    }

    /// Returns the command as a list of string tokens.
    ///
    /// Used for logging and by test channels; binary payloads are
    /// rendered lossily.
    pub fn to_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.name().split(' ').map(String::from).collect();
        match self {
            Command::Subscribe(names)
            | Command::Unsubscribe(names)
            | Command::PSubscribe(names)
            | Command::PUnsubscribe(names)
            | Command::PubSubNumSub(names) => tokens.extend(names.iter().cloned()),
            Command::Publish { channel, message } => {
                tokens.push(channel.clone());
                tokens.push(String::from_utf8_lossy(message).into_owned());
            }
            Command::PubSubChannels { pattern } => tokens.extend(pattern.iter().cloned()),
            Command::Ping(payload) => {
                if let Some(payload) = payload {
                    tokens.push(String::from_utf8_lossy(payload).into_owned());
                }
            }
            Command::PubSubNumPat | Command::ClusterMyId => {}
        }
        tokens
    }
}

/// A reply frame, shaped after RESP3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple status reply, e.g. `OK` or `PONG`.
    Simple(String),
    /// Error reply, e.g. `ERR unknown command`.
    Error(String),
    Integer(i64),
    /// Binary-safe string.
    Bulk(Bytes),
    Array(Vec<Reply>),
    Null,
}

impl Reply {
    /// Returns `true` if this reply is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Reply::Null)
    }

    /// Turns an error reply into [`PubSubError::Server`].
    pub fn into_result(self) -> Result<Reply, PubSubError> {
        match self {
            Reply::Error(msg) => Err(PubSubError::Server(msg)),
            other => Ok(other),
        }
    }
}

/// A channel that carries commands to one logical destination.
///
/// Implemented by physical node links (outside this crate) and by the
/// routing writer that fronts a cluster connection. Commands on one
/// channel are serialized by its implementation; separate channels run in
/// parallel.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    async fn dispatch(&self, command: Command) -> Result<Reply, PubSubError>;
}

// -- reply decoding --

fn unexpected(command: &'static str, reply: Reply) -> PubSubError {
    PubSubError::UnexpectedReply { command, reply }
}

/// Accepts any non-error reply. Subscription commands answer with
/// confirmations whose content the caller doesn't need.
pub(crate) fn expect_ok(reply: Reply) -> Result<(), PubSubError> {
    reply.into_result().map(|_| ())
}

pub(crate) fn expect_integer(command: &'static str, reply: Reply) -> Result<i64, PubSubError> {
    match reply.into_result()? {
        Reply::Integer(n) => Ok(n),
        other => Err(unexpected(command, other)),
    }
}

fn decode_string(command: &'static str, reply: Reply) -> Result<String, PubSubError> {
    match reply {
        Reply::Simple(s) => Ok(s),
        Reply::Bulk(b) => Ok(String::from_utf8_lossy(&b).into_owned()),
        other => Err(unexpected(command, other)),
    }
}

pub(crate) fn expect_string(command: &'static str, reply: Reply) -> Result<String, PubSubError> {
    decode_string(command, reply.into_result()?)
}

pub(crate) fn expect_node_id(reply: Reply) -> Result<NodeId, PubSubError> {
    let id = expect_string("CLUSTER MYID", reply)?;
    Ok(NodeId::from(id.trim()))
}

pub(crate) fn expect_string_list(
    command: &'static str,
    reply: Reply,
) -> Result<Vec<String>, PubSubError> {
    match reply.into_result()? {
        Reply::Array(items) => items
            .into_iter()
            .map(|item| decode_string(command, item))
            .collect(),
        Reply::Null => Ok(Vec::new()),
        other => Err(unexpected(command, other)),
    }
}

/// Decodes the flat `[channel, count, channel, count, ...]` array
/// returned by PUBSUB NUMSUB.
pub(crate) fn expect_numsub(reply: Reply) -> Result<Vec<(String, i64)>, PubSubError> {
    const NAME: &str = "PUBSUB NUMSUB";
    let items = match reply.into_result()? {
        Reply::Array(items) if items.len() % 2 == 0 => items,
        other => return Err(unexpected(NAME, other)),
    };

    let mut pairs = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(channel), Some(count)) = (iter.next(), iter.next()) {
        let channel = decode_string(NAME, channel)?;
        match count {
            Reply::Integer(n) => pairs.push((channel, n)),
            other => return Err(unexpected(NAME, other)),
        }
    }
    Ok(pairs)
}
