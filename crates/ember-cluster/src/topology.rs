//! Cluster topology snapshots.
//!
//! Defines the nodes of a cluster (identity, address, role, health flags)
//! and the immutable [`Topology`] that groups them. A snapshot is replaced,
//! never edited: readers holding an old snapshot keep a consistent view
//! while a newer one is installed.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ClusterError;

/// Unique identifier for a cluster node.
///
/// Opaque string (40 hex characters on a real cluster). Backed by an
/// `Arc<str>` because ids get copied into every node selection and
/// per-node result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Arc<str>);

impl NodeId {
    /// Creates a node id from any string-like value.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns at most the first 8 characters, for log lines.
    ///
    /// Never splits a multi-byte character, although real ids are ASCII.
    pub fn short(&self) -> &str {
        let s = self.as_str();
        if s.len() <= 8 {
            return s;
        }
        let mut end = 8;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl PartialEq<str> for NodeId {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for NodeId {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Network address of a node.
///
/// Kept as host + port rather than `SocketAddr` because cluster members
/// may announce hostnames. IPv6 hosts are stored without brackets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddr {
    pub host: String,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses a "host:port" string. IPv6 hosts must be bracketed,
    /// e.g. `[::1]:7000`.
    pub fn parse(addr: &str) -> Result<Self, ClusterError> {
        if let Some(rest) = addr.strip_prefix('[') {
            let (host, port_str) = rest
                .split_once("]:")
                .ok_or_else(|| ClusterError::invalid_address(addr, "expected [host]:port"))?;
            let port = parse_port(addr, port_str)?;
            return Ok(Self::new(host, port));
        }

        let (host, port_str) = addr
            .rsplit_once(':')
            .ok_or_else(|| ClusterError::invalid_address(addr, "expected host:port"))?;
        if host.is_empty() {
            return Err(ClusterError::invalid_address(addr, "empty host"));
        }
        if host.contains(':') {
            return Err(ClusterError::invalid_address(
                addr,
                "IPv6 hosts must be bracketed",
            ));
        }
        let port = parse_port(addr, port_str)?;
        Ok(Self::new(host, port))
    }

    /// Returns true if this address is `host:port`.
    pub fn matches(&self, host: &str, port: u16) -> bool {
        let host = host.trim_matches(|c| c == '[' || c == ']');
        self.port == port && self.host.eq_ignore_ascii_case(host)
    }
}

fn parse_port(addr: &str, port_str: &str) -> Result<u16, ClusterError> {
    port_str
        .parse()
        .map_err(|_| ClusterError::invalid_address(addr, format!("invalid port '{port_str}'")))
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// The role of a node in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Primary node that owns slots and accepts writes.
    Primary,
    /// Replica node that mirrors a primary's data.
    Replica,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Primary => write!(f, "primary"),
            NodeRole::Replica => write!(f, "replica"),
        }
    }
}

/// Status flags for a node, as last reported by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeFlags {
    /// The node the topology was fetched from.
    pub myself: bool,
    /// Node is suspected to be failing.
    pub pfail: bool,
    /// Node has been confirmed as failed by the cluster.
    pub fail: bool,
}

impl NodeFlags {
    /// Returns true if the node is considered healthy.
    pub fn is_healthy(&self) -> bool {
        !self.fail && !self.pfail
    }
}

impl fmt::Display for NodeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();
        if self.myself {
            flags.push("myself");
        }
        if self.pfail {
            flags.push("pfail");
        }
        if self.fail {
            flags.push("fail");
        }
        if flags.is_empty() {
            write!(f, "-")
        } else {
            write!(f, "{}", flags.join(","))
        }
    }
}

/// Descriptor of a single cluster node.
///
/// Identity is `id`; two descriptors with the same id describe the same
/// node even if their addresses differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub id: NodeId,
    /// Address for client connections.
    pub addr: NodeAddr,
    pub role: NodeRole,
    /// If this is a replica, the id of its primary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicates: Option<NodeId>,
    #[serde(default)]
    pub flags: NodeFlags,
}

impl ClusterNode {
    /// Creates a primary node descriptor.
    pub fn primary(id: impl Into<NodeId>, addr: NodeAddr) -> Self {
        Self {
            id: id.into(),
            addr,
            role: NodeRole::Primary,
            replicates: None,
            flags: NodeFlags::default(),
        }
    }

    /// Creates a replica node descriptor.
    pub fn replica(id: impl Into<NodeId>, addr: NodeAddr, primary: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            addr,
            role: NodeRole::Replica,
            replicates: Some(primary.into()),
            flags: NodeFlags::default(),
        }
    }

    /// Marks this node as the one the topology was fetched from.
    pub fn set_myself(&mut self) {
        self.flags.myself = true;
    }

    pub fn is_primary(&self) -> bool {
        self.role == NodeRole::Primary
    }

    /// Returns true if this node is healthy and can serve requests.
    pub fn is_healthy(&self) -> bool {
        self.flags.is_healthy()
    }
}

impl fmt::Display for ClusterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.id.short(), self.addr, self.role, self.flags)
    }
}

/// Point-in-time view of cluster membership.
///
/// Node ids are unique within a snapshot. Equality compares membership:
/// two snapshots holding the same descriptors in a different order are
/// equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<ClusterNode>", into = "Vec<ClusterNode>")]
pub struct Topology {
    nodes: Vec<ClusterNode>,
}

impl Topology {
    /// Builds a snapshot from a list of nodes.
    ///
    /// Fails with [`ClusterError::DuplicateNode`] if two descriptors share
    /// an id.
    pub fn new(nodes: Vec<ClusterNode>) -> Result<Self, ClusterError> {
        for (i, node) in nodes.iter().enumerate() {
            if nodes[..i].iter().any(|other| other.id == node.id) {
                return Err(ClusterError::DuplicateNode(node.id.clone()));
            }
        }
        Ok(Self { nodes })
    }

    /// An empty snapshot, used before the first refresh arrives.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Looks up a node by id.
    ///
    /// Linear scan: snapshots are small and lookups are rare compared to
    /// message traffic.
    pub fn get(&self, id: &str) -> Option<&ClusterNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Like [`get`](Self::get), but fails with [`ClusterError::NodeNotFound`].
    pub fn require(&self, id: &NodeId) -> Result<&ClusterNode, ClusterError> {
        self.get(id.as_str())
            .ok_or_else(|| ClusterError::NodeNotFound(id.clone()))
    }

    /// Looks up a node by its client address.
    pub fn get_by_addr(&self, host: &str, port: u16) -> Option<&ClusterNode> {
        self.nodes.iter().find(|node| node.addr.matches(host, port))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClusterNode> {
        self.nodes.iter()
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    /// Returns all primary nodes.
    pub fn primaries(&self) -> impl Iterator<Item = &ClusterNode> {
        self.nodes.iter().filter(|n| n.role == NodeRole::Primary)
    }

    /// Returns all replica nodes.
    pub fn replicas(&self) -> impl Iterator<Item = &ClusterNode> {
        self.nodes.iter().filter(|n| n.role == NodeRole::Replica)
    }

    /// Returns replicas of a specific primary.
    pub fn replicas_of<'a>(&'a self, primary: &'a NodeId) -> impl Iterator<Item = &'a ClusterNode> {
        self.nodes
            .iter()
            .filter(move |n| n.replicates.as_ref() == Some(primary))
    }
}

impl PartialEq for Topology {
    fn eq(&self, other: &Self) -> bool {
        self.nodes.len() == other.nodes.len()
            && self
                .nodes
                .iter()
                .all(|node| other.get(node.id.as_str()) == Some(node))
    }
}

impl Eq for Topology {}

impl TryFrom<Vec<ClusterNode>> for Topology {
    type Error = ClusterError;

    fn try_from(nodes: Vec<ClusterNode>) -> Result<Self, Self::Error> {
        Self::new(nodes)
    }
}

impl From<Topology> for Vec<ClusterNode> {
    fn from(topology: Topology) -> Self {
        topology.nodes
    }
}

impl<'a> IntoIterator for &'a Topology {
    type Item = &'a ClusterNode;
    type IntoIter = std::slice::Iter<'a, ClusterNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}
