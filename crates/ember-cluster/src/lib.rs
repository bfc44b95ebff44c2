//! ember-cluster: cluster membership model for the ember pub/sub client.
//!
//! A cluster is described by a [`Topology`]: an immutable snapshot of the
//! nodes that make it up, each identified by a [`NodeId`] and reachable at
//! a [`NodeAddr`]. Snapshots are produced elsewhere (by whatever refreshes
//! the cluster view) and swapped in wholesale by the client; nothing in
//! this crate mutates a snapshot after construction.
//!
//! # Quick Start
//!
//! ```
//! use ember_cluster::{ClusterNode, NodeAddr, Topology};
//!
//! let topology = Topology::new(vec![
//!     ClusterNode::primary("nodeA", NodeAddr::new("10.0.0.1", 7000)),
//!     ClusterNode::primary("nodeB", NodeAddr::new("10.0.0.2", 7000)),
//! ])
//! .unwrap();
//!
//! assert_eq!(topology.get("nodeA").unwrap().addr.port, 7000);
//! assert!(topology.get("nodeC").is_none());
//! ```

mod error;
mod topology;

pub use error::ClusterError;
pub use topology::{ClusterNode, NodeAddr, NodeFlags, NodeId, NodeRole, Topology};
