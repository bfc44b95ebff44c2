//! Installing topology snapshots while commands are in flight.

use std::sync::Arc;
use std::time::Duration;

use ember_cluster::{ClusterNode, NodeAddr, NodeId, Topology};
use ember_pubsub::{ClusterPubSubConfig, PubSubAsyncCommands, PubSubError};

use crate::helpers::{topology, two_nodes, Harness};

#[tokio::test]
async fn installed_topology_is_returned() {
    let h = Harness::new(Topology::empty(), "nodeA", ClusterPubSubConfig::default());
    assert!(h.conn.topology().is_empty());

    // same members, different order
    let installed = Topology::new(vec![
        ClusterNode::primary("nodeB", NodeAddr::new("host2", 7000)),
        ClusterNode::primary("nodeA", NodeAddr::new("host1", 7000)),
    ])
    .unwrap();
    h.conn.set_topology(installed);
    assert_eq!(*h.conn.topology(), two_nodes());
}

#[tokio::test]
async fn topology_can_be_installed_before_activation() {
    let h = Harness::new(Topology::empty(), "nodeB", ClusterPubSubConfig::default());
    h.conn.set_topology(two_nodes());
    h.activate().await;
    assert_eq!(h.conn.home_node().unwrap().id, "nodeB");
}

#[tokio::test]
async fn shared_snapshot_reference() {
    let h = Harness::new(Topology::empty(), "nodeA", ClusterPubSubConfig::default());
    let snapshot = Arc::new(two_nodes());
    h.conn.set_topology(Arc::clone(&snapshot));
    assert!(Arc::ptr_eq(&h.conn.topology(), &snapshot));
}

#[tokio::test]
async fn in_flight_command_is_not_redirected() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());
    let conn = h.conn.get_connection(&NodeId::from("nodeB")).await.unwrap();
    h.node("nodeB").set_delay(Duration::from_millis(50));

    let pending = tokio::spawn(async move { conn.ping().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.conn.set_topology(topology(&[("nodeA", None)]));

    assert_eq!(pending.await.unwrap().unwrap(), "PONG");
    let err = h
        .conn
        .get_connection(&NodeId::from("nodeB"))
        .await
        .unwrap_err();
    assert!(matches!(err, PubSubError::NodeNotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lookups_always_see_a_whole_snapshot() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());
    let small = Arc::new(topology(&[("nodeA", None)]));
    let large = Arc::new(topology(&[
        ("nodeA", None),
        ("nodeB", None),
        ("nodeC", None),
    ]));
    h.conn.set_topology(Arc::clone(&large));

    let writer = {
        let conn = h.conn.clone();
        let (small, large) = (Arc::clone(&small), Arc::clone(&large));
        tokio::spawn(async move {
            for i in 0..500 {
                let next = if i % 2 == 0 { &small } else { &large };
                conn.set_topology(Arc::clone(next));
                tokio::task::yield_now().await;
            }
        })
    };

    let reader = {
        let conn = h.conn.clone();
        tokio::spawn(async move {
            for _ in 0..500 {
                let seen = conn.topology();
                assert!(seen.len() == 1 || seen.len() == 3, "torn snapshot: {}", seen.len());
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();
    assert_eq!(*h.conn.topology(), *large);
}
