//! Home node assignment on activation.

use std::time::Duration;

use ember_pubsub::ClusterPubSubConfig;

use crate::helpers::{topology, two_nodes, Harness};

#[tokio::test]
async fn activation_assigns_home_node_from_myid() {
    let h = Harness::new(two_nodes(), "nodeB", ClusterPubSubConfig::default());
    assert!(h.conn.home_node().is_none());

    h.activate().await;

    let home = h.conn.home_node().unwrap();
    assert_eq!(home.id, "nodeB");
    assert_eq!(home.addr.host, "host2");
    assert_eq!(h.link.sent(), vec![vec!["CLUSTER", "MYID"]]);
}

#[tokio::test]
async fn unknown_id_leaves_home_node_unchanged() {
    let h = Harness::new(two_nodes(), "nodeB", ClusterPubSubConfig::default());
    h.activate().await;

    // the link now reports an id the topology doesn't know
    h.conn.set_topology(topology(&[("nodeA", None)]));
    h.activate().await;

    assert_eq!(h.conn.home_node().unwrap().id, "nodeB");
}

#[tokio::test]
async fn probe_failure_is_swallowed() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());
    h.link.break_link();

    h.activate().await;
    assert!(h.conn.home_node().is_none());
}

#[tokio::test]
async fn activation_does_not_wait_for_probe() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());
    h.link.set_delay(Duration::from_millis(200));

    let probe = h.conn.on_activated().unwrap();
    // on_activated returned before the link answered
    assert!(h.conn.home_node().is_none());

    probe.await.unwrap();
    assert_eq!(h.conn.home_node().unwrap().id, "nodeA");
}

#[tokio::test]
async fn reactivation_follows_the_link() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());
    h.activate().await;
    h.activate().await;

    assert_eq!(h.conn.home_node().unwrap().id, "nodeA");
    assert_eq!(h.link.sent_count(), 2);
}

#[test]
fn activation_without_runtime_is_skipped() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());
    assert!(h.conn.on_activated().is_none());
    assert_eq!(h.link.sent_count(), 0);
}
