//! The caching connection provider behind a cluster connection.

use ember_cluster::{NodeAddr, NodeId};
use ember_pubsub::{ClusterPubSubConfig, PubSubAsyncCommands, PubSubError};
use futures::future::join_all;

use crate::helpers::{topology, two_nodes, Harness};

#[tokio::test]
async fn node_connection_reaches_the_node() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());

    let conn = h.conn.get_connection(&NodeId::from("nodeB")).await.unwrap();
    assert_eq!(conn.node_id().unwrap(), "nodeB");
    assert_eq!(conn.cluster_myid().await.unwrap(), "nodeB");
    conn.subscribe(&["orders"]).await.unwrap();

    assert_eq!(
        h.node("nodeB").sent(),
        vec![vec!["CLUSTER", "MYID"], vec!["SUBSCRIBE", "orders"]]
    );
    assert_eq!(h.node("nodeA").sent_count(), 0);
}

#[tokio::test]
async fn concurrent_requests_share_one_connect() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());
    let id = NodeId::from("nodeA");

    let conns = join_all((0..16).map(|_| h.conn.get_connection(&id))).await;
    let conns: Vec<_> = conns.into_iter().map(Result::unwrap).collect();

    assert_eq!(h.connector().connects(), vec![NodeAddr::new("host1", 7000)]);
    assert!(conns.windows(2).all(|w| w[0].same_channel(&w[1])));
}

#[tokio::test]
async fn id_and_address_lookups_share_the_cache() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());

    let by_id = h.conn.get_connection(&NodeId::from("nodeB")).await.unwrap();
    let by_addr = h.conn.get_connection_by_addr("host2", 7000).await.unwrap();
    assert!(by_id.same_channel(&by_addr));
    assert_eq!(h.provider.connection_count(), 1);
}

#[tokio::test]
async fn failed_connect_surfaces_unavailable_and_is_not_cached() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());
    h.connector().refuse(NodeAddr::new("host2", 7000));

    for _ in 0..2 {
        let err = h
            .conn
            .get_connection(&NodeId::from("nodeB"))
            .await
            .unwrap_err();
        assert!(matches!(err, PubSubError::Unavailable { ref target, .. } if target == "host2:7000"));
        assert!(err.is_retryable());
    }
    assert_eq!(h.connector().connects().len(), 2);
    assert_eq!(h.provider.connection_count(), 0);
}

#[tokio::test]
async fn topology_change_evicts_departed_nodes() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());
    h.conn.get_connection(&NodeId::from("nodeA")).await.unwrap();
    h.conn.get_connection(&NodeId::from("nodeB")).await.unwrap();
    assert_eq!(h.provider.connection_count(), 2);

    h.conn.set_topology(topology(&[("nodeA", None)]));
    assert_eq!(h.provider.connection_count(), 1);

    // nodeA keeps its connection
    h.conn.get_connection(&NodeId::from("nodeA")).await.unwrap();
    assert_eq!(h.connector().connects().len(), 2);
}
