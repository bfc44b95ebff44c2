//! The blocking and stream views against the async view.

use std::time::Duration;

use bytes::Bytes;
use ember_cluster::NodeId;
use ember_pubsub::{
    ClusterPubSubConfig, PubSubAsyncCommands, PubSubBlockingCommands, PubSubError, PubSubEvent,
    PubSubStreamCommands,
};
use futures::StreamExt;

use crate::helpers::{recording_listener, topology, two_nodes, Harness};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

// -- blocking --

#[test]
fn blocking_view_returns_what_async_view_returns() {
    let rt = runtime();
    let h = Harness::with_runtime(
        two_nodes(),
        "nodeA",
        ClusterPubSubConfig::default(),
        rt.handle().clone(),
    );
    let blocking = h.conn.blocking_commands();

    blocking.subscribe(&["a", "b"]).unwrap();
    let channels = blocking.pubsub_channels(None).unwrap();
    assert_eq!(channels, vec!["a", "b"]);
    let from_async = rt
        .block_on(h.conn.async_commands().pubsub_channels(None))
        .unwrap();
    assert_eq!(channels, from_async);

    assert_eq!(blocking.publish("a", Bytes::from_static(b"x")).unwrap(), 1);
    assert_eq!(
        blocking.pubsub_numsub(&["a", "zzz"]).unwrap(),
        vec![("a".to_string(), 1), ("zzz".to_string(), 0)]
    );
    blocking.psubscribe(&["news.*"]).unwrap();
    assert_eq!(blocking.pubsub_numpat().unwrap(), 1);
    blocking.punsubscribe(&["news.*"]).unwrap();
    blocking.unsubscribe(&["a", "b"]).unwrap();
    assert_eq!(blocking.ping().unwrap(), "PONG");
    assert_eq!(blocking.cluster_myid().unwrap(), "nodeA");
}

#[test]
fn blocking_call_times_out() {
    let rt = runtime();
    let config = ClusterPubSubConfig::default().with_command_timeout(Duration::from_millis(50));
    let h = Harness::with_runtime(two_nodes(), "nodeA", config, rt.handle().clone());
    h.link.set_delay(Duration::from_secs(2));

    let err = h.conn.blocking_commands().ping().unwrap_err();
    assert!(matches!(err, PubSubError::Timeout(d) if d == Duration::from_millis(50)));
    assert!(err.is_retryable());
}

#[test]
fn blocking_node_selection_runs_on_every_primary() {
    let rt = runtime();
    let h = Harness::with_runtime(
        topology(&[("nodeA", None), ("nodeB", None), ("nodeB-r", Some("nodeB"))]),
        "nodeA",
        ClusterPubSubConfig::default(),
        rt.handle().clone(),
    );

    let selection = h.conn.blocking_commands().primaries();
    assert_eq!(selection.len(), 2);
    let results = selection.publish("news", Bytes::from_static(b"hi")).unwrap();
    assert!(results.all_ok());
    for (id, result) in results {
        assert_eq!(result.unwrap(), 1, "publish on {id}");
    }
    assert_eq!(h.node("nodeB-r").sent_count(), 0);
}

#[test]
fn blocking_node_connection() {
    let rt = runtime();
    let h = Harness::with_runtime(
        two_nodes(),
        "nodeA",
        ClusterPubSubConfig::default(),
        rt.handle().clone(),
    );
    let blocking = h.conn.blocking_commands();

    let node_b = blocking.get_connection(&NodeId::from("nodeB")).unwrap();
    assert_eq!(node_b.cluster_myid().unwrap(), "nodeB");

    let err = blocking.get_connection(&NodeId::from("nodeC")).err().unwrap();
    assert!(matches!(err, PubSubError::NodeNotFound(_)));
}

#[test]
fn blocking_view_reaches_connection_settings() {
    let rt = runtime();
    let h = Harness::with_runtime(
        two_nodes(),
        "nodeA",
        ClusterPubSubConfig::default(),
        rt.handle().clone(),
    );
    let blocking = h.conn.blocking_commands();

    blocking.connection().set_node_message_propagation(false);
    assert!(!h.conn.endpoint().node_message_propagation());
    let (l, _) = recording_listener();
    blocking.connection().add_listener(l);
    assert_eq!(h.conn.endpoint().listener_count(), 1);
    blocking.connection().set_topology(topology(&[("nodeA", None)]));
    assert_eq!(h.conn.topology().len(), 1);

    let by_addr = blocking.get_connection_by_addr("host1", 7000).unwrap();
    assert_eq!(by_addr.cluster_myid().unwrap(), "nodeA");
}

#[test]
fn current_thread_runtime_is_not_used_for_blocking() {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let h = Harness::with_runtime(
        two_nodes(),
        "nodeA",
        ClusterPubSubConfig::default(),
        rt.handle().clone(),
    );
    let err = h.conn.blocking_commands().ping().unwrap_err();
    assert!(matches!(err, PubSubError::NoRuntime));
}

// -- stream --

#[tokio::test]
async fn stream_sends_nothing_until_polled() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());
    let streams = h.conn.stream_commands();

    let mut subscribe = streams.subscribe(&["news"]);
    let mut selection = streams.all_nodes().ping();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.link.sent_count(), 0);
    assert_eq!(h.node("nodeA").sent_count(), 0);
    assert_eq!(h.node("nodeB").sent_count(), 0);

    assert!(subscribe.next().await.unwrap().is_ok());
    assert!(subscribe.next().await.is_none());
    assert_eq!(h.link.sent(), vec![vec!["SUBSCRIBE", "news"]]);

    let mut pongs = Vec::new();
    while let Some((id, result)) = selection.next().await {
        pongs.push((id.to_string(), result.unwrap()));
    }
    pongs.sort();
    assert_eq!(
        pongs,
        vec![
            ("nodeA".to_string(), "PONG".to_string()),
            ("nodeB".to_string(), "PONG".to_string()),
        ]
    );
}

#[tokio::test]
async fn stream_flattens_list_replies() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());
    h.conn.async_commands().subscribe(&["a", "b", "c"]).await.unwrap();

    let channels: Vec<String> = h
        .conn
        .stream_commands()
        .pubsub_channels(None)
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(channels, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn stream_error_is_a_single_item() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());
    h.link.break_link();

    let items: Vec<_> = h.conn.stream_commands().pubsub_channels(None).collect().await;
    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(PubSubError::Disconnected)));
}

#[tokio::test]
async fn stream_node_connection() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());
    let node_b = h
        .conn
        .stream_commands()
        .get_connection(&NodeId::from("nodeB"))
        .next()
        .await
        .unwrap()
        .unwrap();

    let id = node_b.cluster_myid().next().await.unwrap().unwrap();
    assert_eq!(id, "nodeB");
}

#[tokio::test]
async fn observe_messages_skips_confirmations() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());
    let mut messages = h.conn.stream_commands().observe_messages();

    let upstream = h.conn.upstream_listener();
    upstream.deliver(PubSubEvent::Subscribed {
        channel: "news".into(),
        count: 1,
    });
    upstream.deliver(PubSubEvent::message("news", "hello"));

    let got = messages.next().await.unwrap();
    assert_eq!(got.event, PubSubEvent::message("news", "hello"));
}

#[tokio::test]
async fn lagging_observer_skips_to_recent_events() {
    let config = ClusterPubSubConfig::default().with_event_capacity(1);
    let h = Harness::new(two_nodes(), "nodeA", config);
    let mut events = h.conn.stream_commands().observe();

    let upstream = h.conn.upstream_listener();
    for i in 0..3 {
        upstream.deliver(PubSubEvent::message("news", i.to_string()));
    }

    let got = events.next().await.unwrap();
    assert_eq!(got.event, PubSubEvent::message("news", "2"));
}

#[tokio::test]
async fn stream_node_connection_by_addr() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());
    let streams = h.conn.stream_commands();

    let mut lookup = streams.get_connection_by_addr("host2", 7000);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(h.connector().connects().is_empty());

    let node_b = lookup.next().await.unwrap().unwrap();
    let id = node_b.cluster_myid().next().await.unwrap().unwrap();
    assert_eq!(id, "nodeB");
}

#[tokio::test]
async fn stream_view_reaches_connection_settings() {
    let h = Harness::new(two_nodes(), "nodeA", ClusterPubSubConfig::default());
    let streams = h.conn.stream_commands();

    streams.connection().set_node_message_propagation(false);
    assert!(!h.conn.endpoint().node_message_propagation());
    let (l, _) = recording_listener();
    streams.connection().add_listener(l.clone());
    streams.connection().remove_listener(&l);
    assert_eq!(h.conn.endpoint().listener_count(), 0);
}
