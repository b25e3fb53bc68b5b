//! Protocol-level integration tests for the admin socket (§4.I): inbound
//! control messages (subscribe/ping) interleaved with live event-bus
//! fan-out, filtered per-subscription. Publishing is driven directly
//! against the shared `AppState` handle, the way an HTTP handler's event
//! publish would trigger it in production.

mod common;

use std::collections::HashSet;

use fleet_test_support::JsonTestClient;
use relay_protocol::{AdminClientMessage, AdminServerMessage, SubscriptionFilters};

#[tokio::test]
async fn ping_gets_a_pong_with_a_server_timestamp() {
    let (addr, _state) = common::spawn_app().await;
    let mut client = JsonTestClient::connect(&format!("ws://{addr}/admin")).await.expect("connect");

    client.send(&AdminClientMessage::Ping).await.unwrap();
    let reply: AdminServerMessage = client.recv().await.unwrap();
    assert!(matches!(reply, AdminServerMessage::Pong { .. }));
}

#[tokio::test]
async fn a_fresh_subscriber_sees_unfiltered_events_by_default() {
    let (addr, state) = common::spawn_app().await;
    let mut client = JsonTestClient::connect(&format!("ws://{addr}/admin")).await.expect("connect");

    // Give the handler a beat to register its broadcast subscription before
    // anything is published — the default filters already match everything.
    client.send(&AdminClientMessage::Ping).await.unwrap();
    let _: AdminServerMessage = client.recv().await.unwrap();

    state.event_bus.publish_ephemeral("dev-1", "online", serde_json::json!({}));

    let reply: AdminServerMessage = client.recv().await.unwrap();
    match reply {
        AdminServerMessage::Event { event } => assert_eq!(event.device_id, "dev-1"),
        other => panic!("expected an event, got {other:?}"),
    }
}

#[tokio::test]
async fn subscribing_with_a_device_filter_excludes_other_devices() {
    let (addr, state) = common::spawn_app().await;
    let mut client = JsonTestClient::connect(&format!("ws://{addr}/admin")).await.expect("connect");

    let mut filters = SubscriptionFilters::default();
    filters.device_ids = HashSet::from(["dev-target".to_owned()]);
    client.send(&AdminClientMessage::Subscribe { filters }).await.unwrap();
    let ack: AdminServerMessage = client.recv().await.unwrap();
    assert!(matches!(ack, AdminServerMessage::Subscribed { .. }));

    state.event_bus.publish_ephemeral("dev-other", "battery-low", serde_json::json!({}));
    state.event_bus.publish_ephemeral("dev-target", "battery-critical", serde_json::json!({"battery_percent": 3}));

    let reply: AdminServerMessage = client.recv().await.unwrap();
    match reply {
        AdminServerMessage::Event { event } => {
            assert_eq!(event.device_id, "dev-target");
            assert_eq!(event.event_type, "battery-critical");
        }
        other => panic!("expected the filtered-in event, got {other:?}"),
    }
}

#[tokio::test]
async fn unsubscribing_reverts_to_match_everything() {
    let (addr, state) = common::spawn_app().await;
    let mut client = JsonTestClient::connect(&format!("ws://{addr}/admin")).await.expect("connect");

    let mut filters = SubscriptionFilters::default();
    filters.device_ids = HashSet::from(["dev-only".to_owned()]);
    client.send(&AdminClientMessage::Subscribe { filters }).await.unwrap();
    let _: AdminServerMessage = client.recv().await.unwrap();

    client.send(&AdminClientMessage::Unsubscribe).await.unwrap();
    let _: AdminServerMessage = client.recv().await.unwrap();

    state.event_bus.publish_ephemeral("dev-anything", "online", serde_json::json!({}));
    let reply: AdminServerMessage = client.recv().await.unwrap();
    match reply {
        AdminServerMessage::Event { event } => assert_eq!(event.device_id, "dev-anything"),
        other => panic!("expected an event after unsubscribe, got {other:?}"),
    }
}
