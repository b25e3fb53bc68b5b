//! Protocol-level integration tests for the signaling switchboard (§4.G),
//! driven over a real socket with `fleet-test-support`'s JSON client. None
//! of these touch the database — room state is entirely in-memory.

mod common;

use fleet_test_support::JsonTestClient;
use relay_protocol::{PeerRole, SignalingClientMessage, SignalingServerMessage};

#[tokio::test]
async fn first_peer_in_a_room_is_told_no_one_else_is_present() {
    let (addr, _state) = common::spawn_app().await;
    let mut device = JsonTestClient::connect(&format!("ws://{addr}/ws")).await.expect("connect");

    device
        .send(&SignalingClientMessage::Join { device_id: "dev-1".into(), role: PeerRole::Device })
        .await
        .expect("send join");
    let reply: SignalingServerMessage = device.recv().await.expect("recv joined");

    match reply {
        SignalingServerMessage::Joined { device_id, peer_present } => {
            assert_eq!(device_id, "dev-1");
            assert!(!peer_present);
        }
        other => panic!("expected Joined, got {other:?}"),
    }
}

#[tokio::test]
async fn second_peer_sees_the_first_and_both_are_notified() {
    let (addr, _state) = common::spawn_app().await;
    let url = format!("ws://{addr}/ws");

    let mut device = JsonTestClient::connect(&url).await.expect("device connects");
    device
        .send(&SignalingClientMessage::Join { device_id: "dev-2".into(), role: PeerRole::Device })
        .await
        .unwrap();
    let _: SignalingServerMessage = device.recv().await.unwrap();

    let mut controller = JsonTestClient::connect(&url).await.expect("controller connects");
    controller
        .send(&SignalingClientMessage::Join { device_id: "dev-2".into(), role: PeerRole::Controller })
        .await
        .unwrap();
    let controller_joined: SignalingServerMessage = controller.recv().await.unwrap();
    assert!(matches!(controller_joined, SignalingServerMessage::Joined { peer_present: true, .. }));

    let device_notified: SignalingServerMessage = device.recv().await.unwrap();
    assert!(matches!(device_notified, SignalingServerMessage::PeerJoined { role: PeerRole::Controller }));
}

#[tokio::test]
async fn offer_and_answer_relay_to_the_counterpart_only() {
    let (addr, _state) = common::spawn_app().await;
    let url = format!("ws://{addr}/ws");

    let mut device = JsonTestClient::connect(&url).await.unwrap();
    device
        .send(&SignalingClientMessage::Join { device_id: "dev-3".into(), role: PeerRole::Device })
        .await
        .unwrap();
    let _: SignalingServerMessage = device.recv().await.unwrap();

    let mut controller = JsonTestClient::connect(&url).await.unwrap();
    controller
        .send(&SignalingClientMessage::Join { device_id: "dev-3".into(), role: PeerRole::Controller })
        .await
        .unwrap();
    let _: SignalingServerMessage = controller.recv().await.unwrap();
    let _: SignalingServerMessage = device.recv().await.unwrap(); // peer-joined

    controller.send(&SignalingClientMessage::Offer { sdp: "v=0 offer".into() }).await.unwrap();
    let offer: SignalingServerMessage = device.recv().await.unwrap();
    assert!(matches!(offer, SignalingServerMessage::Offer { sdp } if sdp == "v=0 offer"));

    device.send(&SignalingClientMessage::Answer { sdp: "v=0 answer".into() }).await.unwrap();
    let answer: SignalingServerMessage = controller.recv().await.unwrap();
    assert!(matches!(answer, SignalingServerMessage::Answer { sdp } if sdp == "v=0 answer"));
}

#[tokio::test]
async fn joining_an_already_taken_role_is_rejected() {
    let (addr, _state) = common::spawn_app().await;
    let url = format!("ws://{addr}/ws");

    let mut first = JsonTestClient::connect(&url).await.unwrap();
    first
        .send(&SignalingClientMessage::Join { device_id: "dev-4".into(), role: PeerRole::Device })
        .await
        .unwrap();
    let _: SignalingServerMessage = first.recv().await.unwrap();

    let mut second = JsonTestClient::connect(&url).await.unwrap();
    second
        .send(&SignalingClientMessage::Join { device_id: "dev-4".into(), role: PeerRole::Device })
        .await
        .unwrap();
    let reply: SignalingServerMessage = second.recv().await.unwrap();
    assert!(matches!(reply, SignalingServerMessage::Error { code, .. } if code == "ROLE_TAKEN"));
}

#[tokio::test]
async fn leaving_notifies_the_counterpart_and_frees_the_role() {
    let (addr, _state) = common::spawn_app().await;
    let url = format!("ws://{addr}/ws");

    let mut device = JsonTestClient::connect(&url).await.unwrap();
    device
        .send(&SignalingClientMessage::Join { device_id: "dev-5".into(), role: PeerRole::Device })
        .await
        .unwrap();
    let _: SignalingServerMessage = device.recv().await.unwrap();

    let mut controller = JsonTestClient::connect(&url).await.unwrap();
    controller
        .send(&SignalingClientMessage::Join { device_id: "dev-5".into(), role: PeerRole::Controller })
        .await
        .unwrap();
    let _: SignalingServerMessage = controller.recv().await.unwrap();
    let _: SignalingServerMessage = device.recv().await.unwrap(); // peer-joined

    controller.send(&SignalingClientMessage::Leave).await.unwrap();
    let left: SignalingServerMessage = device.recv().await.unwrap();
    assert!(matches!(left, SignalingServerMessage::PeerLeft { role: PeerRole::Controller }));

    // The controller role is free again for a new peer.
    let mut rejoin = JsonTestClient::connect(&url).await.unwrap();
    rejoin
        .send(&SignalingClientMessage::Join { device_id: "dev-5".into(), role: PeerRole::Controller })
        .await
        .unwrap();
    let rejoined: SignalingServerMessage = rejoin.recv().await.unwrap();
    assert!(matches!(rejoined, SignalingServerMessage::Joined { peer_present: true, .. }));
}
