// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

mod common;

use common::{node, wait_until, FakeCapabilityTransport, FakeMessageTransport};
use futures_util::StreamExt;
use run_tracker::connectivity::{
    MessagingClient, NodeDiscovery, PhoneToWatchConnector, WatchToPhoneConnector,
};
use run_tracker::error::MessagingError;
use run_tracker::models::{DeviceNode, DeviceType, MessagingAction};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_discovery_yields_initial_set_then_changes() {
    let capabilities = Arc::new(FakeCapabilityTransport::with_nodes([node("watch-1")]));
    let discovery = NodeDiscovery::new(capabilities.clone());

    let mut nodes = discovery.observe_connected_devices(DeviceType::Phone);
    let initial = nodes.next().await.unwrap();
    assert_eq!(initial.len(), 1);
    assert_eq!(
        capabilities.queried.lock().unwrap().clone(),
        vec!["running_tracker_wear_app".to_string()]
    );

    capabilities.set_nodes([node("watch-1"), node("watch-2")]);
    let changed = nodes.next().await.unwrap();
    assert_eq!(changed.len(), 2);

    drop(nodes);
    assert_eq!(capabilities.listener_count(), 0);
}

#[tokio::test]
async fn test_discovery_failure_yields_nothing() {
    let discovery = NodeDiscovery::new(Arc::new(FakeCapabilityTransport::failing()));
    let mut nodes = discovery.observe_connected_devices(DeviceType::Watch);
    assert!(nodes.next().await.is_none());
}

#[tokio::test]
async fn test_queued_actions_flush_in_order_on_connect() {
    let transport = Arc::new(FakeMessageTransport::default());
    let client = MessagingClient::new(transport.clone());

    for action in [
        MessagingAction::StartOrResume,
        MessagingAction::DistanceUpdate(120),
        MessagingAction::Pause,
    ] {
        assert_eq!(
            client.send_or_queue_action(action).await,
            Err(MessagingError::Disconnected)
        );
    }
    assert!(transport.sent_actions().is_empty());

    let _incoming = client.connect_to_node("watch-1").await;
    assert_eq!(
        transport.sent_actions(),
        vec![
            MessagingAction::StartOrResume,
            MessagingAction::DistanceUpdate(120),
            MessagingAction::Pause,
        ]
    );
    assert_eq!(client.queued_len().await, 0);

    // Connected sends go straight out
    client
        .send_or_queue_action(MessagingAction::Finish)
        .await
        .unwrap();
    assert_eq!(transport.sent_actions().last(), Some(&MessagingAction::Finish));
}

#[tokio::test]
async fn test_interrupted_flush_keeps_remaining_order() {
    let transport = Arc::new(FakeMessageTransport::default());
    let client = MessagingClient::new(transport.clone());

    client.send_or_queue_action(MessagingAction::StartOrResume).await.ok();
    client.send_or_queue_action(MessagingAction::Pause).await.ok();

    *transport.drop_peer.lock().unwrap() = true;
    let _incoming = client.connect_to_node("watch-1").await;
    assert_eq!(client.connected_node().await, None);
    assert_eq!(client.queued_len().await, 2);

    *transport.drop_peer.lock().unwrap() = false;
    let _incoming = client.connect_to_node("watch-1").await;
    assert_eq!(
        transport.sent_actions(),
        vec![MessagingAction::StartOrResume, MessagingAction::Pause]
    );
}

#[tokio::test]
async fn test_incoming_stream_decodes_actions_only() {
    let transport = Arc::new(FakeMessageTransport::default());
    let client = MessagingClient::new(transport.clone());
    let mut incoming = client.connect_to_node("phone-1").await;

    transport.receive_raw(run_tracker::connectivity::IncomingMessage {
        source_node_id: "phone-1".to_string(),
        path: "some/other/path".to_string(),
        data: b"{}".to_vec(),
    });
    transport.receive("phone-1", MessagingAction::HeartRateUpdate(131));

    let first = tokio::time::timeout(WAIT, incoming.next()).await.unwrap();
    assert_eq!(first, Some(MessagingAction::HeartRateUpdate(131)));

    drop(incoming);
    assert_eq!(transport.listener_count(), 0);
}

/// Wait until the messaging client has connected to its node.
async fn wait_connected(messaging: &MessagingClient) {
    let connected = wait_until(WAIT, || async move { messaging.connected_node().await.is_some() }).await;
    assert!(connected, "messaging client never connected");
}

#[tokio::test]
async fn test_phone_answers_connection_request() {
    let transport = Arc::new(FakeMessageTransport::default());
    let caps = Arc::new(FakeCapabilityTransport::with_nodes([node("watch-1")]));
    let messaging = Arc::new(MessagingClient::new(transport.clone()));
    let phone = PhoneToWatchConnector::new(&NodeDiscovery::new(caps), messaging.clone());
    wait_connected(&messaging).await;

    // Not trackable yet
    transport.receive("watch-1", MessagingAction::ConnectionRequest);
    let t = transport.clone();
    assert!(
        wait_until(WAIT, || {
            let t = t.clone();
            async move { t.sent_actions() == vec![MessagingAction::Untrackable] }
        })
        .await,
        "phone did not answer the connection request"
    );

    phone.set_is_trackable(true).await.unwrap();
    transport.receive("watch-1", MessagingAction::ConnectionRequest);
    let t = transport.clone();
    assert!(
        wait_until(WAIT, || {
            let t = t.clone();
            async move {
                t.sent_actions()
                    == vec![
                        MessagingAction::Untrackable,
                        MessagingAction::Trackable,
                        MessagingAction::Trackable,
                    ]
            }
        })
        .await
    );
}

#[tokio::test]
async fn test_rediscovered_node_reconnects_after_interrupted_send() {
    let transport = Arc::new(FakeMessageTransport::default());
    let caps = Arc::new(FakeCapabilityTransport::with_nodes([node("watch-1")]));
    let messaging = Arc::new(MessagingClient::new(transport.clone()));
    let phone = PhoneToWatchConnector::new(&NodeDiscovery::new(caps.clone()), messaging.clone());
    wait_connected(&messaging).await;

    *transport.drop_peer.lock().unwrap() = true;
    assert_eq!(
        phone.send_action_to_watch(MessagingAction::Pause).await,
        Err(MessagingError::ConnectionInterrupted)
    );
    assert_eq!(messaging.connected_node().await, None);
    assert_eq!(
        phone.send_action_to_watch(MessagingAction::Finish).await,
        Err(MessagingError::Disconnected)
    );
    assert_eq!(messaging.queued_len().await, 2);

    // The watch is still reported by discovery
    *transport.drop_peer.lock().unwrap() = false;
    let c = caps.clone();
    assert!(wait_until(WAIT, || {
        let c = c.clone();
        async move { c.listener_count() > 0 }
    })
    .await);
    caps.set_nodes([node("watch-1")]);
    wait_connected(&messaging).await;

    assert_eq!(messaging.queued_len().await, 0);
    assert_eq!(
        transport.sent_actions(),
        vec![MessagingAction::Pause, MessagingAction::Finish]
    );
    assert_eq!(
        phone.connected_device().borrow().as_ref().map(|n| n.id.clone()),
        Some("watch-1".to_string())
    );

    phone
        .send_action_to_watch(MessagingAction::StartOrResume)
        .await
        .unwrap();
    assert_eq!(
        transport.sent_actions().last(),
        Some(&MessagingAction::StartOrResume)
    );
}

#[tokio::test]
async fn test_set_is_trackable_sends_only_changes() {
    let transport = Arc::new(FakeMessageTransport::default());
    let caps = Arc::new(FakeCapabilityTransport::with_nodes([node("watch-1")]));
    let messaging = Arc::new(MessagingClient::new(transport.clone()));
    let phone = PhoneToWatchConnector::new(&NodeDiscovery::new(caps), messaging.clone());
    wait_connected(&messaging).await;

    phone.set_is_trackable(true).await.unwrap();
    phone.set_is_trackable(true).await.unwrap();
    phone.set_is_trackable(false).await.unwrap();

    assert!(!phone.is_trackable());
    assert_eq!(
        transport.sent_actions(),
        vec![MessagingAction::Trackable, MessagingAction::Untrackable]
    );
}

#[tokio::test]
async fn test_watch_connector_follows_phone() {
    let transport = Arc::new(FakeMessageTransport::default());
    let caps = Arc::new(FakeCapabilityTransport::with_nodes(Vec::new()));
    let watch = WatchToPhoneConnector::new(
        &NodeDiscovery::new(caps.clone()),
        Arc::new(MessagingClient::new(transport.clone())),
    );
    let mut actions = watch.messaging_actions();

    // Queued while no phone is around
    assert_eq!(
        watch.send_action_to_phone(MessagingAction::HeartRateUpdate(99)).await,
        Err(MessagingError::Disconnected)
    );

    let c = caps.clone();
    assert!(wait_until(WAIT, || {
        let c = c.clone();
        async move { c.listener_count() > 0 }
    })
    .await);
    caps.set_nodes([node("phone-1")]);

    let mut connected = watch.connected_device();
    tokio::time::timeout(WAIT, connected.wait_for(|n| n.is_some()))
        .await
        .unwrap()
        .unwrap();

    let t = transport.clone();
    assert!(
        wait_until(WAIT, || {
            let t = t.clone();
            async move { t.sent_actions().len() >= 2 }
        })
        .await
    );
    assert_eq!(
        transport.sent_actions(),
        vec![
            MessagingAction::HeartRateUpdate(99),
            MessagingAction::ConnectionRequest
        ]
    );

    transport.receive("phone-1", MessagingAction::Trackable);
    let action = tokio::time::timeout(WAIT, actions.next()).await.unwrap();
    assert_eq!(action, Some(MessagingAction::Trackable));

    // Phone goes away: later sends are queued again
    caps.set_nodes(Vec::<DeviceNode>::new());
    tokio::time::timeout(WAIT, connected.wait_for(|n| n.is_none()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        watch.send_action_to_phone(MessagingAction::Pause).await,
        Err(MessagingError::Disconnected)
    );
}
