// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Phone and watch connectors.
//!
//! Each connector follows the discovered counterpart node, connects the
//! messaging client to it, and fans received actions out to subscribers.
//! When the node disappears the messaging client drops back to queueing.

use crate::connectivity::discovery::{preferred_node, NodeDiscovery};
use crate::connectivity::messaging::MessagingClient;
use crate::error::MessagingError;
use crate::models::{DeviceNode, DeviceType, MessagingAction};
use crate::stream_utils::broadcast_stream;
use futures_util::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

const ACTION_CHANNEL_CAPACITY: usize = 64;

/// Connection state shared by both connector roles.
struct Connection {
    messaging: Arc<MessagingClient>,
    connected: watch::Receiver<Option<DeviceNode>>,
    actions: broadcast::Sender<MessagingAction>,
    cancel: CancellationToken,
}

impl Connection {
    fn spawn(local: DeviceType, discovery: &NodeDiscovery, messaging: Arc<MessagingClient>) -> Self {
        let (connected_tx, connected) = watch::channel(None);
        let (actions, _) = broadcast::channel(ACTION_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let nodes = discovery.observe_connected_devices(local);
        tokio::spawn(follow_nodes(
            local,
            nodes,
            messaging.clone(),
            connected_tx,
            actions.clone(),
            cancel.clone(),
        ));

        Self {
            messaging,
            connected,
            actions,
            cancel,
        }
    }

    fn messaging_actions(&self) -> BoxStream<'static, MessagingAction> {
        broadcast_stream(self.actions.subscribe())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Track the preferred counterpart node and keep the messaging client
/// connected to it.
async fn follow_nodes(
    local: DeviceType,
    mut nodes: BoxStream<'static, std::collections::HashSet<DeviceNode>>,
    messaging: Arc<MessagingClient>,
    connected_tx: watch::Sender<Option<DeviceNode>>,
    actions: broadcast::Sender<MessagingAction>,
    cancel: CancellationToken,
) {
    let mut forwarder: Option<CancellationToken> = None;

    loop {
        let node_set = tokio::select! {
            _ = cancel.cancelled() => break,
            next = nodes.next() => match next {
                Some(set) => set,
                None => break,
            },
        };

        let node = preferred_node(&node_set);
        let current_id = connected_tx.borrow().as_ref().map(|n| n.id.clone());
        let same_node = node.as_ref().map(|n| &n.id) == current_id.as_ref();
        if same_node {
            // An interrupted send leaves the client disconnected from a node
            // discovery still reports. Reconnect so the queue drains.
            if node.is_none() || messaging.connected_node().await.is_some() {
                continue;
            }
            tracing::info!(node_id = ?current_id, "Reconnecting to node after interrupted send");
        }

        if let Some(token) = forwarder.take() {
            token.cancel();
            messaging.disconnect().await;
        }
        if !same_node {
            connected_tx.send_replace(node.clone());
        }

        let Some(node) = node else {
            continue;
        };

        let incoming = messaging.connect_to_node(&node.id).await;
        let token = cancel.child_token();
        tokio::spawn(forward_actions(incoming, actions.clone(), token.clone()));
        forwarder = Some(token);

        if local == DeviceType::Watch {
            // Ask the phone for its trackable state.
            if let Err(e) = messaging
                .send_or_queue_action(MessagingAction::ConnectionRequest)
                .await
            {
                tracing::debug!(error = %e, "Connection request not delivered");
            }
        }
    }

    if let Some(token) = forwarder {
        token.cancel();
    }
    tracing::debug!(?local, "Node follower stopped");
}

async fn forward_actions(
    mut incoming: BoxStream<'static, MessagingAction>,
    actions: broadcast::Sender<MessagingAction>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = incoming.next() => match next {
                // No subscribers is fine
                Some(action) => { let _ = actions.send(action); }
                None => break,
            },
        }
    }
}

/// Phone side: talks to the watch app.
pub struct PhoneToWatchConnector {
    connection: Connection,
    is_trackable: Arc<watch::Sender<bool>>,
}

impl PhoneToWatchConnector {
    pub fn new(discovery: &NodeDiscovery, messaging: Arc<MessagingClient>) -> Self {
        let connection = Connection::spawn(DeviceType::Phone, discovery, messaging);
        let is_trackable = Arc::new(watch::channel(false).0);

        // Answer connection requests with the current trackable state.
        let mut requests = connection.messaging_actions();
        let messaging = connection.messaging.clone();
        let trackable = is_trackable.clone();
        let cancel = connection.cancel.clone();
        tokio::spawn(async move {
            loop {
                let action = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = requests.next() => match next {
                        Some(action) => action,
                        None => break,
                    },
                };
                if action == MessagingAction::ConnectionRequest {
                    let reply = trackable_action(*trackable.borrow());
                    if let Err(e) = messaging.send_or_queue_action(reply).await {
                        tracing::debug!(error = %e, "Trackable reply not delivered");
                    }
                }
            }
        });

        Self {
            connection,
            is_trackable,
        }
    }

    /// Currently connected watch, if any.
    pub fn connected_device(&self) -> watch::Receiver<Option<DeviceNode>> {
        self.connection.connected.clone()
    }

    /// Actions received from the watch.
    pub fn messaging_actions(&self) -> BoxStream<'static, MessagingAction> {
        self.connection.messaging_actions()
    }

    pub async fn send_action_to_watch(&self, action: MessagingAction) -> Result<(), MessagingError> {
        self.connection.messaging.send_or_queue_action(action).await
    }

    /// Tell the watch whether the phone can currently track a run.
    pub async fn set_is_trackable(&self, is_trackable: bool) -> Result<(), MessagingError> {
        let changed = self.is_trackable.send_if_modified(|current| {
            let changed = *current != is_trackable;
            *current = is_trackable;
            changed
        });
        if !changed {
            return Ok(());
        }
        self.send_action_to_watch(trackable_action(is_trackable)).await
    }

    pub fn is_trackable(&self) -> bool {
        *self.is_trackable.borrow()
    }
}

fn trackable_action(is_trackable: bool) -> MessagingAction {
    if is_trackable {
        MessagingAction::Trackable
    } else {
        MessagingAction::Untrackable
    }
}

/// Watch side: talks to the phone app.
pub struct WatchToPhoneConnector {
    connection: Connection,
}

impl WatchToPhoneConnector {
    pub fn new(discovery: &NodeDiscovery, messaging: Arc<MessagingClient>) -> Self {
        Self {
            connection: Connection::spawn(DeviceType::Watch, discovery, messaging),
        }
    }

    /// Currently connected phone, if any.
    pub fn connected_device(&self) -> watch::Receiver<Option<DeviceNode>> {
        self.connection.connected.clone()
    }

    /// Actions received from the phone.
    pub fn messaging_actions(&self) -> BoxStream<'static, MessagingAction> {
        self.connection.messaging_actions()
    }

    pub async fn send_action_to_phone(&self, action: MessagingAction) -> Result<(), MessagingError> {
        self.connection.messaging.send_or_queue_action(action).await
    }
}
