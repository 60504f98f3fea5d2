// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Messaging client for phone/watch actions.
//!
//! Sending while disconnected queues the action. Connecting to a node
//! flushes the queue in FIFO order before anything new is sent. The queue
//! and the connected node share one mutex, so the send path and the flush
//! path never interleave.
//!
//! There is no acknowledgement protocol. Control actions
//! ([`DeliveryClass::Reliable`]) that fail because the peer dropped are put
//! back on the queue and re-sent on the next connection. A queued control
//! action that fails for any other reason stays at the head of the queue and
//! is retried before the next send. Gauge updates are dropped on failure.

use crate::error::MessagingError;
use crate::models::messaging::{decode_action, encode_action, MESSAGING_ACTION_PATH};
use crate::models::{DeliveryClass, MessagingAction};
use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Failure reported by the platform message transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer went away while the message was in flight.
    #[error("Peer disconnected")]
    PeerDisconnected,

    #[error("Transport error: {0}")]
    Other(String),
}

/// A raw message received from a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub source_node_id: String,
    pub path: String,
    pub data: Vec<u8>,
}

/// Platform byte-message transport between paired devices.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send_message(
        &self,
        node_id: &str,
        path: &str,
        data: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Every message received from any peer. Dropping the stream
    /// unregisters the listener.
    fn incoming_messages(&self) -> BoxStream<'static, IncomingMessage>;
}

#[derive(Default)]
struct MessagingState {
    connected_node: Option<String>,
    queue: VecDeque<MessagingAction>,
}

/// Sends and receives [`MessagingAction`]s for one paired peer at a time.
pub struct MessagingClient {
    transport: Arc<dyn MessageTransport>,
    state: Mutex<MessagingState>,
}

impl MessagingClient {
    pub fn new(transport: Arc<dyn MessageTransport>) -> Self {
        Self {
            transport,
            state: Mutex::new(MessagingState::default()),
        }
    }

    /// Connect to `node_id`, flush queued actions, and return the stream of
    /// actions received from peers.
    pub async fn connect_to_node(&self, node_id: &str) -> BoxStream<'static, MessagingAction> {
        // Subscribe before flushing so replies to flushed actions aren't missed.
        let incoming = self.transport.incoming_messages();

        let mut state = self.state.lock().await;
        state.connected_node = Some(node_id.to_string());
        tracing::info!(node_id, queued = state.queue.len(), "Connected to node");
        if let Err(e) = self.flush(&mut state, node_id).await {
            tracing::info!(node_id, queued = state.queue.len(), error = %e, "Queue flush stopped");
        }
        drop(state);

        incoming
            .filter_map(|msg| async move {
                if msg.path.starts_with(MESSAGING_ACTION_PATH) {
                    decode_action(&msg.data)
                } else {
                    None
                }
            })
            .boxed()
    }

    /// Mark the peer as gone. Later sends are queued.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        if let Some(node_id) = state.connected_node.take() {
            tracing::info!(node_id, "Disconnected from node");
        }
    }

    /// Send an action to the connected node, or queue it if there is none.
    ///
    /// Returns [`MessagingError::Disconnected`] when the action was queued.
    pub async fn send_or_queue_action(&self, action: MessagingAction) -> Result<(), MessagingError> {
        let mut state = self.state.lock().await;
        match state.connected_node.clone() {
            Some(node_id) if state.queue.is_empty() => {
                self.deliver(&mut state, &node_id, action).await
            }
            // Earlier actions are still waiting: send behind them.
            Some(node_id) => {
                state.queue.push_back(action);
                self.flush(&mut state, &node_id).await
            }
            None => {
                state.queue.push_back(action);
                Err(MessagingError::Disconnected)
            }
        }
    }

    /// Currently connected node, if any.
    pub async fn connected_node(&self) -> Option<String> {
        self.state.lock().await.connected_node.clone()
    }

    /// Number of actions waiting for a connection.
    pub async fn queued_len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Send queued actions in order while holding the state lock.
    ///
    /// Stops at the first reliable action that cannot be sent and leaves it
    /// at the head of the queue. Gauge updates that fail are dropped.
    async fn flush(&self, state: &mut MessagingState, node_id: &str) -> Result<(), MessagingError> {
        while let Some(action) = state.queue.pop_front() {
            match self.deliver(state, node_id, action).await {
                Ok(()) => {}
                Err(MessagingError::ConnectionInterrupted) => {
                    return Err(MessagingError::ConnectionInterrupted)
                }
                Err(e) if action.delivery_class() == DeliveryClass::Reliable => {
                    tracing::warn!(?action, error = %e, "Keeping queued action for retry");
                    state.queue.push_front(action);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(?action, error = %e, "Dropping queued action");
                }
            }
        }
        Ok(())
    }

    /// Send one action while holding the state lock.
    ///
    /// On an interrupted send the client drops to disconnected, and a
    /// reliable action goes back to the head of the queue so ordering holds.
    async fn deliver(
        &self,
        state: &mut MessagingState,
        node_id: &str,
        action: MessagingAction,
    ) -> Result<(), MessagingError> {
        let payload = encode_action(action).map_err(|e| {
            tracing::error!(?action, error = %e, "Failed to encode action");
            MessagingError::Unknown
        })?;

        match self
            .transport
            .send_message(node_id, MESSAGING_ACTION_PATH, payload)
            .await
        {
            Ok(()) => Ok(()),
            Err(TransportError::PeerDisconnected) => {
                tracing::info!(node_id, ?action, "Peer dropped during send");
                state.connected_node = None;
                if action.delivery_class() == DeliveryClass::Reliable {
                    state.queue.push_front(action);
                }
                Err(MessagingError::ConnectionInterrupted)
            }
            Err(TransportError::Other(e)) => {
                tracing::warn!(node_id, ?action, error = %e, "Send failed");
                Err(MessagingError::Unknown)
            }
        }
    }
}
