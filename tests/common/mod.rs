// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fakes for the platform seams and the backend.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::stream::BoxStream;
use run_tracker::connectivity::{
    CapabilityTransport, IncomingMessage, MessageTransport, TransportError,
};
use run_tracker::db::LocalDb;
use run_tracker::error::NetworkError;
use run_tracker::models::messaging::{decode_action, encode_action, MESSAGING_ACTION_PATH};
use run_tracker::models::{AuthInfo, DeviceNode, Location, MessagingAction, Run};
use run_tracker::services::{InMemorySessionStorage, RemoteRunDataSource};
use run_tracker::stream_utils::broadcast_stream;
use run_tracker::wearable::{ExerciseOwnership, HealthSensor};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};

pub const USER_ID: &str = "user-1";

#[allow(dead_code)]
pub fn auth_info() -> AuthInfo {
    AuthInfo {
        access_token: "access".to_string(),
        refresh_token: "refresh".to_string(),
        user_id: USER_ID.to_string(),
    }
}

/// Session store with a signed-in user.
#[allow(dead_code)]
pub fn signed_in_session() -> Arc<InMemorySessionStorage> {
    Arc::new(InMemorySessionStorage::new(Some(auth_info())))
}

#[allow(dead_code)]
pub async fn test_db() -> LocalDb {
    LocalDb::new_in_memory()
        .await
        .expect("Failed to open in-memory database")
}

/// A finished run without an ID.
#[allow(dead_code)]
pub fn test_run(day: u32, distance_meters: i32) -> Run {
    Run {
        id: None,
        duration: Duration::from_secs(1800),
        date_time_utc: Utc.with_ymd_and_hms(2024, 3, day, 7, 30, 0).unwrap(),
        distance_meters,
        location: Location::new(37.42, -122.08),
        max_speed_kmh: 14.0,
        total_elevation_meters: 12,
        map_picture_url: None,
        avg_heart_rate: Some(150),
        max_heart_rate: Some(172),
    }
}

/// Poll `check` until it returns true or `timeout` passes.
#[allow(dead_code)]
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ─── Remote ─────────────────────────────────────────────────────────────────

/// In-memory backend. Fails every call with `fail_with` while it is set.
#[derive(Default)]
pub struct FakeRemote {
    pub runs: Mutex<Vec<Run>>,
    pub fail_with: Mutex<Option<NetworkError>>,
    pub get_calls: AtomicU32,
    pub post_calls: AtomicU32,
    pub delete_calls: AtomicU32,
    pub deleted_ids: Mutex<Vec<String>>,
    post_gate: Mutex<Option<Arc<Semaphore>>>,
}

#[allow(dead_code)]
impl FakeRemote {
    pub fn failing(error: NetworkError) -> Self {
        let remote = Self::default();
        *remote.fail_with.lock().unwrap() = Some(error);
        remote
    }

    pub fn set_failure(&self, error: Option<NetworkError>) {
        *self.fail_with.lock().unwrap() = error;
    }

    /// Make every later `post_run` wait for a permit on the returned gate.
    pub fn hold_posts(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.post_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn get_count(&self) -> u32 {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn post_count(&self) -> u32 {
        self.post_calls.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> u32 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), NetworkError> {
        match *self.fail_with.lock().unwrap() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteRunDataSource for FakeRemote {
    async fn get_runs(&self) -> Result<Vec<Run>, NetworkError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.runs.lock().unwrap().clone())
    }

    async fn post_run(&self, run: &Run, _map_picture: &[u8]) -> Result<Run, NetworkError> {
        self.post_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.post_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("post gate closed").forget();
        }
        self.check()?;
        let stored = Run {
            map_picture_url: Some(format!(
                "https://cdn.example.com/{}.jpg",
                run.id.clone().unwrap_or_default()
            )),
            ..run.clone()
        };
        self.runs.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn delete_run(&self, id: &str) -> Result<(), NetworkError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.deleted_ids.lock().unwrap().push(id.to_string());
        self.runs
            .lock()
            .unwrap()
            .retain(|r| r.id.as_deref() != Some(id));
        Ok(())
    }

    async fn logout(&self) -> Result<(), NetworkError> {
        self.check()
    }
}

// ─── Messaging ──────────────────────────────────────────────────────────────

/// Message transport that records what is sent and lets tests inject
/// received messages.
pub struct FakeMessageTransport {
    pub sent: Mutex<Vec<(String, MessagingAction)>>,
    pub drop_peer: Mutex<bool>,
    incoming: broadcast::Sender<IncomingMessage>,
}

impl Default for FakeMessageTransport {
    fn default() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            drop_peer: Mutex::new(false),
            incoming: broadcast::channel(64).0,
        }
    }
}

#[allow(dead_code)]
impl FakeMessageTransport {
    /// Simulate an action arriving from `node_id`.
    pub fn receive(&self, node_id: &str, action: MessagingAction) {
        let message = IncomingMessage {
            source_node_id: node_id.to_string(),
            path: MESSAGING_ACTION_PATH.to_string(),
            data: encode_action(action).expect("encodable action"),
        };
        let _ = self.incoming.send(message);
    }

    /// Simulate a raw message arriving.
    pub fn receive_raw(&self, message: IncomingMessage) {
        let _ = self.incoming.send(message);
    }

    pub fn sent_actions(&self) -> Vec<MessagingAction> {
        self.sent.lock().unwrap().iter().map(|(_, a)| *a).collect()
    }

    pub fn listener_count(&self) -> usize {
        self.incoming.receiver_count()
    }
}

#[async_trait]
impl MessageTransport for FakeMessageTransport {
    async fn send_message(
        &self,
        node_id: &str,
        _path: &str,
        data: Vec<u8>,
    ) -> Result<(), TransportError> {
        if *self.drop_peer.lock().unwrap() {
            return Err(TransportError::PeerDisconnected);
        }
        let action = decode_action(&data)
            .ok_or_else(|| TransportError::Other("undecodable payload".to_string()))?;
        self.sent.lock().unwrap().push((node_id.to_string(), action));
        Ok(())
    }

    fn incoming_messages(&self) -> BoxStream<'static, IncomingMessage> {
        broadcast_stream(self.incoming.subscribe())
    }
}

// ─── Discovery ──────────────────────────────────────────────────────────────

/// Capability registry whose node set tests can change.
pub struct FakeCapabilityTransport {
    nodes: Mutex<Option<HashSet<DeviceNode>>>,
    changes: broadcast::Sender<HashSet<DeviceNode>>,
    pub queried: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FakeCapabilityTransport {
    /// Registry that starts with `nodes`.
    pub fn with_nodes(nodes: impl IntoIterator<Item = DeviceNode>) -> Self {
        Self {
            nodes: Mutex::new(Some(nodes.into_iter().collect())),
            changes: broadcast::channel(16).0,
            queried: Mutex::new(Vec::new()),
        }
    }

    /// Registry whose initial query fails.
    pub fn failing() -> Self {
        Self {
            nodes: Mutex::new(None),
            changes: broadcast::channel(16).0,
            queried: Mutex::new(Vec::new()),
        }
    }

    /// Replace the node set and notify listeners.
    pub fn set_nodes(&self, nodes: impl IntoIterator<Item = DeviceNode>) {
        let nodes: HashSet<_> = nodes.into_iter().collect();
        *self.nodes.lock().unwrap() = Some(nodes.clone());
        let _ = self.changes.send(nodes);
    }

    pub fn listener_count(&self) -> usize {
        self.changes.receiver_count()
    }
}

#[async_trait]
impl CapabilityTransport for FakeCapabilityTransport {
    async fn get_capability_nodes(&self, capability: &str) -> anyhow::Result<HashSet<DeviceNode>> {
        self.queried.lock().unwrap().push(capability.to_string());
        self.nodes
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("capability service unavailable"))
    }

    fn capability_changes(&self, _capability: &str) -> BoxStream<'static, HashSet<DeviceNode>> {
        broadcast_stream(self.changes.subscribe())
    }
}

#[allow(dead_code)]
pub fn node(id: &str) -> DeviceNode {
    DeviceNode {
        id: id.to_string(),
        display_name: format!("Device {}", id),
        is_nearby: true,
    }
}

// ─── Health sensor ──────────────────────────────────────────────────────────

/// Health sensor that supports heart rate and records exercise calls.
pub struct FakeHealthSensor {
    pub supported: bool,
    pub ownership: Mutex<ExerciseOwnership>,
    pub calls: Mutex<Vec<&'static str>>,
    heart_rate: broadcast::Sender<u32>,
}

impl Default for FakeHealthSensor {
    fn default() -> Self {
        Self {
            supported: true,
            ownership: Mutex::new(ExerciseOwnership::None),
            calls: Mutex::new(Vec::new()),
            heart_rate: broadcast::channel(16).0,
        }
    }
}

#[allow(dead_code)]
impl FakeHealthSensor {
    /// Emit a heart rate sample. Returns the number of listeners.
    pub fn push_heart_rate(&self, bpm: u32) -> usize {
        self.heart_rate.send(bpm).unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str, owner: ExerciseOwnership) {
        self.calls.lock().unwrap().push(call);
        *self.ownership.lock().unwrap() = owner;
    }
}

#[async_trait]
impl HealthSensor for FakeHealthSensor {
    async fn supports_heart_rate(&self) -> anyhow::Result<bool> {
        Ok(self.supported)
    }

    async fn current_exercise(&self) -> anyhow::Result<ExerciseOwnership> {
        Ok(*self.ownership.lock().unwrap())
    }

    async fn prepare(&self) -> anyhow::Result<()> {
        self.record("prepare", ExerciseOwnership::None);
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        self.record("start", ExerciseOwnership::OwnedByThisApp);
        Ok(())
    }

    async fn pause(&self) -> anyhow::Result<()> {
        self.record("pause", ExerciseOwnership::OwnedByThisApp);
        Ok(())
    }

    async fn resume(&self) -> anyhow::Result<()> {
        self.record("resume", ExerciseOwnership::OwnedByThisApp);
        Ok(())
    }

    async fn end(&self) -> anyhow::Result<()> {
        self.record("end", ExerciseOwnership::None);
        Ok(())
    }

    fn heart_rate(&self) -> BoxStream<'static, u32> {
        broadcast_stream(self.heart_rate.subscribe())
    }
}
