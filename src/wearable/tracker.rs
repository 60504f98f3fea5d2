// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Watch-side running tracker.
//!
//! The phone owns the run. The watch mirrors distance and elapsed time from
//! the phone, streams heart rate back while tracking, and lets the user
//! start, pause or finish from the wrist.

use crate::connectivity::WatchToPhoneConnector;
use crate::models::MessagingAction;
use crate::stream_utils::watch_stream;
use crate::wearable::exercise::{ExerciseState, ExerciseTracker};
use futures_util::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// What the watch UI shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchTrackerState {
    /// The phone is ready to track a run
    pub is_trackable: bool,
    pub is_tracking: bool,
    pub has_started_running: bool,
    pub is_connected_phone_nearby: bool,
    pub distance_meters: i32,
    pub elapsed: Duration,
    /// Latest heart rate sample
    pub heart_rate: u32,
    pub can_track_heart_rate: bool,
}

struct Inner {
    connector: WatchToPhoneConnector,
    exercise: ExerciseTracker,
    state: watch::Sender<WatchTrackerState>,
}

pub struct WatchRunningTracker {
    inner: Arc<Inner>,
    cancel: CancellationToken,
}

impl WatchRunningTracker {
    pub fn new(connector: WatchToPhoneConnector, exercise: ExerciseTracker) -> Self {
        let mut connected = connector.connected_device();
        let actions = connector.messaging_actions();
        let heart_rates = exercise.heart_rate();
        let inner = Arc::new(Inner {
            connector,
            exercise,
            state: watch::channel(WatchTrackerState::default()).0,
        });
        let cancel = CancellationToken::new();

        // Phone actions
        let task_inner = inner.clone();
        let token = cancel.child_token();
        tokio::spawn(async move {
            let mut actions = actions;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = actions.next() => match next {
                        Some(action) => task_inner.apply_phone_action(action).await,
                        None => break,
                    },
                }
            }
        });

        // Heart rate to the phone
        let task_inner = inner.clone();
        let token = cancel.child_token();
        tokio::spawn(async move {
            let mut heart_rates = heart_rates;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = heart_rates.next() => match next {
                        Some(bpm) => task_inner.forward_heart_rate(bpm).await,
                        None => break,
                    },
                }
            }
        });

        // Phone proximity and sensor capability
        let task_inner = inner.clone();
        let token = cancel.child_token();
        tokio::spawn(async move {
            let supported = task_inner.exercise.is_heart_rate_tracking_supported().await;
            task_inner
                .state
                .send_modify(|s| s.can_track_heart_rate = supported);
            loop {
                let nearby = connected.borrow_and_update().as_ref().is_some_and(|n| n.is_nearby);
                task_inner
                    .state
                    .send_modify(|s| s.is_connected_phone_nearby = nearby);
                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = connected.changed() => if changed.is_err() { break },
                }
            }
        });

        Self { inner, cancel }
    }

    pub fn current_state(&self) -> WatchTrackerState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WatchTrackerState> {
        self.inner.state.subscribe()
    }

    pub fn states(&self) -> BoxStream<'static, WatchTrackerState> {
        watch_stream(self.inner.state.subscribe())
    }

    /// Start or pause the run, on both devices.
    pub async fn toggle_tracking(&self) {
        let action = if self.inner.state.borrow().is_tracking {
            MessagingAction::Pause
        } else {
            MessagingAction::StartOrResume
        };
        self.inner.send_to_phone(action).await;
        self.inner.apply_control(action).await;
    }

    /// Finish the run, on both devices.
    pub async fn finish(&self) {
        self.inner.send_to_phone(MessagingAction::Finish).await;
        self.inner.apply_control(MessagingAction::Finish).await;
    }
}

impl Drop for WatchRunningTracker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Inner {
    async fn send_to_phone(&self, action: MessagingAction) {
        if let Err(e) = self.connector.send_action_to_phone(action).await {
            tracing::debug!(?action, error = %e, "Action not delivered to phone");
        }
    }

    async fn apply_phone_action(&self, action: MessagingAction) {
        match action {
            MessagingAction::Trackable => self.state.send_modify(|s| s.is_trackable = true),
            MessagingAction::Untrackable => self.state.send_modify(|s| s.is_trackable = false),
            MessagingAction::DistanceUpdate(distance) => {
                self.state.send_modify(|s| s.distance_meters = distance)
            }
            MessagingAction::TimeUpdate(elapsed) => self.state.send_modify(|s| s.elapsed = elapsed),
            MessagingAction::StartOrResume | MessagingAction::Pause | MessagingAction::Finish => {
                self.apply_control(action).await
            }
            MessagingAction::ConnectionRequest | MessagingAction::HeartRateUpdate(_) => {}
        }
    }

    /// Apply a start/pause/finish locally: tracking flag and exercise session.
    async fn apply_control(&self, action: MessagingAction) {
        let result = match action {
            MessagingAction::StartOrResume => {
                self.state.send_modify(|s| {
                    s.is_tracking = true;
                    s.has_started_running = true;
                });
                match self.exercise.state().await {
                    ExerciseState::Paused | ExerciseState::Active => {
                        self.exercise.resume_exercise().await
                    }
                    // A finished session is replaced by a fresh one
                    ExerciseState::Ended => match self.exercise.prepare_exercise().await {
                        Ok(()) => self.exercise.start_exercise().await,
                        Err(e) => Err(e),
                    },
                    ExerciseState::Idle | ExerciseState::Prepared => {
                        self.exercise.start_exercise().await
                    }
                }
            }
            MessagingAction::Pause => {
                self.state.send_modify(|s| s.is_tracking = false);
                self.exercise.pause_exercise().await
            }
            MessagingAction::Finish => {
                self.state.send_modify(|s| {
                    *s = WatchTrackerState {
                        is_trackable: s.is_trackable,
                        is_connected_phone_nearby: s.is_connected_phone_nearby,
                        can_track_heart_rate: s.can_track_heart_rate,
                        ..WatchTrackerState::default()
                    }
                });
                self.exercise.stop_exercise().await
            }
            _ => return,
        };

        if let Err(e) = result {
            tracing::info!(?action, error = %e, "Exercise session not updated");
        }
    }

    async fn forward_heart_rate(&self, bpm: u32) {
        let is_tracking = {
            let mut is_tracking = false;
            self.state.send_modify(|s| {
                s.heart_rate = bpm;
                is_tracking = s.is_tracking;
            });
            is_tracking
        };
        if is_tracking {
            self.send_to_phone(MessagingAction::HeartRateUpdate(bpm)).await;
        }
    }
}
