// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Phone-side running tracker.
//!
//! Three inputs feed one state value: GPS samples, heart rate from the
//! watch, and an elapsed-time ticker. Every input becomes a
//! [`TrackerEvent`] on one channel. A single actor task folds events into
//! [`RunTrackerState`] with [`reduce`] and publishes the result on a watch
//! channel. Finishing a run goes through the same channel, so the finished
//! run includes every event sent before it.
//!
//! Segment rules:
//! - the first recorded sample seeds a segment
//! - later samples append to the last segment
//! - pausing (tracking true -> false) opens a new, empty segment

use crate::config::Config;
use crate::connectivity::PhoneToWatchConnector;
use crate::models::{LocationTimestamp, LocationWithAltitude, MessagingAction, Run, RunData};
use crate::services::calculator;
use crate::services::location::LocationObserver;
use crate::stream_utils::{broadcast_stream, watch_stream};
use crate::time_utils::{format_elapsed, format_pace};
use chrono::{DateTime, Utc};
use futures_util::stream::{BoxStream, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Snapshot of the run in progress.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunTrackerState {
    pub is_observing_location: bool,
    /// Latest sample; `None` when nothing recent has arrived
    pub current_location: Option<LocationWithAltitude>,
    pub is_tracking: bool,
    /// Time spent tracking
    pub elapsed: Duration,
    pub run_data: RunData,
    /// Heart rates received from the watch while tracking, in order
    pub heart_rates: Vec<u32>,
    /// Unrounded distance; `run_data.distance_meters` is derived from it
    exact_distance_meters: f64,
}

/// Input to the tracker state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackerEvent {
    ObservingChanged(bool),
    TrackingChanged(bool),
    LocationSampled(LocationWithAltitude),
    TimeElapsed(Duration),
    HeartRateReceived(u32),
    /// Clear the run, keeping the observing flag and current location.
    Reset,
}

/// Message to the tracker actor.
#[derive(Debug)]
enum TrackerMessage {
    Event(TrackerEvent),
    /// Build the run from everything reduced so far, then reset.
    Finish {
        finished_at: DateTime<Utc>,
        reply: oneshot::Sender<Option<Run>>,
    },
}

impl From<TrackerEvent> for TrackerMessage {
    fn from(event: TrackerEvent) -> Self {
        TrackerMessage::Event(event)
    }
}

/// Run control requested from the watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchCommand {
    StartOrResume,
    Pause,
    Finish,
}

/// Fold one event into the state.
pub fn reduce(mut state: RunTrackerState, event: TrackerEvent) -> RunTrackerState {
    match event {
        TrackerEvent::ObservingChanged(observing) => {
            state.is_observing_location = observing;
            if !observing {
                state.current_location = None;
            }
        }
        TrackerEvent::TrackingChanged(tracking) => {
            if state.is_tracking && !tracking {
                state.run_data.locations.push(Vec::new());
            }
            state.is_tracking = tracking;
        }
        TrackerEvent::LocationSampled(location) => {
            state.current_location = Some(location);
            if state.is_tracking {
                append_sample(&mut state, location);
            }
        }
        TrackerEvent::TimeElapsed(delta) => {
            if state.is_tracking {
                state.elapsed += delta;
                state.run_data.pace = pace(state.elapsed, state.exact_distance_meters);
            }
        }
        TrackerEvent::HeartRateReceived(bpm) => {
            if state.is_tracking {
                state.heart_rates.push(bpm);
            }
        }
        TrackerEvent::Reset => {
            state = RunTrackerState {
                is_observing_location: state.is_observing_location,
                current_location: state.current_location,
                ..RunTrackerState::default()
            };
        }
    }
    state
}

fn append_sample(state: &mut RunTrackerState, location: LocationWithAltitude) {
    let sample = LocationTimestamp {
        location,
        duration_timestamp: state.elapsed,
    };

    match state.run_data.locations.last_mut() {
        Some(segment) => {
            if let Some(prev) = segment.last() {
                state.exact_distance_meters +=
                    calculator::distance_meters(&prev.location.location, &location.location);
            }
            segment.push(sample);
        }
        None => state.run_data.locations.push(vec![sample]),
    }

    state.run_data.distance_meters = state.exact_distance_meters.round() as i32;
    state.run_data.pace = pace(state.elapsed, state.exact_distance_meters);
}

/// Time per km; zero until any distance is covered.
fn pace(elapsed: Duration, distance_meters: f64) -> Duration {
    let km = distance_meters / 1000.0;
    if km <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(elapsed.as_secs_f64() / km)
}

/// Build the finished run from a tracker snapshot. `None` if no sample was
/// ever recorded.
pub fn run_from_state(state: &RunTrackerState, finished_at: DateTime<Utc>) -> Option<Run> {
    let start = state.run_data.start_location()?;
    let segments = &state.run_data.locations;

    let (avg_heart_rate, max_heart_rate) = if state.heart_rates.is_empty() {
        (None, None)
    } else {
        let sum: u64 = state.heart_rates.iter().map(|&bpm| bpm as u64).sum();
        let avg = (sum as f64 / state.heart_rates.len() as f64).round() as u32;
        (Some(avg), state.heart_rates.iter().copied().max())
    };

    Some(Run {
        id: None,
        duration: state.elapsed,
        date_time_utc: finished_at,
        distance_meters: state.run_data.distance_meters,
        location: start.location,
        max_speed_kmh: calculator::max_speed_kmh(segments),
        total_elevation_meters: calculator::total_elevation_meters(segments).round() as i32,
        map_picture_url: None,
        avg_heart_rate,
        max_heart_rate,
    })
}

/// Live run tracker for the phone.
pub struct RunningTracker {
    events: mpsc::UnboundedSender<TrackerMessage>,
    state: watch::Receiver<RunTrackerState>,
    watch_commands: broadcast::Sender<WatchCommand>,
    location_observer: Arc<dyn LocationObserver>,
    connector: Arc<PhoneToWatchConnector>,
    location_interval: Duration,
    timer_tick: Duration,
    cancel: CancellationToken,
    observing: Mutex<Option<CancellationToken>>,
    ticking: Mutex<Option<CancellationToken>>,
}

impl RunningTracker {
    pub fn new(
        location_observer: Arc<dyn LocationObserver>,
        connector: Arc<PhoneToWatchConnector>,
        config: &Config,
    ) -> Self {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(RunTrackerState::default());
        let (watch_commands, _) = broadcast::channel(16);
        let cancel = CancellationToken::new();

        tokio::spawn(run_actor(events_rx, state_tx));
        tokio::spawn(send_telemetry(
            state.clone(),
            connector.clone(),
            cancel.child_token(),
        ));
        tokio::spawn(receive_watch_actions(
            connector.messaging_actions(),
            events.clone(),
            watch_commands.clone(),
            cancel.child_token(),
        ));

        Self {
            events,
            state,
            watch_commands,
            location_observer,
            connector,
            location_interval: config.location_interval,
            timer_tick: config.timer_tick,
            cancel,
            observing: Mutex::new(None),
            ticking: Mutex::new(None),
        }
    }

    /// Current snapshot.
    pub fn current_state(&self) -> RunTrackerState {
        self.state.borrow().clone()
    }

    /// Receiver for state changes.
    pub fn subscribe(&self) -> watch::Receiver<RunTrackerState> {
        self.state.clone()
    }

    /// Current state, then every change.
    pub fn states(&self) -> BoxStream<'static, RunTrackerState> {
        watch_stream(self.state.clone())
    }

    /// Start/pause/finish requests coming from the watch.
    pub fn watch_commands(&self) -> BoxStream<'static, WatchCommand> {
        broadcast_stream(self.watch_commands.subscribe())
    }

    /// Subscribe to location samples. Tells the watch the phone is trackable.
    pub async fn start_observing_location(&self) {
        let token = {
            let mut observing = lock(&self.observing);
            if observing.is_some() {
                return;
            }
            let token = self.cancel.child_token();
            *observing = Some(token.clone());
            token
        };

        self.send_event(TrackerEvent::ObservingChanged(true));
        let mut samples = self
            .location_observer
            .observe_location(self.location_interval);
        let events = self.events.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = samples.next() => match next {
                        Some(location) => {
                            if events.send(TrackerEvent::LocationSampled(location).into()).is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        if let Err(e) = self.connector.set_is_trackable(true).await {
            tracing::debug!(error = %e, "Trackable state not delivered");
        }
        tracing::info!("Started observing location");
    }

    /// Drop the location subscription. Tells the watch the phone is no
    /// longer trackable.
    pub async fn stop_observing_location(&self) {
        let Some(token) = lock(&self.observing).take() else {
            return;
        };
        token.cancel();
        self.send_event(TrackerEvent::ObservingChanged(false));

        if let Err(e) = self.connector.set_is_trackable(false).await {
            tracing::debug!(error = %e, "Untrackable state not delivered");
        }
        tracing::info!("Stopped observing location");
    }

    /// Start or pause recording of samples, elapsed time and heart rate.
    pub fn set_is_tracking(&self, tracking: bool) {
        let mut ticking = lock(&self.ticking);
        if tracking == ticking.is_some() {
            return;
        }

        self.send_event(TrackerEvent::TrackingChanged(tracking));
        if !tracking {
            if let Some(token) = ticking.take() {
                token.cancel();
            }
            tracing::info!("Tracking paused");
            return;
        }

        let token = self.cancel.child_token();
        *ticking = Some(token.clone());
        tokio::spawn(tick_elapsed(self.timer_tick, self.events.clone(), token));
        tracing::info!("Tracking started");
    }

    /// Finish the run: build the [`Run`], reset tracking state and stop
    /// observing location.
    ///
    /// Returns `None` if no location was ever recorded.
    pub async fn finish_run(&self, finished_at: DateTime<Utc>) -> Option<Run> {
        let (reply, run) = oneshot::channel();
        if self
            .events
            .send(TrackerMessage::Finish { finished_at, reply })
            .is_err()
        {
            tracing::error!("Tracker actor is gone");
        }
        let run = run.await.unwrap_or_else(|_| {
            tracing::error!("Tracker actor dropped the finished run");
            None
        });

        if let Some(token) = lock(&self.ticking).take() {
            token.cancel();
        }
        self.stop_observing_location().await;

        if let Some(run) = &run {
            tracing::info!(
                distance_meters = run.distance_meters,
                elapsed = %format_elapsed(run.duration),
                pace = %format_pace(run.avg_pace()),
                "Run finished"
            );
        }
        run
    }

    fn send_event(&self, event: TrackerEvent) {
        if self.events.send(event.into()).is_err() {
            tracing::error!(?event, "Tracker actor is gone");
        }
    }
}

impl Drop for RunningTracker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fold events into the published state until every sender is gone.
async fn run_actor(
    mut messages: mpsc::UnboundedReceiver<TrackerMessage>,
    state: watch::Sender<RunTrackerState>,
) {
    while let Some(message) = messages.recv().await {
        match message {
            TrackerMessage::Event(event) => {
                state.send_modify(|s| *s = reduce(std::mem::take(s), event));
            }
            TrackerMessage::Finish { finished_at, reply } => {
                let run = run_from_state(&state.borrow(), finished_at);
                state.send_modify(|s| {
                    let stopped = reduce(std::mem::take(s), TrackerEvent::TrackingChanged(false));
                    *s = reduce(stopped, TrackerEvent::Reset);
                });
                // The caller may have given up waiting
                let _ = reply.send(run);
            }
        }
    }
    tracing::debug!("Tracker actor stopped");
}

async fn tick_elapsed(
    period: Duration,
    events: mpsc::UnboundedSender<TrackerMessage>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately
    interval.tick().await;
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            now = interval.tick() => {
                let delta = now.saturating_duration_since(last);
                last = now;
                if events.send(TrackerEvent::TimeElapsed(delta).into()).is_err() {
                    break;
                }
            }
        }
    }
}

/// Mirror elapsed time and distance to the watch while tracking.
async fn send_telemetry(
    mut state: watch::Receiver<RunTrackerState>,
    connector: Arc<PhoneToWatchConnector>,
    cancel: CancellationToken,
) {
    let mut last_elapsed = Duration::ZERO;
    let mut last_distance = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = state.changed() => if changed.is_err() { break },
        }

        let (is_tracking, elapsed, distance) = {
            let s = state.borrow_and_update();
            (s.is_tracking, s.elapsed, s.run_data.distance_meters)
        };

        let mut updates = Vec::new();
        if is_tracking && elapsed != last_elapsed {
            updates.push(MessagingAction::TimeUpdate(elapsed));
        }
        if distance != last_distance {
            updates.push(MessagingAction::DistanceUpdate(distance));
        }
        last_elapsed = elapsed;
        last_distance = distance;

        for action in updates {
            if let Err(e) = connector.send_action_to_watch(action).await {
                tracing::trace!(?action, error = %e, "Telemetry not delivered");
            }
        }
    }
}

/// Turn actions from the watch into heart-rate events and watch commands.
async fn receive_watch_actions(
    mut actions: BoxStream<'static, MessagingAction>,
    events: mpsc::UnboundedSender<TrackerMessage>,
    commands: broadcast::Sender<WatchCommand>,
    cancel: CancellationToken,
) {
    loop {
        let action = tokio::select! {
            _ = cancel.cancelled() => break,
            next = actions.next() => match next {
                Some(action) => action,
                None => break,
            },
        };

        let command = match action {
            MessagingAction::HeartRateUpdate(bpm) => {
                let _ = events.send(TrackerEvent::HeartRateReceived(bpm).into());
                continue;
            }
            MessagingAction::StartOrResume => WatchCommand::StartOrResume,
            MessagingAction::Pause => WatchCommand::Pause,
            MessagingAction::Finish => WatchCommand::Finish,
            _ => continue,
        };
        tracing::debug!(?command, "Command from watch");
        // No subscribers is fine
        let _ = commands.send(command);
    }
}
