// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Exercise session management on the watch.
//!
//! Wraps the platform health sensor. Every transition checks that heart
//! rate tracking is supported and that no conflicting exercise is running,
//! then that the session is in a phase the transition can leave from:
//! Idle -> Prepared -> Active <-> Paused -> Ended. Only then is the sensor
//! called.

use crate::error::ExerciseError;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::Mutex;

/// Who owns the exercise currently running on the device, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExerciseOwnership {
    None,
    OwnedByThisApp,
    OwnedByOtherApp,
}

/// Platform health-sensor service.
#[async_trait]
pub trait HealthSensor: Send + Sync {
    /// Whether the device can measure heart rate during a running exercise.
    async fn supports_heart_rate(&self) -> anyhow::Result<bool>;

    async fn current_exercise(&self) -> anyhow::Result<ExerciseOwnership>;

    async fn prepare(&self) -> anyhow::Result<()>;
    async fn start(&self) -> anyhow::Result<()>;
    async fn pause(&self) -> anyhow::Result<()>;
    async fn resume(&self) -> anyhow::Result<()>;
    async fn end(&self) -> anyhow::Result<()>;

    /// Heart rate samples (bpm) while an exercise is active.
    fn heart_rate(&self) -> BoxStream<'static, u32>;
}

/// Lifecycle of the app's exercise session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExerciseState {
    #[default]
    Idle,
    Prepared,
    Active,
    Paused,
    Ended,
}

/// Which existing exercises block a transition.
#[derive(Clone, Copy)]
enum Conflict {
    /// Any running exercise blocks (prepare, start)
    Any,
    /// Only another app's exercise blocks (pause, resume, stop)
    OtherApp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Prepare,
    Start,
    Pause,
    Resume,
    Stop,
}

impl Transition {
    fn target(self) -> ExerciseState {
        match self {
            Transition::Prepare => ExerciseState::Prepared,
            Transition::Start | Transition::Resume => ExerciseState::Active,
            Transition::Pause => ExerciseState::Paused,
            Transition::Stop => ExerciseState::Ended,
        }
    }

    fn conflict(self) -> Conflict {
        match self {
            Transition::Prepare | Transition::Start => Conflict::Any,
            _ => Conflict::OtherApp,
        }
    }

    /// A failed native call on a running session means it is already over.
    fn ends_on_failure(self) -> bool {
        matches!(self, Transition::Pause | Transition::Resume | Transition::Stop)
    }

    /// Whether the session may take this transition from `from`.
    /// `Ok(false)` means it is already in the target phase.
    fn check_phase(self, from: ExerciseState) -> Result<bool, ExerciseError> {
        use ExerciseState::{Active, Ended, Idle, Paused, Prepared};

        match (self, from) {
            (Transition::Prepare, Idle | Prepared | Ended) => Ok(true),
            (Transition::Prepare | Transition::Start, Active | Paused) => {
                Err(ExerciseError::OngoingOwnExercise)
            }
            (Transition::Start, Idle | Prepared) => Ok(true),
            (Transition::Pause, Active) | (Transition::Resume, Paused) => Ok(true),
            (Transition::Pause, Paused) | (Transition::Resume, Active) => Ok(false),
            (Transition::Stop, Prepared | Active | Paused) => Ok(true),
            (Transition::Pause | Transition::Resume, Idle | Prepared) | (Transition::Stop, Idle) => {
                Err(ExerciseError::NoActiveExercise)
            }
            (_, Ended) => Err(ExerciseError::ExerciseAlreadyEnded),
        }
    }
}

pub struct ExerciseTracker {
    sensor: std::sync::Arc<dyn HealthSensor>,
    state: Mutex<ExerciseState>,
}

impl ExerciseTracker {
    pub fn new(sensor: std::sync::Arc<dyn HealthSensor>) -> Self {
        Self {
            sensor,
            state: Mutex::new(ExerciseState::Idle),
        }
    }

    pub async fn state(&self) -> ExerciseState {
        *self.state.lock().await
    }

    /// Heart rate samples from the sensor.
    pub fn heart_rate(&self) -> BoxStream<'static, u32> {
        self.sensor.heart_rate()
    }

    /// A failed capability query counts as unsupported.
    pub async fn is_heart_rate_tracking_supported(&self) -> bool {
        match self.sensor.supports_heart_rate().await {
            Ok(supported) => supported,
            Err(e) => {
                tracing::warn!(error = %e, "Capability query failed");
                false
            }
        }
    }

    pub async fn prepare_exercise(&self) -> Result<(), ExerciseError> {
        self.transition(Transition::Prepare, |s| s.prepare()).await
    }

    pub async fn start_exercise(&self) -> Result<(), ExerciseError> {
        self.transition(Transition::Start, |s| s.start()).await
    }

    pub async fn resume_exercise(&self) -> Result<(), ExerciseError> {
        self.transition(Transition::Resume, |s| s.resume()).await
    }

    pub async fn pause_exercise(&self) -> Result<(), ExerciseError> {
        self.transition(Transition::Pause, |s| s.pause()).await
    }

    pub async fn stop_exercise(&self) -> Result<(), ExerciseError> {
        self.transition(Transition::Stop, |s| s.end()).await
    }

    /// Check preconditions and the phase order, run the sensor call and
    /// record the new state.
    async fn transition<F>(&self, transition: Transition, call: F) -> Result<(), ExerciseError>
    where
        F: for<'a> FnOnce(
            &'a dyn HealthSensor,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + 'a>,
        >,
    {
        let mut state = self.state.lock().await;

        if !self.is_heart_rate_tracking_supported().await {
            return Err(ExerciseError::TrackingNotSupported);
        }

        let ownership = self.sensor.current_exercise().await.map_err(|e| {
            tracing::warn!(error = %e, "Exercise info query failed");
            ExerciseError::Unknown
        })?;
        match (transition.conflict(), ownership) {
            (_, ExerciseOwnership::OwnedByOtherApp) => {
                return Err(ExerciseError::OngoingOtherExercise)
            }
            (Conflict::Any, ExerciseOwnership::OwnedByThisApp) => {
                return Err(ExerciseError::OngoingOwnExercise)
            }
            _ => {}
        }

        // Our exercise survived a restart of the tracker
        if *state == ExerciseState::Idle && ownership == ExerciseOwnership::OwnedByThisApp {
            tracing::info!("Adopting running exercise");
            *state = ExerciseState::Active;
        }

        let from = *state;
        let target = transition.target();
        if !transition.check_phase(from).map_err(|e| {
            tracing::info!(?transition, ?from, error = %e, "Exercise transition rejected");
            e
        })? {
            return Ok(());
        }

        if let Err(e) = call(self.sensor.as_ref()).await {
            if transition.ends_on_failure() {
                tracing::info!(?transition, error = %e, "Exercise already ended");
                *state = ExerciseState::Ended;
                return Err(ExerciseError::ExerciseAlreadyEnded);
            }
            tracing::warn!(?transition, error = %e, "Exercise transition failed");
            return Err(ExerciseError::Unknown);
        }

        tracing::info!(?from, to = ?target, "Exercise state changed");
        *state = target;
        Ok(())
    }
}
