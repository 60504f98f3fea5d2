// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Watch-side components.

pub mod exercise;
pub mod tracker;

pub use exercise::{ExerciseOwnership, ExerciseState, ExerciseTracker, HealthSensor};
pub use tracker::{WatchRunningTracker, WatchTrackerState};
