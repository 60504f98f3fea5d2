// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Location samples and the live run-data aggregate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub long: f64,
}

impl Location {
    pub fn new(lat: f64, long: f64) -> Self {
        Self { lat, long }
    }
}

/// A position with altitude in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationWithAltitude {
    pub location: Location,
    pub altitude: f64,
}

impl LocationWithAltitude {
    pub fn new(lat: f64, long: f64, altitude: f64) -> Self {
        Self {
            location: Location::new(lat, long),
            altitude,
        }
    }
}

/// A sample paired with its elapsed offset from run start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationTimestamp {
    pub location: LocationWithAltitude,
    pub duration_timestamp: Duration,
}

/// Ordered samples, split into segments at every pause.
pub type Segments = Vec<Vec<LocationTimestamp>>;

/// Live aggregate of the run in progress.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunData {
    /// Distance covered so far (meters, rounded)
    pub distance_meters: i32,
    /// Average time per km so far; zero until any distance is covered
    pub pace: Duration,
    /// Recorded samples, one inner list per tracking segment
    pub locations: Segments,
}

impl RunData {
    /// First recorded sample of the run, if any.
    pub fn start_location(&self) -> Option<LocationWithAltitude> {
        self.locations
            .iter()
            .find_map(|segment| segment.first())
            .map(|t| t.location)
    }
}
