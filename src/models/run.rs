// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run model and its remote API representations.

use crate::models::location::Location;
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    /// Run ID (None until persisted locally)
    pub id: Option<String>,
    /// Time spent actively tracking
    pub duration: Duration,
    /// When the run finished
    pub date_time_utc: DateTime<Utc>,
    /// Distance in meters
    pub distance_meters: i32,
    /// Start location
    pub location: Location,
    /// Fastest speed between two samples (km/h)
    pub max_speed_kmh: f64,
    /// Total positive elevation change (meters)
    pub total_elevation_meters: i32,
    /// URL of the rendered map snapshot, once uploaded
    pub map_picture_url: Option<String>,
    pub avg_heart_rate: Option<u32>,
    pub max_heart_rate: Option<u32>,
}

impl Run {
    /// Average speed (km/h), derived from distance and duration.
    pub fn avg_speed_kmh(&self) -> f64 {
        let hours = self.duration.as_secs_f64() / 3600.0;
        if hours == 0.0 {
            return 0.0;
        }
        (self.distance_meters as f64 / 1000.0) / hours
    }

    /// Average time per km, derived from distance and duration.
    pub fn avg_pace(&self) -> Duration {
        let km = self.distance_meters as f64 / 1000.0;
        if km <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.duration.as_secs_f64() / km)
    }
}

/// Run as returned by `GET /runs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDto {
    pub id: String,
    /// ISO 8601 timestamp
    pub date_time_utc: String,
    pub duration_millis: u64,
    pub distance_meters: i32,
    pub lat: f64,
    pub long: f64,
    pub avg_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub total_elevation_meters: i32,
    pub map_picture_url: Option<String>,
    pub avg_heart_rate: Option<u32>,
    pub max_heart_rate: Option<u32>,
}

impl TryFrom<RunDto> for Run {
    type Error = chrono::ParseError;

    fn try_from(dto: RunDto) -> Result<Self, Self::Error> {
        let date_time_utc = DateTime::parse_from_rfc3339(&dto.date_time_utc)?.with_timezone(&Utc);
        Ok(Run {
            id: Some(dto.id),
            duration: Duration::from_millis(dto.duration_millis),
            date_time_utc,
            distance_meters: dto.distance_meters,
            location: Location::new(dto.lat, dto.long),
            max_speed_kmh: dto.max_speed_kmh,
            total_elevation_meters: dto.total_elevation_meters,
            map_picture_url: dto.map_picture_url,
            avg_heart_rate: dto.avg_heart_rate,
            max_heart_rate: dto.max_heart_rate,
        })
    }
}

/// Metadata part of the `POST /run` multipart request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunRequest {
    pub id: String,
    pub duration_millis: u64,
    pub distance_meters: i32,
    pub epoch_millis: i64,
    pub lat: f64,
    pub long: f64,
    pub avg_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub total_elevation_meters: i32,
    pub avg_heart_rate: Option<u32>,
    pub max_heart_rate: Option<u32>,
}

impl CreateRunRequest {
    /// Build the request for a run that already has an ID.
    pub fn from_run(run: &Run) -> Option<Self> {
        Some(Self {
            id: run.id.clone()?,
            duration_millis: run.duration.as_millis() as u64,
            distance_meters: run.distance_meters,
            epoch_millis: run.date_time_utc.timestamp_millis(),
            lat: run.location.lat,
            long: run.location.long,
            avg_speed_kmh: run.avg_speed_kmh(),
            max_speed_kmh: run.max_speed_kmh,
            total_elevation_meters: run.total_elevation_meters,
            avg_heart_rate: run.avg_heart_rate,
            max_heart_rate: run.max_heart_rate,
        })
    }
}

impl From<&Run> for RunDto {
    fn from(run: &Run) -> Self {
        RunDto {
            id: run.id.clone().unwrap_or_default(),
            date_time_utc: format_utc_rfc3339(run.date_time_utc),
            duration_millis: run.duration.as_millis() as u64,
            distance_meters: run.distance_meters,
            lat: run.location.lat,
            long: run.location.long,
            avg_speed_kmh: run.avg_speed_kmh(),
            max_speed_kmh: run.max_speed_kmh,
            total_elevation_meters: run.total_elevation_meters,
            map_picture_url: run.map_picture_url.clone(),
            avg_heart_rate: run.avg_heart_rate,
            max_heart_rate: run.max_heart_rate,
        }
    }
}
