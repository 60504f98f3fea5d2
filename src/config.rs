// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Loaded once at startup; a `.env` file is honoured for local development.

use std::env;
use std::time::Duration;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Backend ---
    /// Base URL of the run backend (no trailing slash)
    pub api_base_url: String,
    /// API key sent as `x-api-key` on every request
    pub api_key: String,

    // --- Local state ---
    /// SQLite database file
    pub database_path: String,
    /// Encrypted session file
    pub session_path: String,
    /// Key material for session encryption
    pub session_secret: Vec<u8>,

    // --- Tracking & sync ---
    /// Interval between location samples while observing
    pub location_interval: Duration,
    /// Interval between elapsed-time ticks while tracking
    pub timer_tick: Duration,
    /// Interval for the periodic fetch job
    pub fetch_interval: Duration,
    /// Initial backoff for sync retries (doubled on each attempt)
    pub sync_backoff: Duration,
}

/// Default location sampling interval.
pub const DEFAULT_LOCATION_INTERVAL_MS: u64 = 1000;

/// Default periodic fetch interval.
pub const DEFAULT_FETCH_INTERVAL_MINUTES: u64 = 30;

/// Default initial retry backoff for sync workers.
pub const DEFAULT_SYNC_BACKOFF_MS: u64 = 2000;

/// Elapsed-time ticker period while a run is being tracked.
pub const TIMER_TICK_MS: u64 = 200;

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".to_string(),
            api_key: "test_api_key".to_string(),
            database_path: ":memory:".to_string(),
            session_path: "session.enc".to_string(),
            session_secret: b"test_session_secret_32_bytes!!!!".to_vec(),
            location_interval: Duration::from_millis(DEFAULT_LOCATION_INTERVAL_MS),
            timer_tick: Duration::from_millis(TIMER_TICK_MS),
            fetch_interval: Duration::from_secs(DEFAULT_FETCH_INTERVAL_MINUTES * 60),
            sync_backoff: Duration::from_millis(DEFAULT_SYNC_BACKOFF_MS),
        }
    }
}

impl Config {
    /// Config for tests, with short intervals so retries don't stall.
    pub fn test_default() -> Self {
        Self {
            location_interval: Duration::from_millis(10),
            timer_tick: Duration::from_millis(10),
            sync_backoff: Duration::from_millis(1),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            api_base_url: env::var("RUN_TRACKER_API_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .map_err(|_| ConfigError::Missing("RUN_TRACKER_API_URL"))?,
            api_key: env::var("RUN_TRACKER_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("RUN_TRACKER_API_KEY"))?,
            database_path: env::var("RUN_TRACKER_DATABASE_PATH")
                .unwrap_or_else(|_| "run_tracker.db".to_string()),
            session_path: env::var("RUN_TRACKER_SESSION_PATH")
                .unwrap_or_else(|_| "session.enc".to_string()),
            session_secret: env::var("RUN_TRACKER_SESSION_SECRET")
                .map_err(|_| ConfigError::Missing("RUN_TRACKER_SESSION_SECRET"))?
                .into_bytes(),
            location_interval: Duration::from_millis(parse_or(
                "RUN_TRACKER_LOCATION_INTERVAL_MS",
                DEFAULT_LOCATION_INTERVAL_MS,
            )?),
            timer_tick: Duration::from_millis(TIMER_TICK_MS),
            fetch_interval: fetch_interval_from_minutes(parse_or(
                "RUN_TRACKER_FETCH_INTERVAL_MINUTES",
                DEFAULT_FETCH_INTERVAL_MINUTES,
            )?),
            sync_backoff: Duration::from_millis(parse_or(
                "RUN_TRACKER_SYNC_BACKOFF_MS",
                DEFAULT_SYNC_BACKOFF_MS,
            )?),
        })
    }
}

/// Fetch interval of at least one minute.
fn fetch_interval_from_minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.max(1).saturating_mul(60))
}

fn parse_or(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(v) => v.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
