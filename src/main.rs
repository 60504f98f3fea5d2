// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Run-Tracker sync daemon
//!
//! Keeps the local run database in sync with the backend: replays pending
//! uploads and deletes left over from earlier sessions, and periodically
//! fetches the user's runs.

use run_tracker::{config::Config, TrackerCore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        api = %config.api_base_url,
        database = %config.database_path,
        "Starting run-tracker sync"
    );

    let fetch_interval = config.fetch_interval;
    let core = TrackerCore::open(config)
        .await
        .expect("Failed to open local state");

    if core.session.get().await.is_none() {
        tracing::warn!("No signed-in user; only the periodic fetch will run");
    }

    // Jobs for rows left behind by an earlier process
    let resumed = core.scheduler.resume_pending().await?;
    tracing::info!(resumed, "Pending syncs resumed");

    core.scheduler.schedule_fetch(fetch_interval);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    core.scheduler.cancel_all_syncs();
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("run_tracker=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
