// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Run-Tracker: run tracking, phone/watch pairing and offline-first sync
//!
//! This crate provides the core of a running tracker: it fuses GPS samples
//! and watch heart rate into a live run, exchanges telemetry between phone
//! and watch, and keeps locally stored runs in sync with the backend.
//! Platform facilities (GPS, device messaging, health sensors) are injected
//! through traits.

pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod stream_utils;
pub mod time_utils;
pub mod wearable;

use config::Config;
use connectivity::{
    CapabilityTransport, MessageTransport, MessagingClient, NodeDiscovery, PhoneToWatchConnector,
    WatchToPhoneConnector,
};
use db::LocalDb;
use error::CoreError;
use services::{
    AnalyticsService, AuthService, AuthedHttpClient, EncryptedSessionStorage, HttpRunDataSource,
    LocationObserver, OfflineFirstRunRepository, RemoteRunDataSource, RunningTracker,
    SessionStorage, SyncRunScheduler,
};
use std::sync::Arc;
use wearable::{ExerciseTracker, HealthSensor, WatchRunningTracker};

/// Phone platform facilities.
pub struct PhonePlatform {
    pub location_observer: Arc<dyn LocationObserver>,
    pub message_transport: Arc<dyn MessageTransport>,
    pub capability_transport: Arc<dyn CapabilityTransport>,
}

/// Watch platform facilities.
pub struct WatchPlatform {
    pub message_transport: Arc<dyn MessageTransport>,
    pub capability_transport: Arc<dyn CapabilityTransport>,
    pub health_sensor: Arc<dyn HealthSensor>,
}

/// Shared application state, built once at process start.
pub struct TrackerCore {
    pub config: Config,
    pub db: LocalDb,
    pub session: Arc<dyn SessionStorage>,
    pub auth: AuthService,
    pub scheduler: Arc<SyncRunScheduler>,
    pub repository: OfflineFirstRunRepository,
    pub analytics: AnalyticsService,
}

impl TrackerCore {
    /// Open the database and session file named in `config` and wire
    /// everything up.
    pub async fn open(config: Config) -> error::Result<Self> {
        let db = LocalDb::new(&config.database_path)
            .await
            .map_err(error::DataError::from)?;
        let session = EncryptedSessionStorage::open(&config.session_path, &config.session_secret)
            .await
            .map_err(|e| CoreError::Session(e.to_string()))?;
        Ok(Self::new(config, db, Arc::new(session)))
    }

    /// Wire the core over an already opened database and session store.
    pub fn new(config: Config, db: LocalDb, session: Arc<dyn SessionStorage>) -> Self {
        let http = Arc::new(AuthedHttpClient::new(&config, session.clone()));
        let remote: Arc<dyn RemoteRunDataSource> = Arc::new(HttpRunDataSource::new(http.clone()));
        Self::with_remote(config, db, session, http, remote)
    }

    /// Wire the core with a specific remote data source.
    pub fn with_remote(
        config: Config,
        db: LocalDb,
        session: Arc<dyn SessionStorage>,
        http: Arc<AuthedHttpClient>,
        remote: Arc<dyn RemoteRunDataSource>,
    ) -> Self {
        let scheduler = Arc::new(SyncRunScheduler::new(
            db.clone(),
            remote.clone(),
            session.clone(),
            config.sync_backoff,
        ));
        let repository =
            OfflineFirstRunRepository::new(db.clone(), remote, scheduler.clone(), session.clone());
        let analytics = AnalyticsService::new(repository.clone());

        Self {
            auth: AuthService::new(http),
            config,
            db,
            session,
            scheduler,
            repository,
            analytics,
        }
    }

    /// Build the phone's running tracker and its watch connection.
    pub fn running_tracker(&self, platform: PhonePlatform) -> RunningTracker {
        let discovery = NodeDiscovery::new(platform.capability_transport);
        let messaging = Arc::new(MessagingClient::new(platform.message_transport));
        let connector = Arc::new(PhoneToWatchConnector::new(&discovery, messaging));
        RunningTracker::new(platform.location_observer, connector, &self.config)
    }
}

/// Build the watch's running tracker and its phone connection.
pub fn watch_running_tracker(platform: WatchPlatform) -> WatchRunningTracker {
    let discovery = NodeDiscovery::new(platform.capability_transport);
    let messaging = Arc::new(MessagingClient::new(platform.message_transport));
    let connector = WatchToPhoneConnector::new(&discovery, messaging);
    WatchRunningTracker::new(connector, ExerciseTracker::new(platform.health_sensor))
}
