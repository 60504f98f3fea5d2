// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - tracking, sync and backend logic.

pub mod analytics;
pub mod auth;
pub mod calculator;
pub mod location;
pub mod remote;
pub mod repository;
pub mod session;
pub mod sync;
pub mod tracker;

pub use analytics::AnalyticsService;
pub use auth::{AuthService, AuthedHttpClient};
pub use location::{ChannelLocationObserver, LocationObserver};
pub use remote::{HttpRunDataSource, RemoteRunDataSource};
pub use repository::{OfflineFirstRunRepository, SyncSummary};
pub use session::{EncryptedSessionStorage, InMemorySessionStorage, SessionError, SessionStorage};
pub use sync::{SyncRunScheduler, SyncType, WorkResult};
pub use tracker::{RunTrackerState, RunningTracker, TrackerEvent, WatchCommand};
