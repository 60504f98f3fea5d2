// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the tracking and sync core.

pub mod auth;
pub mod location;
pub mod messaging;
pub mod run;
pub mod stats;
pub mod sync;

pub use auth::AuthInfo;
pub use location::{Location, LocationTimestamp, LocationWithAltitude, RunData, Segments};
pub use messaging::{DeliveryClass, DeviceNode, DeviceType, MessagingAction};
pub use run::{CreateRunRequest, Run, RunDto};
pub use stats::RunStats;
pub use sync::{DeletedRunSync, RunPendingSync};
