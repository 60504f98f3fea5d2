// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! GPS location source.
//!
//! The platform location provider sits behind [`LocationObserver`]. A lost
//! permission or a disabled provider shows up as a stream that simply never
//! yields, not as an error.

use crate::models::LocationWithAltitude;
use crate::stream_utils::broadcast_stream;
use futures_util::stream::BoxStream;
use std::time::Duration;
use tokio::sync::broadcast;

/// Source of location samples.
pub trait LocationObserver: Send + Sync {
    /// Subscribe to samples at roughly `interval`. Dropping the stream
    /// unregisters the subscription.
    fn observe_location(&self, interval: Duration) -> BoxStream<'static, LocationWithAltitude>;
}

/// Location observer fed by the host platform's provider callback.
///
/// The platform pushes each fix through [`push`](Self::push); every active
/// subscriber receives it. The requested interval is left to the provider.
pub struct ChannelLocationObserver {
    tx: broadcast::Sender<LocationWithAltitude>,
}

impl ChannelLocationObserver {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// Deliver a fix to every subscriber. Returns the number of subscribers.
    pub fn push(&self, location: LocationWithAltitude) -> usize {
        self.tx.send(location).unwrap_or(0)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChannelLocationObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationObserver for ChannelLocationObserver {
    fn observe_location(&self, interval: Duration) -> BoxStream<'static, LocationWithAltitude> {
        tracing::debug!(interval_ms = interval.as_millis() as u64, "Location subscription");
        broadcast_stream(self.tx.subscribe())
    }
}
