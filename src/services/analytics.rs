// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Analytics over the locally stored runs.

use crate::error::LocalError;
use crate::models::RunStats;
use crate::services::repository::OfflineFirstRunRepository;
use futures_util::StreamExt;

pub struct AnalyticsService {
    repository: OfflineFirstRunRepository,
}

impl AnalyticsService {
    pub fn new(repository: OfflineFirstRunRepository) -> Self {
        Self { repository }
    }

    /// Stats over the current snapshot of local runs.
    pub async fn get_analytics(&self) -> Result<RunStats, LocalError> {
        let runs = self
            .repository
            .get_runs()
            .next()
            .await
            .ok_or(LocalError::Unknown)??;

        let stats = RunStats::from_runs(&runs);
        tracing::debug!(
            total_runs = stats.total_runs,
            total_distance_meters = stats.total_distance_meters,
            "Computed run analytics"
        );
        Ok(stats)
    }
}
