// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Offline-first run repository.
//!
//! Local storage is the source of truth for reads. Writes go to local
//! storage first and then to the backend. A remote failure never fails the
//! caller; it becomes a durable pending sync instead.

use crate::db::LocalDb;
use crate::error::{DataResult, LocalError};
use crate::models::Run;
use crate::services::remote::RemoteRunDataSource;
use crate::services::session::SessionStorage;
use crate::services::sync::{
    delete_pending_run, fetch_and_store, upload_pending_run, SyncRunScheduler, SyncType,
};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Maximum concurrent remote calls when replaying pending syncs.
const MAX_CONCURRENT_SYNCS: usize = 4;

/// Result of replaying pending syncs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub succeeded: u32,
    pub failed: u32,
}

#[derive(Clone)]
pub struct OfflineFirstRunRepository {
    local: LocalDb,
    remote: Arc<dyn RemoteRunDataSource>,
    scheduler: Arc<SyncRunScheduler>,
    session: Arc<dyn SessionStorage>,
}

impl OfflineFirstRunRepository {
    pub fn new(
        local: LocalDb,
        remote: Arc<dyn RemoteRunDataSource>,
        scheduler: Arc<SyncRunScheduler>,
        session: Arc<dyn SessionStorage>,
    ) -> Self {
        Self {
            local,
            remote,
            scheduler,
            session,
        }
    }

    /// All local runs, newest first, re-emitted after every local change.
    pub fn get_runs(&self) -> BoxStream<'static, Result<Vec<Run>, LocalError>> {
        self.local.observe_runs()
    }

    /// Pull the user's runs from the backend into local storage.
    pub async fn fetch_runs(&self) -> DataResult<()> {
        fetch_and_store(&self.local, self.remote.as_ref()).await
    }

    /// Save a finished run. Returns its ID.
    ///
    /// The run is written locally (getting an ID if it has none) before the
    /// upload is tried. If the upload fails the run is queued for a
    /// background upload and the call still succeeds.
    pub async fn upsert_run(&self, run: Run, map_picture: Vec<u8>) -> DataResult<String> {
        let run_id = self.local.upsert_run(&run).await?;
        let run = Run {
            id: Some(run_id.clone()),
            ..run
        };

        match self.remote.post_run(&run, &map_picture).await {
            Ok(stored) => {
                self.local.upsert_run(&stored).await?;
            }
            Err(e) => {
                tracing::info!(run_id = %run_id, error = %e, "Upload failed, queueing for sync");
                self.scheduler
                    .schedule_sync(SyncType::CreateRun { run, map_picture })
                    .await?;
            }
        }
        Ok(run_id)
    }

    /// Delete a run locally at once, and remotely in the background.
    ///
    /// A run whose upload is still pending never reached the server, so its
    /// pending row is dropped and its upload job cancelled. An upload that
    /// completes anyway removes its remote copy.
    pub async fn delete_run(&self, id: &str) -> DataResult<()> {
        self.local.delete_run(id).await?;

        if self.local.get_run_pending_sync(id).await?.is_some() {
            self.local.delete_run_pending_sync(id).await?;
            self.scheduler.cancel_sync(&SyncRunScheduler::create_run_tag(id));
            tracing::info!(run_id = id, "Deleted run that was never uploaded");
            return Ok(());
        }

        let remote = self.remote.clone();
        let scheduler = self.scheduler.clone();
        let run_id = id.to_string();
        tokio::spawn(async move {
            if let Err(e) = remote.delete_run(&run_id).await {
                tracing::info!(run_id = %run_id, error = %e, "Remote delete failed, queueing for sync");
                if let Err(e) = scheduler
                    .schedule_sync(SyncType::DeleteRun {
                        run_id: run_id.clone(),
                    })
                    .await
                {
                    tracing::error!(run_id = %run_id, error = %e, "Failed to queue remote delete");
                }
            }
        });
        Ok(())
    }

    /// Replay every pending create and delete of the signed-in user now.
    pub async fn sync_pending_runs(&self) -> DataResult<SyncSummary> {
        let Some(user_id) = self.session.get().await.map(|s| s.user_id) else {
            return Ok(SyncSummary::default());
        };

        let creates = self.local.get_all_run_pending_sync(&user_id).await?;
        let deletes = self.local.get_all_deleted_run_sync(&user_id).await?;

        let jobs = creates
            .into_iter()
            .map(|p| (true, p.run_id))
            .chain(deletes.into_iter().map(|p| (false, p.run_id)));

        let succeeded = AtomicU32::new(0);
        let failed = AtomicU32::new(0);

        stream::iter(jobs)
            .for_each_concurrent(MAX_CONCURRENT_SYNCS, |(is_create, run_id)| {
                let succeeded = &succeeded;
                let failed = &failed;
                async move {
                    let result = if is_create {
                        upload_pending_run(&self.local, self.remote.as_ref(), &run_id).await
                    } else {
                        delete_pending_run(&self.local, self.remote.as_ref(), &run_id).await
                    };
                    match result {
                        Ok(()) => {
                            succeeded.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            tracing::warn!(run_id = %run_id, error = %e, "Pending sync failed");
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
            .await;

        let summary = SyncSummary {
            succeeded: succeeded.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        };
        tracing::info!(
            user_id = %user_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Replayed pending syncs"
        );
        Ok(summary)
    }

    /// Remove every local run.
    pub async fn delete_all_runs(&self) -> DataResult<()> {
        self.local.delete_all_runs().await?;
        Ok(())
    }

    /// Sign out: end the server session (best-effort), clear the local
    /// session, drop all local runs and cancel all sync jobs.
    pub async fn logout(&self) -> DataResult<()> {
        if let Err(e) = self.remote.logout().await {
            tracing::info!(error = %e, "Remote logout failed, continuing");
        }

        if let Err(e) = self.session.set(None).await {
            tracing::error!(error = %e, "Failed to clear session");
            return Err(LocalError::Unknown.into());
        }
        self.local.delete_all_runs().await?;
        self.scheduler.cancel_all_syncs();
        tracing::info!("Signed out");
        Ok(())
    }
}
