// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Background sync of locally created and deleted runs.
//!
//! Pending work is written to SQLite before any job is spawned, so it
//! survives process death. [`SyncRunScheduler::resume_pending`] re-spawns
//! jobs for whatever rows are left at startup.
//!
//! Each job makes at most [`MAX_ATTEMPTS`] attempts with exponential backoff
//! between them. A pending row is deleted only after the remote call
//! succeeds, so a crash in between replays the call.

use crate::db::LocalDb;
use crate::error::{DataError, DataResult, LocalError, RetryClass};
use crate::models::{DeletedRunSync, Run, RunPendingSync};
use crate::services::remote::RemoteRunDataSource;
use crate::services::session::SessionStorage;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Attempts per job before giving up.
pub const MAX_ATTEMPTS: u32 = 5;

const FETCH_RUNS_TAG: &str = "fetch_runs";

/// Shortest interval between periodic fetches.
pub const MIN_FETCH_INTERVAL: Duration = Duration::from_secs(60);

/// One-shot sync requests.
#[derive(Debug, Clone)]
pub enum SyncType {
    CreateRun { run: Run, map_picture: Vec<u8> },
    DeleteRun { run_id: String },
}

impl SyncType {
    fn kind(&self) -> &'static str {
        match self {
            SyncType::CreateRun { .. } => "create_run",
            SyncType::DeleteRun { .. } => "delete_run",
        }
    }
}

/// Outcome of one worker attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkResult {
    Success,
    Retry,
    Failure,
}

/// Decide what a job does after attempt number `attempt` (1-based).
pub fn retry_decision(result: &DataResult<()>, attempt: u32) -> WorkResult {
    match result {
        Ok(()) => WorkResult::Success,
        Err(e) => match e.retry_class() {
            RetryClass::Permanent => WorkResult::Failure,
            RetryClass::Retryable if attempt >= MAX_ATTEMPTS => WorkResult::Failure,
            RetryClass::Retryable => WorkResult::Retry,
        },
    }
}

/// Backoff before attempt `attempt + 1`: `base * 2^(attempt - 1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
}

// ─── Sync operations ─────────────────────────────────────────────────────────

/// Fetch all remote runs into local storage. Local state is untouched on
/// failure.
pub async fn fetch_and_store(local: &LocalDb, remote: &dyn RemoteRunDataSource) -> DataResult<()> {
    let runs = remote.get_runs().await?;
    let count = runs.len();
    local.upsert_runs(&runs).await?;
    tracing::info!(count, "Fetched remote runs");
    Ok(())
}

/// Upload one pending run and drop its row.
///
/// A missing row means the work is already done (or the run was deleted
/// before it was uploaded). If the run is deleted while the upload is in
/// flight, the uploaded copy is deleted from the server instead of being
/// stored locally.
pub async fn upload_pending_run(
    local: &LocalDb,
    remote: &dyn RemoteRunDataSource,
    run_id: &str,
) -> DataResult<()> {
    let Some(pending) = local.get_run_pending_sync(run_id).await? else {
        tracing::debug!(run_id, "No pending upload");
        return Ok(());
    };

    let stored = remote.post_run(&pending.run, &pending.map_picture).await?;
    if local.get_run_pending_sync(run_id).await?.is_none() {
        tracing::info!(run_id, "Run deleted during upload, removing remote copy");
        if let Err(e) = remote.delete_run(run_id).await {
            tracing::info!(run_id, error = %e, "Remote delete failed, queueing for sync");
            local
                .upsert_deleted_run_sync(&DeletedRunSync {
                    run_id: run_id.to_string(),
                    user_id: pending.user_id,
                })
                .await?;
        }
        return Ok(());
    }
    local.upsert_run(&stored).await?;
    local.delete_run_pending_sync(run_id).await?;
    tracing::info!(run_id, "Pending run uploaded");
    Ok(())
}

/// Perform one pending remote delete and drop its row.
pub async fn delete_pending_run(
    local: &LocalDb,
    remote: &dyn RemoteRunDataSource,
    run_id: &str,
) -> DataResult<()> {
    remote.delete_run(run_id).await?;
    local.delete_deleted_run_sync(run_id).await?;
    tracing::info!(run_id, "Pending delete completed");
    Ok(())
}

// ─── Workers ─────────────────────────────────────────────────────────────────

/// A unit of background sync work.
#[async_trait]
pub trait SyncWorker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one attempt (1-based).
    async fn do_work(&self, attempt: u32) -> WorkResult;
}

pub struct FetchRunsWorker {
    local: LocalDb,
    remote: Arc<dyn RemoteRunDataSource>,
}

#[async_trait]
impl SyncWorker for FetchRunsWorker {
    fn name(&self) -> &'static str {
        "fetch_runs"
    }

    async fn do_work(&self, attempt: u32) -> WorkResult {
        let result = fetch_and_store(&self.local, self.remote.as_ref()).await;
        log_attempt(self.name(), None, &result, attempt)
    }
}

pub struct CreateRunWorker {
    local: LocalDb,
    remote: Arc<dyn RemoteRunDataSource>,
    run_id: String,
}

#[async_trait]
impl SyncWorker for CreateRunWorker {
    fn name(&self) -> &'static str {
        "create_run"
    }

    async fn do_work(&self, attempt: u32) -> WorkResult {
        let result = upload_pending_run(&self.local, self.remote.as_ref(), &self.run_id).await;
        log_attempt(self.name(), Some(&self.run_id), &result, attempt)
    }
}

pub struct DeleteRunWorker {
    local: LocalDb,
    remote: Arc<dyn RemoteRunDataSource>,
    run_id: String,
}

#[async_trait]
impl SyncWorker for DeleteRunWorker {
    fn name(&self) -> &'static str {
        "delete_run"
    }

    async fn do_work(&self, attempt: u32) -> WorkResult {
        let result = delete_pending_run(&self.local, self.remote.as_ref(), &self.run_id).await;
        log_attempt(self.name(), Some(&self.run_id), &result, attempt)
    }
}

fn log_attempt(
    worker: &'static str,
    run_id: Option<&str>,
    result: &DataResult<()>,
    attempt: u32,
) -> WorkResult {
    let decision = retry_decision(result, attempt);
    if let Err(e) = result {
        match decision {
            WorkResult::Retry => {
                tracing::info!(worker, run_id, attempt, error = %e, "Sync attempt failed, will retry")
            }
            _ => {
                tracing::warn!(worker, run_id, attempt, error = %e, "Sync job failed permanently")
            }
        }
    }
    decision
}

/// Drive a worker through its attempts until success, permanent failure,
/// or cancellation.
pub async fn run_with_retry(
    worker: &dyn SyncWorker,
    base_backoff: Duration,
    cancel: &CancellationToken,
) -> WorkResult {
    for attempt in 1..=MAX_ATTEMPTS {
        let result = tokio::select! {
            _ = cancel.cancelled() => return WorkResult::Failure,
            r = worker.do_work(attempt) => r,
        };
        if result != WorkResult::Retry {
            return result;
        }

        let delay = backoff_delay(base_backoff, attempt);
        tokio::select! {
            _ = cancel.cancelled() => return WorkResult::Failure,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    // retry_decision never asks for a retry after the last attempt
    WorkResult::Failure
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

struct Job {
    id: u64,
    cancel: CancellationToken,
}

/// Schedules and tracks background sync jobs by tag.
pub struct SyncRunScheduler {
    local: LocalDb,
    remote: Arc<dyn RemoteRunDataSource>,
    session: Arc<dyn SessionStorage>,
    backoff: Duration,
    jobs: Arc<DashMap<String, Job>>,
    next_job_id: AtomicU64,
}

impl SyncRunScheduler {
    pub fn new(
        local: LocalDb,
        remote: Arc<dyn RemoteRunDataSource>,
        session: Arc<dyn SessionStorage>,
        backoff: Duration,
    ) -> Self {
        Self {
            local,
            remote,
            session,
            backoff,
            jobs: Arc::new(DashMap::new()),
            next_job_id: AtomicU64::new(0),
        }
    }

    /// Start the periodic fetch job. Does nothing if it is already scheduled.
    ///
    /// Intervals shorter than [`MIN_FETCH_INTERVAL`] are raised to it.
    pub fn schedule_fetch(&self, interval: Duration) {
        if self.jobs.contains_key(FETCH_RUNS_TAG) {
            tracing::debug!("Periodic fetch already scheduled");
            return;
        }
        let interval = interval.max(MIN_FETCH_INTERVAL);

        let worker = FetchRunsWorker {
            local: self.local.clone(),
            remote: self.remote.clone(),
        };
        let backoff = self.backoff;
        self.spawn_job(FETCH_RUNS_TAG.to_string(), move |cancel| async move {
            loop {
                run_with_retry(&worker, backoff, &cancel).await;
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });
        tracing::info!(interval_secs = interval.as_secs(), "Scheduled periodic fetch");
    }

    /// Persist a pending row for the signed-in user, then spawn its job.
    ///
    /// With nobody signed in nothing is persisted or scheduled.
    pub async fn schedule_sync(&self, sync: SyncType) -> DataResult<()> {
        let Some(user_id) = self.session.get().await.map(|s| s.user_id) else {
            tracing::warn!(kind = sync.kind(), "No signed-in user, not scheduling sync");
            return Ok(());
        };

        match sync {
            SyncType::CreateRun { run, map_picture } => {
                let run_id = run.id.clone().ok_or_else(|| {
                    tracing::error!("Cannot schedule upload of a run without an ID");
                    DataError::Local(LocalError::Unknown)
                })?;
                self.local
                    .upsert_run_pending_sync(&RunPendingSync {
                        run,
                        map_picture,
                        run_id: run_id.clone(),
                        user_id,
                    })
                    .await?;
                self.spawn_create(run_id);
            }
            SyncType::DeleteRun { run_id } => {
                self.local
                    .upsert_deleted_run_sync(&DeletedRunSync {
                        run_id: run_id.clone(),
                        user_id,
                    })
                    .await?;
                self.spawn_delete(run_id);
            }
        }
        Ok(())
    }

    /// Re-spawn jobs for every pending row of the signed-in user.
    ///
    /// Returns the number of jobs spawned.
    pub async fn resume_pending(&self) -> DataResult<usize> {
        let Some(user_id) = self.session.get().await.map(|s| s.user_id) else {
            return Ok(0);
        };

        let creates = self.local.get_all_run_pending_sync(&user_id).await?;
        let deletes = self.local.get_all_deleted_run_sync(&user_id).await?;
        let count = creates.len() + deletes.len();

        for pending in creates {
            self.spawn_create(pending.run_id);
        }
        for pending in deletes {
            self.spawn_delete(pending.run_id);
        }

        tracing::info!(user_id = %user_id, count, "Resumed pending syncs");
        Ok(count)
    }

    /// Cancel every scheduled job, periodic and one-shot.
    pub fn cancel_all_syncs(&self) {
        let count = self.jobs.len();
        self.jobs.retain(|_, job| {
            job.cancel.cancel();
            false
        });
        tracing::info!(count, "Cancelled all sync jobs");
    }

    /// Cancel the job scheduled under `tag`. Returns whether there was one.
    pub fn cancel_sync(&self, tag: &str) -> bool {
        match self.jobs.remove(tag) {
            Some((_, job)) => {
                job.cancel.cancel();
                tracing::info!(tag, "Cancelled sync job");
                true
            }
            None => false,
        }
    }

    /// Tag of the upload job for `run_id`.
    pub fn create_run_tag(run_id: &str) -> String {
        format!("create_run:{}", run_id)
    }

    /// Tags of jobs that are scheduled or running.
    pub fn scheduled_tags(&self) -> Vec<String> {
        self.jobs.iter().map(|entry| entry.key().clone()).collect()
    }

    fn spawn_create(&self, run_id: String) {
        let worker = CreateRunWorker {
            local: self.local.clone(),
            remote: self.remote.clone(),
            run_id: run_id.clone(),
        };
        self.spawn_one_shot(Self::create_run_tag(&run_id), worker);
    }

    fn spawn_delete(&self, run_id: String) {
        let worker = DeleteRunWorker {
            local: self.local.clone(),
            remote: self.remote.clone(),
            run_id: run_id.clone(),
        };
        self.spawn_one_shot(format!("delete_run:{}", run_id), worker);
    }

    fn spawn_one_shot<W: SyncWorker + 'static>(&self, tag: String, worker: W) {
        let backoff = self.backoff;
        self.spawn_job(tag, move |cancel| async move {
            run_with_retry(&worker, backoff, &cancel).await;
        });
    }

    /// Spawn a job under `tag`, replacing (and cancelling) any job with the
    /// same tag. The job removes itself from the registry when it finishes.
    fn spawn_job<F, Fut>(&self, tag: String, job: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        if let Some(old) = self.jobs.insert(
            tag.clone(),
            Job {
                id,
                cancel: cancel.clone(),
            },
        ) {
            old.cancel.cancel();
        }

        let fut = job(cancel);
        let jobs = self.jobs.clone();
        tokio::spawn(async move {
            fut.await;
            jobs.remove_if(&tag, |_, job| job.id == id);
            tracing::debug!(tag = %tag, "Sync job finished");
        });
    }
}
