// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! SQLite client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Runs (the local source of truth for reads)
//! - Pending creates (runs whose upload is not yet confirmed)
//! - Pending deletes (runs whose remote delete is not yet confirmed)
//!
//! All access goes through tokio-rusqlite's single background connection
//! thread, so writes are serialized.

use crate::db::{new_run_id, tables};
use crate::error::LocalError;
use crate::models::{DeletedRunSync, Location, Run, RunDto, RunPendingSync};
use crate::time_utils::format_utc_rfc3339;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_rusqlite::Connection;

const RUN_COLUMNS: &str = "id, duration_millis, date_time_utc, distance_meters, lat, long, \
     max_speed_kmh, total_elevation_meters, map_picture_url, avg_heart_rate, max_heart_rate";

/// Local run database.
#[derive(Clone)]
pub struct LocalDb {
    conn: Connection,
    /// Bumped after every write to the runs table.
    changes: Arc<watch::Sender<u64>>,
}

impl LocalDb {
    /// Open (or create) the database file.
    pub async fn new(path: &str) -> Result<Self, LocalError> {
        let conn = Connection::open(path).await?;
        tracing::info!(path, "Opened local run database");
        Self::init(conn).await
    }

    /// Create an in-memory database for testing.
    pub async fn new_in_memory() -> Result<Self, LocalError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, LocalError> {
        let schema = format!(
            "CREATE TABLE IF NOT EXISTS {runs} (
                id TEXT PRIMARY KEY,
                duration_millis INTEGER NOT NULL,
                date_time_utc TEXT NOT NULL,
                distance_meters INTEGER NOT NULL,
                lat REAL NOT NULL,
                long REAL NOT NULL,
                max_speed_kmh REAL NOT NULL,
                total_elevation_meters INTEGER NOT NULL,
                map_picture_url TEXT,
                avg_heart_rate INTEGER,
                max_heart_rate INTEGER
            );
            CREATE TABLE IF NOT EXISTS {pending} (
                run_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                run_json TEXT NOT NULL,
                map_picture BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{pending}_user ON {pending}(user_id);
            CREATE TABLE IF NOT EXISTS {deleted} (
                run_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{deleted}_user ON {deleted}(user_id);",
            runs = tables::RUNS,
            pending = tables::RUN_PENDING_SYNC,
            deleted = tables::DELETED_RUN_SYNC,
        );

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            conn.execute_batch(&schema)?;
            Ok(())
        })
        .await?;

        let (changes, _) = watch::channel(0);
        Ok(Self {
            conn,
            changes: Arc::new(changes),
        })
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    // ─── Run Operations ──────────────────────────────────────────

    /// All runs, most recent first.
    pub async fn get_runs(&self) -> Result<Vec<Run>, LocalError> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM {} ORDER BY date_time_utc DESC",
            tables::RUNS
        );
        let runs = self
            .conn
            .call(move |conn| -> Result<Vec<Run>, rusqlite::Error> {
                let mut stmt = conn.prepare(&sql)?;
                let runs = stmt
                    .query_map([], run_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(runs)
            })
            .await?;
        Ok(runs)
    }

    /// Stream of all runs: the current list, then a fresh list after every change.
    pub fn observe_runs(&self) -> BoxStream<'static, Result<Vec<Run>, LocalError>> {
        let rx = self.changes.subscribe();
        stream::unfold((self.clone(), rx, true), |(db, mut rx, first)| async move {
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let _ = rx.borrow_and_update();
            let runs = db.get_runs().await;
            Some((runs, (db, rx, false)))
        })
        .boxed()
    }

    /// Insert or replace a run, assigning a new ID if it has none.
    ///
    /// Returns the run's ID.
    pub async fn upsert_run(&self, run: &Run) -> Result<String, LocalError> {
        let ids = self.upsert_runs(std::slice::from_ref(run)).await?;
        ids.into_iter().next().ok_or(LocalError::Unknown)
    }

    /// Insert or replace multiple runs in one transaction.
    pub async fn upsert_runs(&self, runs: &[Run]) -> Result<Vec<String>, LocalError> {
        let mut rows = Vec::with_capacity(runs.len());
        for run in runs {
            let mut run = run.clone();
            if run.id.is_none() {
                run.id = Some(new_run_id()?);
            }
            rows.push(run);
        }

        let sql = format!(
            "INSERT OR REPLACE INTO {} ({RUN_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            tables::RUNS
        );

        let ids = self
            .conn
            .call(move |conn| -> Result<Vec<String>, rusqlite::Error> {
                let tx = conn.transaction()?;
                let mut ids = Vec::with_capacity(rows.len());
                {
                    let mut stmt = tx.prepare(&sql)?;
                    for run in &rows {
                        let id = run.id.clone().unwrap_or_default();
                        stmt.execute(params![
                            id,
                            run.duration.as_millis() as i64,
                            format_utc_rfc3339(run.date_time_utc),
                            run.distance_meters,
                            run.location.lat,
                            run.location.long,
                            run.max_speed_kmh,
                            run.total_elevation_meters,
                            run.map_picture_url,
                            run.avg_heart_rate,
                            run.max_heart_rate,
                        ])?;
                        ids.push(id);
                    }
                }
                tx.commit()?;
                Ok(ids)
            })
            .await?;

        self.notify_changed();
        Ok(ids)
    }

    /// Delete a run by ID. Deleting a missing run is not an error.
    pub async fn delete_run(&self, id: &str) -> Result<(), LocalError> {
        let id = id.to_string();
        let sql = format!("DELETE FROM {} WHERE id = ?1", tables::RUNS);
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(&sql, params![id])?;
                Ok(())
            })
            .await?;
        self.notify_changed();
        Ok(())
    }

    /// Delete every local run (used on sign-out).
    pub async fn delete_all_runs(&self) -> Result<(), LocalError> {
        let sql = format!("DELETE FROM {}", tables::RUNS);
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(&sql, [])?;
                Ok(())
            })
            .await?;
        self.notify_changed();
        Ok(())
    }

    // ─── Pending Create Operations ───────────────────────────────

    /// All pending creates owned by a user.
    pub async fn get_all_run_pending_sync(
        &self,
        user_id: &str,
    ) -> Result<Vec<RunPendingSync>, LocalError> {
        let user_id = user_id.to_string();
        let sql = format!(
            "SELECT run_id, user_id, run_json, map_picture FROM {} WHERE user_id = ?1",
            tables::RUN_PENDING_SYNC
        );
        let rows = self
            .conn
            .call(move |conn| -> Result<Vec<RunPendingSync>, rusqlite::Error> {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![user_id], pending_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// A single pending create by run ID.
    pub async fn get_run_pending_sync(
        &self,
        run_id: &str,
    ) -> Result<Option<RunPendingSync>, LocalError> {
        let run_id = run_id.to_string();
        let sql = format!(
            "SELECT run_id, user_id, run_json, map_picture FROM {} WHERE run_id = ?1",
            tables::RUN_PENDING_SYNC
        );
        let row = self
            .conn
            .call(move |conn| -> Result<Option<RunPendingSync>, rusqlite::Error> {
                conn.query_row(&sql, params![run_id], pending_from_row)
                    .optional()
            })
            .await?;
        Ok(row)
    }

    /// Store a pending create.
    pub async fn upsert_run_pending_sync(&self, entry: &RunPendingSync) -> Result<(), LocalError> {
        let run_json = serde_json::to_string(&RunDto::from(&entry.run)).map_err(|e| {
            tracing::error!(error = %e, run_id = %entry.run_id, "Failed to encode pending run");
            LocalError::Unknown
        })?;
        let run_id = entry.run_id.clone();
        let user_id = entry.user_id.clone();
        let map_picture = entry.map_picture.clone();
        let sql = format!(
            "INSERT OR REPLACE INTO {} (run_id, user_id, run_json, map_picture) \
             VALUES (?1, ?2, ?3, ?4)",
            tables::RUN_PENDING_SYNC
        );
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(&sql, params![run_id, user_id, run_json, map_picture])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Remove a pending create once the upload is confirmed.
    pub async fn delete_run_pending_sync(&self, run_id: &str) -> Result<(), LocalError> {
        let run_id = run_id.to_string();
        let sql = format!("DELETE FROM {} WHERE run_id = ?1", tables::RUN_PENDING_SYNC);
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(&sql, params![run_id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // ─── Pending Delete Operations ───────────────────────────────

    /// All pending deletes owned by a user.
    pub async fn get_all_deleted_run_sync(
        &self,
        user_id: &str,
    ) -> Result<Vec<DeletedRunSync>, LocalError> {
        let user_id = user_id.to_string();
        let sql = format!(
            "SELECT run_id, user_id FROM {} WHERE user_id = ?1",
            tables::DELETED_RUN_SYNC
        );
        let rows = self
            .conn
            .call(move |conn| -> Result<Vec<DeletedRunSync>, rusqlite::Error> {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![user_id], |row| {
                        Ok(DeletedRunSync {
                            run_id: row.get(0)?,
                            user_id: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Store a pending delete.
    pub async fn upsert_deleted_run_sync(&self, entry: &DeletedRunSync) -> Result<(), LocalError> {
        let run_id = entry.run_id.clone();
        let user_id = entry.user_id.clone();
        let sql = format!(
            "INSERT OR REPLACE INTO {} (run_id, user_id) VALUES (?1, ?2)",
            tables::DELETED_RUN_SYNC
        );
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(&sql, params![run_id, user_id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Remove a pending delete once the remote delete is confirmed.
    pub async fn delete_deleted_run_sync(&self, run_id: &str) -> Result<(), LocalError> {
        let run_id = run_id.to_string();
        let sql = format!("DELETE FROM {} WHERE run_id = ?1", tables::DELETED_RUN_SYNC);
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(&sql, params![run_id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

// ─── Row Mapping ─────────────────────────────────────────────────

fn run_from_row(row: &Row<'_>) -> Result<Run, rusqlite::Error> {
    let date: String = row.get(2)?;
    let date_time_utc = DateTime::parse_from_rfc3339(&date)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);
    let duration_millis: i64 = row.get(1)?;

    Ok(Run {
        id: Some(row.get(0)?),
        duration: Duration::from_millis(duration_millis.max(0) as u64),
        date_time_utc,
        distance_meters: row.get(3)?,
        location: Location::new(row.get(4)?, row.get(5)?),
        max_speed_kmh: row.get(6)?,
        total_elevation_meters: row.get(7)?,
        map_picture_url: row.get(8)?,
        avg_heart_rate: row.get(9)?,
        max_heart_rate: row.get(10)?,
    })
}

fn pending_from_row(row: &Row<'_>) -> Result<RunPendingSync, rusqlite::Error> {
    let run_json: String = row.get(2)?;
    let run = serde_json::from_str::<RunDto>(&run_json)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })
        .and_then(|dto| {
            Run::try_from(dto).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
        })?;

    Ok(RunPendingSync {
        run_id: row.get(0)?,
        user_id: row.get(1)?,
        run,
        map_picture: row.get(3)?,
    })
}
