//! Run statistics aggregates for the analytics screen.
//!
//! Computed from local runs on demand; each run is counted once.

use chrono::Datelike;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use crate::models::Run;

/// Aggregated statistics over a user's runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    // ─── Totals ──────────────────────────────────────────────────
    /// Number of runs counted
    pub total_runs: u32,
    /// Total distance across all runs (meters)
    pub total_distance_meters: i64,
    /// Total time spent running
    pub total_duration: Duration,

    // ─── Bests ───────────────────────────────────────────────────
    /// Fastest speed ever recorded (km/h)
    pub max_speed_kmh: f64,

    // ─── Per-run averages ────────────────────────────────────────
    /// Sum of per-run average paces, divided out in `avg_pace_per_run`
    pace_sum: Duration,
    /// Number of runs with a defined pace (non-zero distance)
    paced_runs: u32,

    // ─── Time Series ─────────────────────────────────────────────
    /// Run count per month ("YYYY-MM")
    pub runs_by_month: BTreeMap<String, u32>,

    // ─── Idempotency ─────────────────────────────────────────────
    /// IDs already counted
    counted_run_ids: HashSet<String>,
}

impl RunStats {
    /// Build stats from a list of runs.
    pub fn from_runs<'a>(runs: impl IntoIterator<Item = &'a Run>) -> Self {
        let mut stats = Self::default();
        for run in runs {
            stats.update_from_run(run);
        }
        stats
    }

    /// Add a run to the aggregate.
    ///
    /// Returns `false` if a run with the same ID was already counted.
    /// Runs without an ID are always counted.
    pub fn update_from_run(&mut self, run: &Run) -> bool {
        if let Some(id) = &run.id {
            if !self.counted_run_ids.insert(id.clone()) {
                return false;
            }
        }

        self.total_runs += 1;
        self.total_distance_meters += run.distance_meters as i64;
        self.total_duration += run.duration;
        self.max_speed_kmh = self.max_speed_kmh.max(run.max_speed_kmh);

        if run.distance_meters > 0 {
            self.pace_sum += run.avg_pace();
            self.paced_runs += 1;
        }

        let month_key = format!(
            "{:04}-{:02}",
            run.date_time_utc.year(),
            run.date_time_utc.month()
        );
        *self.runs_by_month.entry(month_key).or_insert(0) += 1;

        true
    }

    /// Average distance per run (meters).
    pub fn avg_distance_per_run(&self) -> f64 {
        if self.total_runs == 0 {
            return 0.0;
        }
        self.total_distance_meters as f64 / self.total_runs as f64
    }

    /// Mean of each run's average pace.
    pub fn avg_pace_per_run(&self) -> Duration {
        if self.paced_runs == 0 {
            return Duration::ZERO;
        }
        self.pace_sum / self.paced_runs
    }
}
