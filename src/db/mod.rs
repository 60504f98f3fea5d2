// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Local storage layer (SQLite).

pub mod sqlite;

pub use sqlite::LocalDb;

use crate::error::LocalError;
use ring::rand::{SecureRandom, SystemRandom};

/// Table names as constants.
pub mod tables {
    pub const RUNS: &str = "runs";
    /// Runs created locally, upload pending (keyed by run_id, scoped by user_id)
    pub const RUN_PENDING_SYNC: &str = "run_pending_sync";
    /// Runs deleted locally, remote delete pending
    pub const DELETED_RUN_SYNC: &str = "deleted_run_sync";
}

/// Generate a new 24-hex-char run ID: 4 bytes of Unix seconds followed by
/// 8 random bytes, so IDs sort roughly by creation time.
pub fn new_run_id() -> Result<String, LocalError> {
    let mut bytes = [0u8; 12];
    let secs = chrono::Utc::now().timestamp() as u32;
    bytes[..4].copy_from_slice(&secs.to_be_bytes());
    SystemRandom::new().fill(&mut bytes[4..]).map_err(|_| {
        tracing::error!("System RNG failure while generating run ID");
        LocalError::Unknown
    })?;
    Ok(hex::encode(bytes))
}
