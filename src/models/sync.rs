// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable pending-sync rows.

use crate::models::Run;

/// A locally created run whose upload has not been confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPendingSync {
    pub run: Run,
    /// JPEG map snapshot to upload with the run
    pub map_picture: Vec<u8>,
    pub run_id: String,
    pub user_id: String,
}

/// A locally deleted run whose remote delete has not been confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedRunSync {
    pub run_id: String,
    pub user_id: String,
}
