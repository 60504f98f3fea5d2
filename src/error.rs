// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types for the tracking, messaging and sync core.
//!
//! Remote and local failures are classified here so that callers (and the
//! sync workers) can decide whether to retry, queue, or give up.

/// Failure talking to the run backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("Request timed out")]
    RequestTimeout,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Conflict")]
    Conflict,

    #[error("Too many requests")]
    TooManyRequests,

    #[error("No internet connection")]
    NoInternet,

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Server error")]
    ServerError,

    #[error("Serialization error")]
    Serialization,

    #[error("Unknown network error")]
    Unknown,
}

impl NetworkError {
    /// Map a non-success HTTP status code to a network error.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => NetworkError::Unauthorized,
            408 => NetworkError::RequestTimeout,
            409 => NetworkError::Conflict,
            413 => NetworkError::PayloadTooLarge,
            429 => NetworkError::TooManyRequests,
            500..=599 => NetworkError::ServerError,
            _ => NetworkError::Unknown,
        }
    }

    /// Map a transport-level reqwest failure.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::RequestTimeout
        } else if err.is_connect() {
            NetworkError::NoInternet
        } else if err.is_decode() {
            NetworkError::Serialization
        } else {
            NetworkError::Unknown
        }
    }
}

/// Failure in local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LocalError {
    #[error("Disk full")]
    DiskFull,

    #[error("Unknown local storage error")]
    Unknown,
}

impl From<rusqlite::Error> for LocalError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DiskFull) => LocalError::DiskFull,
            _ => {
                tracing::error!(error = %err, "SQLite error");
                LocalError::Unknown
            }
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for LocalError {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e.into(),
            other => {
                tracing::error!(error = %other, "SQLite connection error");
                LocalError::Unknown
            }
        }
    }
}

/// Any failure of a repository operation: either side of the offline-first split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DataError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Local error: {0}")]
    Local(#[from] LocalError),
}

/// How a background sync job should react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Permanent,
}

impl DataError {
    /// Classify the error for sync worker retry policy.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            DataError::Local(_) => RetryClass::Permanent,
            DataError::Network(e) => match e {
                NetworkError::NoInternet
                | NetworkError::RequestTimeout
                | NetworkError::Unauthorized
                | NetworkError::TooManyRequests
                | NetworkError::ServerError => RetryClass::Retryable,
                NetworkError::Conflict
                | NetworkError::PayloadTooLarge
                | NetworkError::Serialization
                | NetworkError::Unknown => RetryClass::Permanent,
            },
        }
    }
}

/// Failure sending a messaging action to the paired device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MessagingError {
    /// No peer is connected; the action was queued for the next connection.
    #[error("Not connected to a device (action queued)")]
    Disconnected,

    #[error("Connection interrupted while sending")]
    ConnectionInterrupted,

    #[error("Unknown messaging error")]
    Unknown,
}

/// Failure managing a wearable exercise session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExerciseError {
    #[error("Heart rate tracking is not supported on this device")]
    TrackingNotSupported,

    #[error("An exercise owned by this app is already in progress")]
    OngoingOwnExercise,

    #[error("An exercise owned by another app is in progress")]
    OngoingOtherExercise,

    #[error("The exercise has already ended")]
    ExerciseAlreadyEnded,

    #[error("No exercise has been started")]
    NoActiveExercise,

    #[error("Unknown exercise error")]
    Unknown,
}

/// Failure in login/registration or session handling.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] validator::ValidationErrors),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email is already registered")]
    EmailConflict,

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Session storage error: {0}")]
    Session(String),
}

/// Top-level error used while wiring the core together.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Session storage error: {0}")]
    Session(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias for core setup.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Result type alias for repository operations.
pub type DataResult<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(NetworkError::from_status(401), NetworkError::Unauthorized);
        assert_eq!(NetworkError::from_status(408), NetworkError::RequestTimeout);
        assert_eq!(NetworkError::from_status(409), NetworkError::Conflict);
        assert_eq!(NetworkError::from_status(413), NetworkError::PayloadTooLarge);
        assert_eq!(NetworkError::from_status(429), NetworkError::TooManyRequests);
        assert_eq!(NetworkError::from_status(500), NetworkError::ServerError);
        assert_eq!(NetworkError::from_status(503), NetworkError::ServerError);
        assert_eq!(NetworkError::from_status(404), NetworkError::Unknown);
        assert_eq!(NetworkError::from_status(400), NetworkError::Unknown);
    }

    #[test]
    fn test_retry_class() {
        let retryable = [
            NetworkError::NoInternet,
            NetworkError::RequestTimeout,
            NetworkError::Unauthorized,
            NetworkError::TooManyRequests,
            NetworkError::ServerError,
        ];
        for e in retryable {
            assert_eq!(DataError::from(e).retry_class(), RetryClass::Retryable);
        }

        let permanent = [
            NetworkError::Conflict,
            NetworkError::PayloadTooLarge,
            NetworkError::Serialization,
            NetworkError::Unknown,
        ];
        for e in permanent {
            assert_eq!(DataError::from(e).retry_class(), RetryClass::Permanent);
        }

        assert_eq!(
            DataError::from(LocalError::DiskFull).retry_class(),
            RetryClass::Permanent
        );
    }
}
