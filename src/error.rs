//! Error types for record synchronization
//!
//! Errors are classified by recoverability:
//! - Retryable: network issues, timeouts, rate limits, server errors
//! - NonRetryable: rejected requests, bad endpoints, configuration errors

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single request against the record store, or of a whole
/// collection fetch once retries are exhausted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    // Retryable errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Record store rate limit exceeded")]
    RateLimited,

    #[error("Record store error {status}: {message}")]
    Api { status: u16, message: String },

    // Non-retryable errors
    #[error("Record store rejected credentials")]
    Unauthorized,

    #[error("Invalid endpoint '{0}'")]
    InvalidEndpoint(String),
}

impl SyncError {
    /// Returns true if a later attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Timeout(_) | SyncError::RateLimited => true,
            SyncError::Api { status, .. } => *status >= 500 || *status == 408,
            SyncError::Unauthorized | SyncError::InvalidEndpoint(_) => false,
        }
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SyncError::Network(_) => "Check connectivity to the record store.",
            SyncError::Timeout(_) => "The record store is slow. The next refresh will retry.",
            SyncError::RateLimited => "Lower the page concurrency or the refresh frequency.",
            SyncError::Api { .. } => "Check the record store logs for details.",
            SyncError::Unauthorized => "Check the apiKey in the salesboard config.",
            SyncError::InvalidEndpoint(_) => "Check baseUrl and endpoint names in the config.",
        }
    }
}

/// Errors raised while loading `config.json`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found at {0}")]
    NotFound(PathBuf),

    #[error("Could not determine home directory")]
    NoHomeDir,

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
