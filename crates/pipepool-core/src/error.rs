//! Error types for the acceptor pool.
//!
//! Errors surface in two places only: construction (invalid channel name or
//! options) and inside a slot's listener loop (endpoint creation / accept).
//! `start()` and `dispose()` never return errors to callers.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    // Construction errors
    #[error("Invalid channel name {name:?}: {reason}")]
    InvalidChannelName { name: String, reason: String },

    #[error("Invalid pool options: {message}")]
    InvalidOptions { message: String },

    #[error("No tokio runtime available; the pool must be created inside a runtime")]
    NoRuntime,

    // Endpoint errors
    #[error("Failed to create endpoint on {channel}: {message}")]
    EndpointCreation {
        channel: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Channel {channel} is already served by another process")]
    ChannelInUse { channel: String },

    #[error("Accept failed on {channel}: {source}")]
    Accept {
        channel: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Endpoint factory for {channel} is closed")]
    FactoryClosed { channel: String },

    // Client errors
    #[error("Failed to connect to {channel}: {source}")]
    Connect {
        channel: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {timeout:?} connecting to {channel}")]
    ConnectTimeout {
        channel: String,
        timeout: std::time::Duration,
    },

    // Configuration file errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Operation was cancelled")]
    Cancelled,
}

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

impl From<std::io::Error> for PoolError {
    fn from(err: std::io::Error) -> Self {
        PoolError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        PoolError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl PoolError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PoolError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create an endpoint-creation error from an OS error.
    pub fn endpoint(channel: impl Into<String>, err: std::io::Error) -> Self {
        PoolError::EndpointCreation {
            channel: channel.into(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Whether this error is part of an orderly shutdown rather than a fault.
    ///
    /// Listener loops treat these as a clean exit and do not report them.
    pub fn is_shutdown(&self) -> bool {
        matches!(
            self,
            PoolError::Cancelled | PoolError::FactoryClosed { .. }
        )
    }
}
