//! # Error Handling Module
//!
//! This module defines the error taxonomy shared by every part of the synchronization
//! layer using the `thiserror` crate.
//!
//! ## Propagation Policy
//! - `NotFound` on a read is cached as an error entry with a short stale window and
//!   surfaced to the presentation layer as "no data"
//! - `Validation` errors are raised before any speculative cart write
//! - `Network` and `Conflict` errors during a cart mutation trigger rollback and are
//!   returned to the caller
//! - Prefetch failures are logged and swallowed
//!
//! Errors are `Clone` because a single failed fetch is delivered to every caller that
//! joined it.

use thiserror::Error;

/// Main result type used throughout the synchronization layer
pub type SyncResult<T> = Result<T, SyncError>;

/// Error types surfaced by the cache store, the mutation controller and the
/// remote data service
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The requested resource does not exist on the server (missing cart, unknown product)
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Input rejected before it reached the server (missing address fields, bad quantity)
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    /// Transport level failure talking to the commerce API
    #[error("Network error: {message}")]
    Network { message: String },

    /// The server rejected the write because its view of the resource changed
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Configuration-related errors (invalid tier table, unreadable config file, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The operation was cancelled through its abort token
    #[error("Operation cancelled")]
    Cancelled,

    /// Anything the remote data service could not classify
    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

impl SyncError {
    /// Create a not found error for a resource description
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a validation error for a field
    pub fn validation<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a network error with a custom message
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a conflict error with a custom message
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an unknown error with a custom message
    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Whether this error means the resource is missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this error came from input validation
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if a caller could reasonably retry the failed operation
    ///
    /// The core never retries on its own; this only informs retry policies layered
    /// on top of it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Conflict { .. })
    }

    /// Get a string representation of the error type for logs and UI messaging
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Validation { .. } => "validation_error",
            Self::Network { .. } => "network_error",
            Self::Conflict { .. } => "conflict",
            Self::Configuration { .. } => "configuration_error",
            Self::Cancelled => "cancelled",
            Self::Unknown { .. } => "unknown_error",
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::not_found(err.to_string())
        } else {
            Self::unknown(format!("I/O error: {}", err))
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::config(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for SyncError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::config(format!("YAML error: {}", err))
    }
}
