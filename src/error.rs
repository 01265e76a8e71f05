//! Error types for the gatesync system.
//!
//! This module provides the error hierarchy for every fallible boundary:
//! loading declarative files, talking to a backend, and reconciling.
//! The diff engine itself is total and never produces these errors.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for gatesync.
#[derive(Debug, Error)]
pub enum GatesyncError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Backend errors.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Diff errors.
    #[error("Diff error: {0}")]
    Diff(#[from] DiffError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A declarative file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// A declarative file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// The same resource was declared twice across the loaded files.
    #[error("Duplicate {resource_type} \"{name}\" was found in {file}")]
    DuplicateResource {
        /// Singular resource kind (service, consumer, ...).
        resource_type: String,
        /// The duplicated name.
        name: String,
        /// File in which the duplicate appeared.
        file: String,
    },

    /// A resource type name that gatesync does not know.
    #[error("Unknown resource type: {name}")]
    UnknownResourceType {
        /// The unrecognized name.
        name: String,
    },

    /// A label selector entry that is not `key=value`.
    #[error("Invalid label selector: {selector}")]
    InvalidLabelSelector {
        /// The offending selector.
        selector: String,
    },
}

/// Backend errors.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend state is corrupted.
    #[error("Backend state is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Serialization error.
    #[error("Backend serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// Writing backend state failed.
    #[error("Failed to write backend state: {message}")]
    WriteFailed {
        /// Description of the failure.
        message: String,
    },

    /// Lock acquisition failed.
    #[error("Failed to acquire backend lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// Lock is held by another process.
    #[error("Backend is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// State version mismatch.
    #[error("Backend state version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Diff errors.
#[derive(Debug, Error)]
pub enum DiffError {
    /// A resource kind name that is not part of the model.
    #[error("Unsupported resource type: {name}")]
    UnsupportedResourceType {
        /// The unsupported name.
        name: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Some events could not be applied.
    #[error("{failed} of {total} events failed to apply")]
    EventsFailed {
        /// Number of failed events.
        failed: usize,
        /// Number of events submitted.
        total: usize,
    },
}

/// Result type alias for gatesync operations.
pub type Result<T> = std::result::Result<T, GatesyncError>;

impl GatesyncError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if retrying the operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Backend(BackendError::LockedByOther { .. } | BackendError::LockFailed { .. })
        )
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a parse error with an optional location.
    #[must_use]
    pub fn parse(message: impl Into<String>, location: Option<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location,
        }
    }
}

impl BackendError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Creates a corruption error with the given message.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}
