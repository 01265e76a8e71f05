//! Backend data types.
//!
//! These types describe what a backend persists and what it reports back
//! after applying a list of events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{Configuration, DefaultValue};
use crate::planner::Event;

/// Current version of the stored state format.
pub const STATE_VERSION: &str = "1";

/// Everything a file backend persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredState {
    /// State format version.
    pub version: String,
    /// When the state was last written.
    pub updated_at: DateTime<Utc>,
    /// The gateway configuration, in observed form.
    #[serde(default)]
    pub configuration: Configuration,
    /// Values the gateway injects into resources.
    #[serde(default)]
    pub default_value: DefaultValue,
}

/// Options controlling how a backend applies events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Stop at the first event that fails to apply.
    pub exit_on_failure: bool,
}

/// Outcome of applying one event.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    /// Whether the event was applied.
    pub success: bool,
    /// The event that was applied.
    pub event: Event,
    /// Failure reason, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StoredState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            updated_at: Utc::now(),
            configuration: Configuration::new(),
            default_value: DefaultValue::new(),
        }
    }

    /// Marks the state as modified now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for StoredState {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            exit_on_failure: true,
        }
    }
}

impl SyncOptions {
    /// Sets whether processing stops at the first failure.
    #[must_use]
    pub const fn with_exit_on_failure(mut self, exit_on_failure: bool) -> Self {
        self.exit_on_failure = exit_on_failure;
        self
    }
}

impl SyncResult {
    /// Creates a successful result.
    #[must_use]
    pub const fn applied(event: Event) -> Self {
        Self {
            success: true,
            event,
            error: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(event: Event, error: impl Into<String>) -> Self {
        Self {
            success: false,
            event,
            error: Some(error.into()),
        }
    }
}

impl std::fmt::Display for SyncResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error {
            None => write!(f, "{} succeeded", self.event),
            Some(error) => write!(f, "{} failed: {error}", self.event),
        }
    }
}
