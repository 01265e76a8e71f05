//! Backend trait definition.
//!
//! A backend is whatever holds the observed gateway configuration: it can
//! dump it, report the values it injects, and apply change events.

use async_trait::async_trait;

use crate::config::{Configuration, DefaultValue};
use crate::error::Result;
use crate::planner::Event;

use super::lock::LockInfo;
use super::types::{SyncOptions, SyncResult};

/// Trait for gateway backends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    /// Dumps the observed configuration.
    async fn dump(&self) -> Result<Configuration>;

    /// Returns the values the gateway injects into stored resources.
    async fn default_value(&self) -> Result<DefaultValue>;

    /// Replaces the default-value table.
    async fn set_default_value(&self, defaults: DefaultValue) -> Result<()>;

    /// Applies events in order.
    ///
    /// Events that fail to apply are reported as failed results rather than
    /// errors; an error means the backend itself could not be used.
    async fn sync(&self, events: &[Event], options: SyncOptions) -> Result<Vec<SyncResult>>;

    /// Acquires the backend lock.
    ///
    /// An empty `holder` is replaced by a generated process identifier.
    async fn lock(&self, holder: &str) -> Result<LockInfo>;

    /// Releases the backend lock if `lock_id` still holds it.
    async fn unlock(&self, lock_id: &str) -> Result<()>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl Backend for Box<dyn Backend> {
    async fn dump(&self) -> Result<Configuration> {
        (**self).dump().await
    }

    async fn default_value(&self) -> Result<DefaultValue> {
        (**self).default_value().await
    }

    async fn set_default_value(&self, defaults: DefaultValue) -> Result<()> {
        (**self).set_default_value(defaults).await
    }

    async fn sync(&self, events: &[Event], options: SyncOptions) -> Result<Vec<SyncResult>> {
        (**self).sync(events, options).await
    }

    async fn lock(&self, holder: &str) -> Result<LockInfo> {
        (**self).lock(holder).await
    }

    async fn unlock(&self, lock_id: &str) -> Result<()> {
        (**self).unlock(lock_id).await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}
