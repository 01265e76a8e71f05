//! Backend module for gatesync.
//!
//! A backend holds the observed gateway configuration. It dumps that
//! configuration, reports the defaults the gateway injects, applies change
//! events in order, and guards syncs with a lock.

mod local;
mod lock;
mod store;
mod types;

pub use local::{DEFAULT_BACKEND_DIR, FileBackend};
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, generate_holder_id};
#[cfg(test)]
pub use store::MockBackend;
pub use store::Backend;
pub use types::{STATE_VERSION, StoredState, SyncOptions, SyncResult};
