//! Identity registry — one opaque identity record per principal.
//!
//! A principal registers exactly one identity, may replace its payload,
//! and may deactivate it. Anyone may read any identity's payload and
//! activation flag. Failures carry one of three fixed codes:
//! 401 (not the owner), 404 (no such identity), 409 (already registered).
//!
//! The [`dispatch`] module exposes the registry through named calls for
//! transports; [`storage`] snapshots it to disk.

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod principal;
pub mod record;
pub mod registry;
pub mod serde_helpers;
pub mod storage;

// Re-export primary types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RegistryConfig;
pub use dispatch::{CallKind, CallRecord, Dispatcher, Operation, Value};
pub use error::{DispatchError, RegistryError, Result, StorageError};
pub use principal::Principal;
pub use record::IdentityRecord;
pub use registry::IdentityRegistry;
pub use storage::{SnapshotLock, SnapshotStore};
