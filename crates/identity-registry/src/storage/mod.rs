//! Storage layer for registry snapshots.
//!
//! The registry itself is purely in-memory. Binaries that need state to
//! survive a restart capture it with [`SnapshotStore`]:
//!
//! ```text
//! ~/.idreg/
//! └── registry.json
//! ```
//!
//! # Modules
//!
//! - [`snapshot`] — whole-table JSON snapshot save/load.

pub mod snapshot;

pub use snapshot::{SnapshotLock, SnapshotStore};
