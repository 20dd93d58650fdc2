//! Resilient key/JSON persistence for waypoint.
//!
//! [`PersistentStore`] sits on top of one [`StorageBackend`] chosen at
//! startup: the durable [`FileBackend`] when it passes its write/delete
//! self-test, otherwise the volatile [`MemoryBackend`]. The choice is made
//! once and never re-checked. No call on the store returns an error; every
//! fault becomes `false`/`None` plus a telemetry event.

pub mod backend;
pub mod file;
pub mod memory;
pub mod store;

pub use backend::{BackendKind, StorageBackend};
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use store::{PURGE_AGE_MS, PersistentStore, SENTINEL_KEY, StoreOptions};
