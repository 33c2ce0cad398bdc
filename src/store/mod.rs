//! Configuration parameter store.
//!
//! # Data Flow
//! ```text
//! caller computes the complete desired map
//!     → ParamStore::replace_with / set_map (namespace write lock)
//!     → ParamBackend::store (temp file, fsync, rename)
//!     → ConfigParam publishes the new map (single ArcSwap store)
//!     → readers holding old snapshots keep them; new readers see the new map
//! ```
//!
//! # Design Decisions
//! - A namespace map is the unit of atomicity; single keys are never persisted alone
//! - Persist first, publish second: a failed write leaves the cache on the committed map
//! - Backup/restore take the store-wide gate exclusively via [`Maintenance`]

pub mod backend;
pub mod error;
pub mod param;
pub mod param_store;

pub use backend::{FileBackend, MemoryBackend, NamespaceDump, ParamBackend, ParamMap};
pub use error::{StorageError, StorageResult};
pub use param::ConfigParam;
pub use param_store::{validate_namespace, Maintenance, ParamStore, StorePhase, WriteGate};
