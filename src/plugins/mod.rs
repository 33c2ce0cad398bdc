//! Web plugin registry.
//!
//! # Data Flow
//! ```text
//! submitted rows {key, mode, type, enabled}
//!     → validate (syntax, duplicates; all errors together)
//!     → per-key locks (sorted)
//!     → empty content files for new keys
//!     → one replace of `http.plugin`
//!     → delete content of keys no longer submitted
//! ```
//!
//! # Design Decisions
//! - Content writes happen before metadata commits, deletions after
//! - A content file exists for every registered key from the first commit on
//! - Different keys never block each other; list submissions are serialized

pub mod descriptor;
pub mod registry;

pub use descriptor::{
    is_valid_key, PluginDescriptor, PluginEdit, PluginKind, PluginRow, PluginType, RowMode,
    PLUGIN_NAMESPACE,
};
pub use registry::{PluginRegistry, PluginView, ReconcileOutcome};
