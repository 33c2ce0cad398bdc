//! Filesystem primitives and protected-path access control.
//!
//! # Data Flow
//! ```text
//! logical path (/store/..., /sd/...)
//!     → policy.rs (protected? reject before touching disk)
//!     → path.rs (normalise)
//!     → mounts.rs (resolve onto host directory, perform I/O)
//! ```
//!
//! # Design Decisions
//! - The policy is a pure function of the path; it never looks at the disk
//! - Mount resolution normalises first, so `..` cannot escape a mount

pub mod editor;
pub mod mounts;
pub mod path;
pub mod policy;

pub use editor::FileEditor;
pub use mounts::{DirEntry, Mount, Vfs};
pub use policy::{ProtectedPathPolicy, SharedPolicy};
