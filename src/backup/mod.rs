//! Encrypted backup and restore.
//!
//! # Data Flow
//! ```text
//! create_backup:
//!     maintenance guard → all namespaces + script trees → Snapshot
//!     → archive::seal (argon2id key, chacha20poly1305) → atomic write
//!
//! restore_backup:
//!     read → archive::open (authenticate, decode) → validate entries
//!     → stage trees as `<dir>.restore-<id>`
//!     → maintenance guard → swap dirs → install namespaces
//!     → seal store → RestoreCompleted → restart request
//! ```
//!
//! # Design Decisions
//! - A wrong password and a tampered file are the same error
//! - Generic user storage is neither saved nor restored
//! - Any failure before the namespace install leaves live state untouched

pub mod archive;
pub mod archiver;

pub use archive::{ArchiveError, ArchiveResult, KdfParams, Snapshot};
pub use archiver::{BackupArchiver, BackupSummary, RestoreSummary};
