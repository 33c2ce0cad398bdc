//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Restart (restart.rs):
//!     restore completed → RestartHandle::request_restart
//!     → delay → Shutdown::trigger → exit(RESTART_EXIT_CODE)
//!
//! Shutdown (shutdown.rs):
//!     trigger → admin server stops accepting → in-flight requests drain → exit
//! ```

pub mod restart;
pub mod shutdown;
pub mod signals;

pub use restart::{ProcessRestarter, RestartHandle, RESTART_EXIT_CODE};
pub use shutdown::Shutdown;
