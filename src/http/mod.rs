//! HTTP serving of the admin API.
//!
//! # Data Flow
//! ```text
//! TCP (or TLS) connection
//!     → server.rs (request id, trace span, timeout, body limit)
//!     → admin router (bearer auth, JSON handlers)
//!     → store / plugins / archiver / editor on blocking threads
//! ```

pub mod server;

pub use server::{AdminServer, AppState};
