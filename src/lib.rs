//! Configuration layer of a vehicle telemetry module.
//!
//! Parameter store with atomic map persistence, protected-path access
//! control, encrypted backup/restore and dynamic plugin registration,
//! exposed through a JSON admin API.

pub mod admin;
pub mod backup;
pub mod config;
pub mod error;
pub mod events;
pub mod forms;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod plugins;
pub mod store;
pub mod vfs;

pub use config::schema::ServiceConfig;
pub use error::{CfgError, CfgResult};
pub use http::{AdminServer, AppState};
pub use lifecycle::Shutdown;
pub use store::ParamStore;
