//! Multi-row configuration forms.
//!
//! Each form computes the complete desired map of its namespace from the
//! submitted rows and commits it with exactly one replace. Rows omitted from
//! a submission are deleted by that replace. Single-record forms
//! (password, web server) only touch the keys they own.

pub mod locations;
pub mod logging;
pub mod notifications;
pub mod password;
pub mod webserver;
pub mod wifi;

use serde::Serialize;

pub use locations::{list_locations, save_locations, Location, LocationRow, LOCATIONS_NAMESPACE};
pub use logging::{load_logging, save_logging, LoggingForm, TagLevel, LOG_NAMESPACE};
pub use notifications::{
    load_notifications, save_notifications, EventMessage, NotificationForm, NotificationPriority,
    PUSHOVER_NAMESPACE,
};
pub use password::{
    change_password, module_password, password_status, PasswordChanged, PasswordForm,
    PasswordStatus, MODULE_PASSWORD_KEY, PASSWORD_NAMESPACE,
};
pub use webserver::{load_webserver, save_webserver, WebServerForm, WEBSERVER_NAMESPACE};
pub use wifi::{load_wifi_table, save_wifi_table, WifiRow, WifiTable, WifiTableForm, WifiTableView};

/// Result of an accepted form submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormOutcome {
    /// Non-fatal findings, e.g. networks without a password.
    pub warnings: Vec<String>,
}
