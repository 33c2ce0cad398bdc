//! Module and admin password (`password/module`).
//!
//! The same password unlocks the admin UI and, when no explicit password
//! is given, backup archives. While the `OVMS` access point shares it, a
//! change updates both.

use serde::{Deserialize, Serialize};

use crate::error::{CfgError, CfgResult, FieldError, ValidationErrors};
use crate::forms::wifi::{WifiTable, DEFAULT_AP_SSID};
use crate::store::{ParamStore, StorageError};

pub const PASSWORD_NAMESPACE: &str = "password";
pub const MODULE_PASSWORD_KEY: &str = "module";

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PasswordForm {
    #[serde(default)]
    pub old_password: String,
    pub new_password: String,
    /// Repetition of `new_password`.
    pub confirm: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PasswordStatus {
    /// False means the admin UI is open to anyone.
    pub is_set: bool,
    /// The `OVMS` access point uses the module password.
    pub shared_with_ap: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PasswordChanged {
    pub ap_updated: bool,
    pub warnings: Vec<String>,
}

pub fn module_password(store: &ParamStore) -> String {
    store.get_value(PASSWORD_NAMESPACE, MODULE_PASSWORD_KEY, "")
}

pub fn password_status(store: &ParamStore) -> PasswordStatus {
    let current = module_password(store);
    PasswordStatus {
        is_set: !current.is_empty(),
        shared_with_ap: !current.is_empty()
            && current == store.get_value(WifiTable::Ap.namespace(), DEFAULT_AP_SSID, ""),
    }
}

/// Change the module password after checking the old one.
///
/// The module password is committed first. If the access point update then
/// fails, the change stands and a warning says the two now differ.
pub fn change_password(store: &ParamStore, form: &PasswordForm) -> CfgResult<PasswordChanged> {
    let current = module_password(store);
    let mut errors = ValidationErrors::new();
    if form.old_password != current {
        errors.push(FieldError::on("old_password", "Old password is not correct"));
    }
    if form.new_password == form.old_password {
        errors.push(FieldError::on(
            "new_password",
            "New password identical to old password",
        ));
    }
    if form.new_password.len() < MIN_PASSWORD_LEN {
        errors.push(FieldError::on(
            "new_password",
            format!("New password must have at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    if form.confirm != form.new_password {
        errors.push(FieldError::on("confirm", "Passwords do not match"));
    }
    if !errors.is_empty() {
        return Err(CfgError::Validation(errors));
    }

    let shared = password_status(store).shared_with_ap;
    store.set_value(PASSWORD_NAMESPACE, MODULE_PASSWORD_KEY, &form.new_password)?;
    tracing::info!("Module password changed");

    let mut changed = PasswordChanged::default();
    if shared {
        match store.set_value(WifiTable::Ap.namespace(), DEFAULT_AP_SSID, &form.new_password) {
            Ok(()) => changed.ap_updated = true,
            Err(e @ StorageError::RestartPending) => return Err(e.into()),
            Err(e) => {
                tracing::error!(error = %e, "Failed to update access point password");
                changed.warnings.push(format!(
                    "Wifi AP password for `{}` was not changed: {}",
                    DEFAULT_AP_SSID, e
                ));
            }
        }
    }
    Ok(changed)
}
