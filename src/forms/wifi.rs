//! WiFi network tables (`wifi.ap`, `wifi.ssid`).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CfgError, CfgResult, FieldError, ValidationErrors};
use crate::forms::FormOutcome;
use crate::store::{ParamMap, ParamStore};

/// Namespace holding the autostart selections.
const AUTO_NAMESPACE: &str = "auto";

/// Access point network the module offers out of the box.
pub const DEFAULT_AP_SSID: &str = "OVMS";

/// One of the two network tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WifiTable {
    /// Networks the module offers as access point.
    Ap,
    /// Networks the module joins as client.
    Client,
}

impl WifiTable {
    pub fn namespace(self) -> &'static str {
        match self {
            WifiTable::Ap => "wifi.ap",
            WifiTable::Client => "wifi.ssid",
        }
    }

    pub fn min_password_len(self) -> usize {
        match self {
            WifiTable::Ap => 8,
            WifiTable::Client => 0,
        }
    }

    fn autostart_key(self) -> &'static str {
        match self {
            WifiTable::Ap => "wifi.ssid.ap",
            WifiTable::Client => "wifi.ssid.client",
        }
    }

    fn autostart_default(self) -> &'static str {
        match self {
            WifiTable::Ap => DEFAULT_AP_SSID,
            WifiTable::Client => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiRow {
    pub ssid: String,
    /// Empty keeps the stored password for this SSID.
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiTableForm {
    pub rows: Vec<WifiRow>,
    /// Index into `rows` of the network to start automatically.
    #[serde(default)]
    pub autostart: Option<usize>,
}

/// Table contents without passwords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WifiTableView {
    pub ssids: Vec<String>,
    pub autostart: String,
}

pub fn load_wifi_table(store: &ParamStore, table: WifiTable) -> WifiTableView {
    WifiTableView {
        ssids: store.snapshot(table.namespace()).keys().cloned().collect(),
        autostart: store.get_value(
            AUTO_NAMESPACE,
            table.autostart_key(),
            table.autostart_default(),
        ),
    }
}

/// Replace a network table; on success select the autostart network.
pub fn save_wifi_table(
    store: &ParamStore,
    table: WifiTable,
    form: &WifiTableForm,
) -> CfgResult<FormOutcome> {
    let mut outcome = FormOutcome::default();
    let mut autostart = None;

    store.replace_with(table.namespace(), |current| {
        let mut errors = ValidationErrors::new();
        let mut next = ParamMap::new();
        let mut seen = HashSet::new();

        for (i, row) in form.rows.iter().enumerate() {
            let is_autostart = form.autostart == Some(i);
            let field = format!("rows[{}]", i);
            if row.ssid.is_empty() {
                if is_autostart {
                    errors.push(FieldError::on(field, "Autostart SSID may not be empty"));
                }
                continue;
            }
            if !seen.insert(row.ssid.as_str()) {
                outcome.warnings.push(format!(
                    "SSID `{}` listed more than once; the last row wins",
                    row.ssid
                ));
            }

            let password = if row.password.is_empty() {
                current.get(&row.ssid).cloned().unwrap_or_default()
            } else {
                row.password.clone()
            };
            if password.is_empty() {
                if is_autostart {
                    errors.push(FieldError::on(
                        field,
                        format!("Autostart SSID `{}` has no password", row.ssid),
                    ));
                } else {
                    outcome
                        .warnings
                        .push(format!("SSID `{}` has no password", row.ssid));
                }
            } else if password.len() < table.min_password_len() {
                errors.push(FieldError::on(
                    field,
                    format!(
                        "SSID `{}`: password is too short (min {} chars)",
                        row.ssid,
                        table.min_password_len()
                    ),
                ));
            }

            if is_autostart {
                autostart = Some(row.ssid.clone());
            }
            next.insert(row.ssid.clone(), password);
        }

        if errors.is_empty() {
            Ok(next)
        } else {
            Err(CfgError::Validation(errors))
        }
    })?;

    if let Some(ssid) = autostart {
        store.set_value(AUTO_NAMESPACE, table.autostart_key(), &ssid)?;
    }
    tracing::info!(
        namespace = table.namespace(),
        networks = form.rows.len(),
        warnings = outcome.warnings.len(),
        "WiFi table saved"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::store::MemoryBackend;
    use std::sync::Arc;

    fn store_with(pairs: &[(&str, &str)], ns: &str) -> (Arc<MemoryBackend>, ParamStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = ParamStore::new(backend.clone(), EventBus::new());
        let map: ParamMap = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if !map.is_empty() {
            store.set_map(ns, map).unwrap();
        }
        (backend, store)
    }

    fn row(ssid: &str, password: &str) -> WifiRow {
        WifiRow {
            ssid: ssid.into(),
            password: password.into(),
        }
    }

    #[test]
    fn test_autostart_without_password_commits_nothing() {
        let (backend, store) = store_with(&[("OVMS", "secret123")], "wifi.ap");
        let writes = backend.write_count();

        let err = save_wifi_table(
            &store,
            WifiTable::Ap,
            &WifiTableForm {
                rows: vec![row("OVMS", ""), row("Home", "")],
                autostart: Some(1),
            },
        )
        .unwrap_err();

        assert!(err.to_string().contains("Autostart SSID `Home` has no password"));
        assert_eq!(backend.write_count(), writes);
        let map = store.get_map("wifi.ap");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("OVMS").map(String::as_str), Some("secret123"));
        assert!(!store.is_defined("auto", "wifi.ssid.ap"));
    }

    #[test]
    fn test_empty_password_keeps_stored_and_omission_deletes() {
        let (_, store) = store_with(&[("Home", "pw123456"), ("Old", "oldpass1")], "wifi.ssid");
        let outcome = save_wifi_table(
            &store,
            WifiTable::Client,
            &WifiTableForm {
                rows: vec![row("Home", ""), row("Cafe", "")],
                autostart: Some(0),
            },
        )
        .unwrap();

        assert_eq!(outcome.warnings, vec!["SSID `Cafe` has no password"]);
        let map = store.get_map("wifi.ssid");
        assert_eq!(map.get("Home").map(String::as_str), Some("pw123456"));
        assert_eq!(map.get("Cafe").map(String::as_str), Some(""));
        assert!(!map.contains_key("Old"));
        assert_eq!(load_wifi_table(&store, WifiTable::Client).autostart, "Home");
    }

    #[test]
    fn test_short_ap_password_and_empty_autostart() {
        let (_, store) = store_with(&[], "wifi.ap");
        let err = save_wifi_table(
            &store,
            WifiTable::Ap,
            &WifiTableForm {
                rows: vec![row("", ""), row("OVMS", "short")],
                autostart: Some(0),
            },
        )
        .unwrap_err();
        match err {
            CfgError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(load_wifi_table(&store, WifiTable::Ap).autostart, "OVMS");
    }

    #[test]
    fn test_duplicate_ssid_reported() {
        let (_, store) = store_with(&[], "wifi.ssid");
        let outcome = save_wifi_table(
            &store,
            WifiTable::Client,
            &WifiTableForm {
                rows: vec![row("Home", "first123"), row("Home", "second12")],
                autostart: None,
            },
        )
        .unwrap();

        assert_eq!(
            outcome.warnings,
            vec!["SSID `Home` listed more than once; the last row wins"]
        );
        let map = store.get_map("wifi.ssid");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("Home").map(String::as_str), Some("second12"));
    }
}
