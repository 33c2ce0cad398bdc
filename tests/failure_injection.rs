//! Failure injection: persistence faults must leave the committed state in place.

use std::sync::Arc;

use cfgstore::error::CfgError;
use cfgstore::events::EventBus;
use cfgstore::forms::{save_wifi_table, WifiRow, WifiTable, WifiTableForm};
use cfgstore::plugins::{PluginRow, PluginType, RowMode, PLUGIN_NAMESPACE};
use cfgstore::store::{MemoryBackend, ParamMap, ParamStore, StorageError};

mod common;

fn map(pairs: &[(&str, &str)]) -> ParamMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_failed_write_keeps_cache_and_backend() {
    let backend = Arc::new(MemoryBackend::new());
    let store = ParamStore::new(backend.clone(), EventBus::new());
    store.set_map("vehicle", map(&[("id", "DEMO")])).unwrap();

    let before = store.snapshot("vehicle");
    backend.fail_writes(true);
    let err = store
        .set_map("vehicle", map(&[("id", "NEW"), ("type", "RT")]))
        .unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(_)));
    assert!(store.set_value("vehicle", "id", "NEW").is_err());

    assert_eq!(store.get_map("vehicle"), *before);
    assert_eq!(backend.dump().get("vehicle"), Some(&map(&[("id", "DEMO")])));

    backend.fail_writes(false);
    store.set_value("vehicle", "id", "NEW").unwrap();
    assert_eq!(store.get_value("vehicle", "id", ""), "NEW");
}

#[test]
fn test_plugin_commit_failure_is_clean() {
    let (f, backend) = common::memory_fixture();
    let plugins = &f.state.plugins;
    plugins
        .reconcile_list(&[PluginRow {
            key: "old".into(),
            mode: RowMode::Add,
            kind: PluginType::Page,
            enabled: true,
        }])
        .unwrap();
    let before = f.state.store.get_map(PLUGIN_NAMESPACE);

    backend.fail_writes(true);
    let err = plugins
        .reconcile_list(&[PluginRow {
            key: "fresh".into(),
            mode: RowMode::Add,
            kind: PluginType::Hook,
            enabled: true,
        }])
        .unwrap_err();
    assert!(matches!(err, CfgError::Storage(_)));

    // the removal of `old` was never committed, so its content stays
    assert!(f.host("/store/plugin/old").is_file());
    assert!(!f.host("/store/plugin/fresh").exists());
    assert_eq!(f.state.store.get_map(PLUGIN_NAMESPACE), before);
}

#[test]
fn test_form_rejection_and_failure_keep_previous_table() {
    let (f, backend) = common::memory_fixture();
    let store = &f.state.store;
    store
        .set_map("wifi.ap", map(&[("OVMS", "secret123")]))
        .unwrap();

    // access point passwords need at least 8 characters
    let too_short = WifiTableForm {
        rows: vec![WifiRow {
            ssid: "cafe".into(),
            password: "short".into(),
        }],
        autostart: None,
    };
    assert!(matches!(
        save_wifi_table(store, WifiTable::Ap, &too_short),
        Err(CfgError::Validation(_))
    ));
    assert_eq!(store.get_map("wifi.ap"), map(&[("OVMS", "secret123")]));

    // client networks accept any length but an autostart row needs a password
    let no_password = WifiTableForm {
        rows: vec![WifiRow {
            ssid: "home".into(),
            password: String::new(),
        }],
        autostart: Some(0),
    };
    assert!(matches!(
        save_wifi_table(store, WifiTable::Client, &no_password),
        Err(CfgError::Validation(_))
    ));
    assert!(store.get_map("wifi.ssid").is_empty());

    backend.fail_writes(true);
    let valid = WifiTableForm {
        rows: vec![WifiRow {
            ssid: "cafe".into(),
            password: "longenough".into(),
        }],
        autostart: Some(0),
    };
    assert!(matches!(
        save_wifi_table(store, WifiTable::Ap, &valid),
        Err(CfgError::Storage(_))
    ));
    assert_eq!(store.get_map("wifi.ap"), map(&[("OVMS", "secret123")]));
    assert!(!store.is_defined("auto", "wifi.ssid.ap"));
}

#[test]
fn test_failed_backup_write_leaves_store_writable() {
    let (f, _backend) = common::memory_fixture();
    f.state.store.set_value("vehicle", "id", "DEMO").unwrap();
    // a directory where the archive file should go
    std::fs::create_dir_all(f.host("/sd/taken.bak")).unwrap();

    assert!(f.state.archiver.create_backup("/sd/taken.bak", "pw").is_err());
    f.state.store.set_value("vehicle", "id", "AFTER").unwrap();
    assert_eq!(f.restarter.count(), 0);
}
