//! Plugin registration lifecycle against the file-backed store.

use cfgstore::error::CfgError;
use cfgstore::plugins::{PluginEdit, PluginKind, PluginRow, PluginType, RowMode, PLUGIN_NAMESPACE};

mod common;

fn row(key: &str, mode: RowMode, kind: PluginType, enabled: bool) -> PluginRow {
    PluginRow {
        key: key.into(),
        mode,
        kind,
        enabled,
    }
}

#[test]
fn test_full_lifecycle_keeps_content_invariant() {
    let f = common::file_fixture();
    let plugins = &f.state.plugins;

    // absent -> add
    plugins
        .reconcile_list(&[
            row("dash", RowMode::Add, PluginType::Page, true),
            row("footer", RowMode::Add, PluginType::Hook, false),
        ])
        .unwrap();
    assert!(f.host("/store/plugin/dash").is_file());
    assert!(f.host("/store/plugin/footer").is_file());

    // editor save
    plugins
        .update_plugin(
            "dash",
            &PluginEdit {
                page: "/usr/dash".into(),
                kind: PluginKind::Page {
                    label: "Dashboard".into(),
                    menu: "Main".into(),
                    auth: "cookie".into(),
                },
                content: "<div>dash</div>\r\n".into(),
            },
        )
        .unwrap();

    // edit keeps attributes and content, omission removes footer
    let outcome = plugins
        .reconcile_list(&[row("dash", RowMode::Edit, PluginType::Page, false)])
        .unwrap();
    assert_eq!(outcome.removed, vec!["footer"]);
    assert!(!f.host("/store/plugin/footer").exists());
    assert_eq!(
        std::fs::read_to_string(f.host("/store/plugin/dash")).unwrap(),
        "<div>dash</div>\n"
    );

    // a fresh process sees the same registry
    let reopened = common::reopen(&f);
    let descriptors = reopened.plugins.list_descriptors();
    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].key, "dash");
    assert!(!descriptors[0].enabled);
    assert_eq!(descriptors[0].page, "/usr/dash");
    assert!(matches!(
        &descriptors[0].kind,
        PluginKind::Page { label, .. } if label == "Dashboard"
    ));

    let map = reopened.store.get_map(PLUGIN_NAMESPACE);
    assert_eq!(map.get("dash.enable").map(String::as_str), Some("no"));
    assert!(!map.keys().any(|k| k.starts_with("footer.")));
}

#[test]
fn test_rejected_submission_changes_nothing() {
    let f = common::file_fixture();
    f.state
        .plugins
        .reconcile_list(&[row("keep", RowMode::Add, PluginType::Page, true)])
        .unwrap();
    let before = f.state.store.get_map(PLUGIN_NAMESPACE);

    let err = f
        .state
        .plugins
        .reconcile_list(&[
            row("new", RowMode::Add, PluginType::Page, true),
            row("new", RowMode::Add, PluginType::Hook, true),
        ])
        .unwrap_err();
    assert!(matches!(err, CfgError::Validation(_)));
    assert_eq!(f.state.store.get_map(PLUGIN_NAMESPACE), before);
    assert!(f.host("/store/plugin/keep").is_file());
    assert!(!f.host("/store/plugin/new").exists());
}

#[test]
fn test_concurrent_reconcile_and_content_writes() {
    let f = common::file_fixture();
    let rows: Vec<PluginRow> = (0..4)
        .map(|i| row(&format!("p{}", i), RowMode::Add, PluginType::Page, true))
        .collect();
    f.state.plugins.reconcile_list(&rows).unwrap();

    std::thread::scope(|s| {
        for i in 0..4 {
            let plugins = &f.state.plugins;
            s.spawn(move || {
                for n in 0..20 {
                    plugins
                        .save_content(&format!("p{}", i), format!("v{}", n).as_bytes())
                        .unwrap();
                }
            });
        }
        let plugins = &f.state.plugins;
        let rows = &rows;
        s.spawn(move || {
            for _ in 0..10 {
                let edits: Vec<PluginRow> = rows
                    .iter()
                    .map(|r| PluginRow {
                        mode: RowMode::Edit,
                        ..r.clone()
                    })
                    .collect();
                plugins.reconcile_list(&edits).unwrap();
            }
        });
    });

    for i in 0..4 {
        assert_eq!(
            std::fs::read_to_string(f.host(&format!("/store/plugin/p{}", i))).unwrap(),
            "v19"
        );
    }
    assert_eq!(f.state.plugins.list_descriptors().len(), 4);
}
