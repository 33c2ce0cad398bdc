//! Backup and restore against the file-backed store.

use cfgstore::backup::ArchiveError;
use cfgstore::error::CfgError;
use cfgstore::plugins::{PluginRow, PluginType, RowMode};
use cfgstore::store::{StorageError, StorePhase};

mod common;

#[test]
fn test_restore_round_trip_across_restart() {
    let f = common::file_fixture();
    let state = &f.state;
    state.store.set_value("vehicle", "id", "DEMO").unwrap();
    state.store.set_value("password", "module", "modpass1").unwrap();
    state
        .plugins
        .reconcile_list(&[PluginRow {
            key: "dash".into(),
            mode: RowMode::Add,
            kind: PluginType::Page,
            enabled: true,
        }])
        .unwrap();
    state.plugins.save_content("dash", b"<p>v1</p>").unwrap();
    state.editor.write("/store/scripts/ovmsmain.js", b"v1").unwrap();
    state.editor.write("/store/notes/mine.txt", b"user data").unwrap();

    let summary = state.archiver.create_backup("/sd/backup/full.bak", "").unwrap();
    assert_eq!(summary.files, 2);

    // diverge
    state.store.set_value("vehicle", "id", "OTHER").unwrap();
    state.store.set_value("server.v2", "server", "x").unwrap();
    state.plugins.save_content("dash", b"<p>v2</p>").unwrap();
    state.editor.write("/store/scripts/extra.js", b"x").unwrap();
    state.editor.write("/store/notes/mine.txt", b"changed").unwrap();

    let restored = state
        .archiver
        .restore_backup("/sd/backup/full.bak", "modpass1")
        .unwrap();
    assert!(restored.restart_requested);
    assert_eq!(f.restarter.count(), 1);
    assert_eq!(state.store.phase(), StorePhase::RestartPending);
    assert!(matches!(
        state.store.set_value("vehicle", "id", "late"),
        Err(StorageError::RestartPending)
    ));

    let fresh = common::reopen(&f);
    assert_eq!(fresh.store.get_value("vehicle", "id", ""), "DEMO");
    assert!(!fresh.store.is_defined("server.v2", "server"));
    assert_eq!(
        std::fs::read(f.host("/store/plugin/dash")).unwrap(),
        b"<p>v1</p>"
    );
    assert!(!f.host("/store/scripts/extra.js").exists());
    // user storage is not part of the archive
    assert_eq!(
        std::fs::read(f.host("/store/notes/mine.txt")).unwrap(),
        b"changed"
    );

    // no staging or retired directories left behind
    let leftovers: Vec<_> = std::fs::read_dir(f.host("/store"))
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.contains(".restore-") || n.contains(".old-") || n.starts_with('.'))
        .collect();
    assert!(leftovers.is_empty(), "leftovers: {:?}", leftovers);
}

#[test]
fn test_tampered_archive_leaves_live_state() {
    let f = common::file_fixture();
    f.state.store.set_value("vehicle", "id", "DEMO").unwrap();
    f.state.archiver.create_backup("/sd/a.bak", "pw").unwrap();
    f.state.store.set_value("vehicle", "id", "LIVE").unwrap();

    let path = f.host("/sd/a.bak");
    let mut bytes = std::fs::read(&path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xff;
    std::fs::write(&path, bytes).unwrap();

    let err = f.state.archiver.restore_backup("/sd/a.bak", "pw").unwrap_err();
    assert!(matches!(err, CfgError::Archive(ArchiveError::Authentication)));
    assert_eq!(f.state.store.get_value("vehicle", "id", ""), "LIVE");
    assert_eq!(f.state.store.phase(), StorePhase::Live);
    assert_eq!(f.restarter.count(), 0);
    f.state.store.set_value("vehicle", "id", "STILL_WRITABLE").unwrap();
}

#[test]
fn test_missing_archive_and_protected_paths() {
    let f = common::file_fixture();
    assert!(matches!(
        f.state.archiver.restore_backup("/sd/none.bak", "pw"),
        Err(CfgError::Validation(_))
    ));
    assert!(matches!(
        f.state
            .archiver
            .create_backup("/store/ovms_config/../ovms_config/x", "pw"),
        Err(CfgError::ProtectedPath)
    ));
}

#[test]
fn test_content_writes_racing_a_restore() {
    let f = common::file_fixture();
    let state = &f.state;
    state
        .plugins
        .reconcile_list(&[PluginRow {
            key: "dash".into(),
            mode: RowMode::Add,
            kind: PluginType::Page,
            enabled: true,
        }])
        .unwrap();
    state.plugins.save_content("dash", b"archived").unwrap();
    state.archiver.create_backup("/sd/race.bak", "pw").unwrap();

    let done = std::sync::atomic::AtomicBool::new(false);
    std::thread::scope(|s| {
        let plugins = &state.plugins;
        let done = &done;
        let writer = s.spawn(move || {
            let mut n = 0u32;
            while !done.load(std::sync::atomic::Ordering::SeqCst) {
                match plugins.save_content("dash", format!("live {}", n).as_bytes()) {
                    Ok(()) => n += 1,
                    Err(CfgError::Storage(StorageError::RestartPending)) => break,
                    Err(e) => panic!("unexpected {:?}", e),
                }
            }
        });

        state.archiver.restore_backup("/sd/race.bak", "pw").unwrap();
        done.store(true, std::sync::atomic::Ordering::SeqCst);
        writer.join().unwrap();
    });

    assert_eq!(
        std::fs::read(f.host("/store/plugin/dash")).unwrap(),
        b"archived"
    );
    let leftovers: Vec<_> = std::fs::read_dir(f.host("/store"))
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.contains(".restore-") || n.contains(".old-"))
        .collect();
    assert!(leftovers.is_empty(), "leftovers: {:?}", leftovers);
}
