//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cfgstore::config::{MountConfig, ServiceConfig};
use cfgstore::http::AppState;
use cfgstore::lifecycle::RestartHandle;
use cfgstore::store::MemoryBackend;
use tempfile::TempDir;

pub const API_KEY: &str = "test-key";

/// Records restart requests instead of restarting.
#[derive(Default)]
pub struct RecordingRestarter {
    count: AtomicUsize,
}

impl RecordingRestarter {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl RestartHandle for RecordingRestarter {
    fn request_restart(&self, _reason: &str) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Fixture {
    pub tmp: TempDir,
    pub config: ServiceConfig,
    pub restarter: Arc<RecordingRestarter>,
    pub state: AppState,
}

impl Fixture {
    /// Host path of a logical `/store/...` or `/sd/...` path.
    pub fn host(&self, logical: &str) -> std::path::PathBuf {
        let (mount, rest) = logical
            .trim_start_matches('/')
            .split_once('/')
            .unwrap_or((logical.trim_start_matches('/'), ""));
        self.tmp.path().join(mount).join(rest)
    }
}

/// Service config with `/store` and `/sd` under `root` and cheap key derivation.
pub fn test_config(root: &Path) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.storage.mounts = vec![
        MountConfig {
            prefix: "/store".into(),
            host_path: root.join("store").to_string_lossy().into_owned(),
        },
        MountConfig {
            prefix: "/sd".into(),
            host_path: root.join("sd").to_string_lossy().into_owned(),
        },
    ];
    config.backup.kdf_memory_kib = 64;
    config.backup.kdf_iterations = 1;
    config.admin.api_key = API_KEY.into();
    config
}

/// State backed by an in-memory store.
pub fn memory_fixture() -> (Fixture, Arc<MemoryBackend>) {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let backend = Arc::new(MemoryBackend::new());
    let restarter = Arc::new(RecordingRestarter::default());
    let state = AppState::new(config.clone(), backend.clone(), restarter.clone());
    (
        Fixture {
            tmp,
            config,
            restarter,
            state,
        },
        backend,
    )
}

/// State backed by JSON files in `/store/ovms_config`.
pub fn file_fixture() -> Fixture {
    let tmp = tempfile::tempdir().unwrap();
    let config = test_config(tmp.path());
    let restarter = Arc::new(RecordingRestarter::default());
    let state = AppState::with_file_backend(config.clone(), restarter.clone()).unwrap();
    Fixture {
        tmp,
        config,
        restarter,
        state,
    }
}

/// Reopen the same directories as a freshly started process would.
pub fn reopen(fixture: &Fixture) -> AppState {
    AppState::with_file_backend(
        fixture.config.clone(),
        Arc::new(RecordingRestarter::default()),
    )
    .unwrap()
}
