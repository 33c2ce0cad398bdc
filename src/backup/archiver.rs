//! Backup creation and restore.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use crate::backup::archive::{self, ArchiveError, FileEntry, KdfParams, Snapshot};
use crate::error::{CfgError, CfgResult, FieldError};
use crate::events::{EventBus, StoreEvent};
use crate::forms;
use crate::lifecycle::RestartHandle;
use crate::observability::metrics;
use crate::store::{validate_namespace, ParamStore};
use crate::vfs::path::{is_within, normalize};
use crate::vfs::{SharedPolicy, Vfs};

/// What a backup wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupSummary {
    pub path: String,
    pub namespaces: usize,
    pub files: usize,
    pub bytes: usize,
}

/// What a restore installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub namespaces: usize,
    pub files: usize,
    /// Unix time the archive was created.
    pub created_at: u64,
    pub restart_requested: bool,
}

/// Creates and restores encrypted configuration archives.
pub struct BackupArchiver {
    store: Arc<ParamStore>,
    vfs: Arc<Vfs>,
    policy: SharedPolicy,
    include_dirs: Vec<String>,
    events: EventBus,
    restarter: Arc<dyn RestartHandle>,
    kdf: KdfParams,
}

impl BackupArchiver {
    pub fn new(
        store: Arc<ParamStore>,
        vfs: Arc<Vfs>,
        policy: SharedPolicy,
        include_dirs: Vec<String>,
        events: EventBus,
        restarter: Arc<dyn RestartHandle>,
    ) -> Self {
        Self {
            store,
            vfs,
            policy,
            include_dirs: include_dirs.iter().map(|d| normalize(d)).collect(),
            events,
            restarter,
            kdf: KdfParams::default(),
        }
    }

    /// Override the key derivation cost (tests use cheap parameters).
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn include_dirs(&self) -> &[String] {
        &self.include_dirs
    }

    /// Seal all persisted namespaces and the script trees into `target`.
    ///
    /// An empty password selects the module password. An existing archive
    /// at `target` is replaced.
    pub fn create_backup(&self, target: &str, password: &str) -> CfgResult<BackupSummary> {
        let start = Instant::now();
        let result = self.create_inner(target, password);
        metrics::record_archive("backup", result.is_ok(), start);
        match &result {
            Ok(summary) => tracing::info!(
                path = %summary.path,
                namespaces = summary.namespaces,
                files = summary.files,
                bytes = summary.bytes,
                "Backup created"
            ),
            Err(e) => tracing::error!(path = %target, error = %e, "Backup failed"),
        }
        result
    }

    fn create_inner(&self, target: &str, password: &str) -> CfgResult<BackupSummary> {
        self.policy.load().check(target)?;
        let target = checked_file_path(target)?;
        let password = self.resolve_password(password)?;

        let snapshot = {
            let maintenance = self.store.maintenance()?;
            let namespaces = maintenance.snapshot_all()?;
            let mut files = Vec::new();
            for dir in &self.include_dirs {
                for path in self.vfs.walk_files(dir)? {
                    if path == target {
                        continue;
                    }
                    if let Some(contents) = self.vfs.read(&path)? {
                        files.push(FileEntry { path, contents });
                    }
                }
            }
            Snapshot::new(namespaces, files)
        };

        let bytes = archive::seal(&snapshot, &password, self.kdf)?;
        if let Some((parent, _)) = target.rsplit_once('/') {
            if !parent.is_empty() {
                self.vfs.create_dir_all(parent)?;
            }
        }
        self.vfs.write_atomic(&target, &bytes)?;
        self.events.emit(StoreEvent::FileChanged(target.clone()));

        Ok(BackupSummary {
            path: target,
            namespaces: snapshot.namespaces.len(),
            files: snapshot.files.len(),
            bytes: bytes.len(),
        })
    }

    /// Replace all namespaces and script trees with the archive content.
    ///
    /// The archive is fully decrypted and validated before anything live is
    /// touched. On success the store refuses further writes and a restart is
    /// requested.
    pub fn restore_backup(&self, source: &str, password: &str) -> CfgResult<RestoreSummary> {
        let start = Instant::now();
        let result = self.restore_inner(source, password);
        metrics::record_archive("restore", result.is_ok(), start);
        match &result {
            Ok(summary) => tracing::warn!(
                path = %source,
                namespaces = summary.namespaces,
                files = summary.files,
                "Backup restored"
            ),
            Err(e) => tracing::error!(path = %source, error = %e, "Restore failed, live state untouched"),
        }
        result
    }

    fn restore_inner(&self, source: &str, password: &str) -> CfgResult<RestoreSummary> {
        self.policy.load().check(source)?;
        let source = checked_file_path(source)?;
        let password = self.resolve_password(password)?;

        let bytes = self
            .vfs
            .read(&source)?
            .ok_or_else(|| FieldError::on("path", format!("archive `{}` not found", source)))?;
        let snapshot = archive::open(&bytes, &password)?;
        self.validate_snapshot(&snapshot)?;

        let staged = self.stage(&snapshot)?;

        let maintenance = match self.store.maintenance() {
            Ok(m) => m,
            Err(e) => {
                self.discard(&staged);
                return Err(e.into());
            }
        };

        let swapped = match self.swap_in(&staged) {
            Ok(swapped) => swapped,
            Err(e) => {
                self.discard(&staged);
                return Err(e);
            }
        };
        if let Err(e) = maintenance.install(&snapshot.namespaces) {
            self.roll_back(&swapped);
            self.discard(&staged);
            return Err(e.into());
        }
        for swap in &swapped {
            if let Some(old) = &swap.old {
                if let Err(e) = self.vfs.remove_dir_all(old) {
                    tracing::warn!(path = %old, error = %e, "Failed to remove replaced directory");
                }
            }
        }

        maintenance.seal_for_restart();
        drop(maintenance);

        self.events.emit(StoreEvent::RestoreCompleted);
        self.restarter.request_restart("configuration restored");

        Ok(RestoreSummary {
            namespaces: snapshot.namespaces.len(),
            files: snapshot.files.len(),
            created_at: snapshot.created_at,
            restart_requested: true,
        })
    }

    fn resolve_password(&self, password: &str) -> CfgResult<String> {
        if !password.is_empty() {
            return Ok(password.to_string());
        }
        let module = forms::module_password(&self.store);
        if module.is_empty() {
            return Err(FieldError::on(
                "password",
                "no password given and no module password set",
            )
            .into());
        }
        Ok(module)
    }

    /// Reject entries that would write outside the script trees.
    fn validate_snapshot(&self, snapshot: &Snapshot) -> CfgResult<()> {
        for namespace in snapshot.namespaces.keys() {
            if validate_namespace(namespace).is_err() {
                return Err(ArchiveError::UnsafeEntry(namespace.clone()).into());
            }
        }
        let policy = self.policy.load();
        for file in &snapshot.files {
            let path = normalize(&file.path);
            let contained = self
                .include_dirs
                .iter()
                .any(|dir| is_within(&path, dir) && &path != dir);
            let hidden = path.rsplit('/').any(|part| part.starts_with('.'));
            if path != file.path || !contained || hidden || policy.is_protected(&path) {
                return Err(ArchiveError::UnsafeEntry(file.path.clone()).into());
            }
        }
        Ok(())
    }

    /// Write every included tree next to its live directory.
    fn stage(&self, snapshot: &Snapshot) -> CfgResult<Vec<Staged>> {
        let tag = Uuid::new_v4().simple().to_string();
        let mut staged = Vec::new();
        for dir in &self.include_dirs {
            let dir_staged = Staged {
                live: dir.clone(),
                staged: format!("{}.restore-{}", dir, tag),
            };
            let result = (|| -> CfgResult<()> {
                self.vfs.create_dir_all(&dir_staged.staged)?;
                for file in snapshot.files.iter().filter(|f| is_within(&f.path, dir)) {
                    let rest = &file.path[dir.len()..];
                    self.vfs
                        .write_atomic(&format!("{}{}", dir_staged.staged, rest), &file.contents)?;
                }
                Ok(())
            })();
            staged.push(dir_staged);
            if let Err(e) = result {
                self.discard(&staged);
                return Err(e);
            }
        }
        tracing::debug!(dirs = staged.len(), "Restore staged");
        Ok(staged)
    }

    /// Move staged trees into place, keeping the replaced ones aside.
    fn swap_in(&self, staged: &[Staged]) -> CfgResult<Vec<Swapped>> {
        let mut swapped = Vec::new();
        for stage in staged {
            let result = (|| -> CfgResult<Swapped> {
                let old = if self.vfs.exists(&stage.live) {
                    let old = stage.staged.replacen(".restore-", ".old-", 1);
                    self.vfs.rename(&stage.live, &old)?;
                    Some(old)
                } else {
                    None
                };
                if let Err(e) = self.vfs.rename(&stage.staged, &stage.live) {
                    if let Some(old) = &old {
                        if let Err(back) = self.vfs.rename(old, &stage.live) {
                            tracing::error!(
                                path = %stage.live,
                                kept = %old,
                                error = %back,
                                "Failed to put directory back"
                            );
                        }
                    }
                    return Err(e.into());
                }
                Ok(Swapped {
                    live: stage.live.clone(),
                    old,
                })
            })();
            match result {
                Ok(s) => swapped.push(s),
                Err(e) => {
                    self.roll_back(&swapped);
                    return Err(e);
                }
            }
        }
        Ok(swapped)
    }

    /// Put the replaced trees back, newest first.
    fn roll_back(&self, swapped: &[Swapped]) {
        for swap in swapped.iter().rev() {
            let result = self.vfs.remove_dir_all(&swap.live).and_then(|_| match &swap.old {
                Some(old) => self.vfs.rename(old, &swap.live),
                None => Ok(()),
            });
            if let Err(e) = result {
                tracing::error!(path = %swap.live, error = %e, "Failed to roll back restored directory");
            }
        }
    }

    fn discard(&self, staged: &[Staged]) {
        for stage in staged {
            if let Err(e) = self.vfs.remove_dir_all(&stage.staged) {
                tracing::warn!(path = %stage.staged, error = %e, "Failed to remove staged directory");
            }
        }
    }
}

struct Staged {
    live: String,
    staged: String,
}

struct Swapped {
    live: String,
    old: Option<String>,
}

/// Absolute file path, normalised.
fn checked_file_path(path: &str) -> CfgResult<String> {
    if path.is_empty() || !path.starts_with('/') || path.ends_with('/') {
        return Err(CfgError::from(FieldError::on("path", "Missing or invalid path")));
    }
    Ok(normalize(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryBackend, StorePhase, StorageError};
    use crate::vfs::{Mount, ProtectedPathPolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRestarter(AtomicUsize);

    impl RestartHandle for CountingRestarter {
        fn request_restart(&self, _reason: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        store: Arc<ParamStore>,
        vfs: Arc<Vfs>,
        restarter: Arc<CountingRestarter>,
        archiver: BackupArchiver,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let events = EventBus::new();
        let store = Arc::new(ParamStore::new(Arc::new(MemoryBackend::new()), events.clone()));
        let vfs = Arc::new(Vfs::new(vec![
            Mount::new("/store", tmp.path().join("store")),
            Mount::new("/sd", tmp.path().join("sd")),
        ]));
        let restarter = Arc::new(CountingRestarter::default());
        let archiver = BackupArchiver::new(
            store.clone(),
            vfs.clone(),
            ProtectedPathPolicy::new("/store/ovms_config")
                .with_component("ovms_config")
                .shared(),
            vec!["/store/scripts".into(), "/store/plugin".into()],
            events,
            restarter.clone(),
        )
        .with_kdf(KdfParams {
            memory_kib: 64,
            iterations: 1,
        });
        Fixture {
            _tmp: tmp,
            store,
            vfs,
            restarter,
            archiver,
        }
    }

    #[test]
    fn test_backup_restore_cycle() {
        let f = fixture();
        f.store.set_value("vehicle", "id", "DEMO").unwrap();
        f.vfs.write_atomic("/store/scripts/ovmsmain.js", b"a").unwrap();
        f.vfs.write_atomic("/store/user/notes.txt", b"mine").unwrap();

        let summary = f.archiver.create_backup("/sd/backup/cfg.bak", "pw").unwrap();
        assert_eq!(summary.namespaces, 1);
        assert_eq!(summary.files, 1);

        f.store.set_value("vehicle", "id", "CHANGED").unwrap();
        f.store.set_value("extra", "k", "v").unwrap();
        f.vfs.write_atomic("/store/scripts/ovmsmain.js", b"b").unwrap();
        f.vfs.write_atomic("/store/scripts/new.js", b"n").unwrap();

        let restored = f.archiver.restore_backup("/sd/backup/cfg.bak", "pw").unwrap();
        assert!(restored.restart_requested);
        assert_eq!(f.restarter.0.load(Ordering::SeqCst), 1);
        assert_eq!(f.store.phase(), StorePhase::RestartPending);

        assert_eq!(f.store.get_value("vehicle", "id", ""), "DEMO");
        assert!(!f.store.is_defined("extra", "k"));
        assert_eq!(f.vfs.read("/store/scripts/ovmsmain.js").unwrap(), Some(b"a".to_vec()));
        assert!(!f.vfs.exists("/store/scripts/new.js"));
        assert_eq!(f.vfs.read("/store/user/notes.txt").unwrap(), Some(b"mine".to_vec()));
        assert!(matches!(
            f.store.set_value("vehicle", "id", "X"),
            Err(StorageError::RestartPending)
        ));
    }

    #[test]
    fn test_wrong_password_leaves_state() {
        let f = fixture();
        f.store.set_value("vehicle", "id", "DEMO").unwrap();
        f.archiver.create_backup("/sd/cfg.bak", "right").unwrap();
        f.store.set_value("vehicle", "id", "LIVE").unwrap();

        let err = f.archiver.restore_backup("/sd/cfg.bak", "wrong").unwrap_err();
        assert!(matches!(err, CfgError::Archive(ArchiveError::Authentication)));
        assert_eq!(f.store.get_value("vehicle", "id", ""), "LIVE");
        assert_eq!(f.store.phase(), StorePhase::Live);
        assert_eq!(f.restarter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_module_password_fallback() {
        let f = fixture();
        assert!(matches!(
            f.archiver.create_backup("/sd/cfg.bak", ""),
            Err(CfgError::Validation(_))
        ));
        f.store.set_value("password", "module", "modpass").unwrap();
        f.archiver.create_backup("/sd/cfg.bak", "").unwrap();
        f.archiver.restore_backup("/sd/cfg.bak", "modpass").unwrap();
    }

    #[test]
    fn test_protected_target_rejected() {
        let f = fixture();
        assert!(matches!(
            f.archiver.create_backup("/store/ovms_config/x.bak", "pw"),
            Err(CfgError::ProtectedPath)
        ));
        assert!(matches!(
            f.archiver.restore_backup("/store/ovms_config/x.bak", "pw"),
            Err(CfgError::ProtectedPath)
        ));
    }

    #[test]
    fn test_unsafe_entries_rejected_before_staging() {
        let f = fixture();
        let snapshot = Snapshot::new(
            Default::default(),
            vec![FileEntry {
                path: "/store/scripts/../ovms_config/password".into(),
                contents: b"x".to_vec(),
            }],
        );
        let bytes = archive::seal(&snapshot, "pw", f.archiver.kdf).unwrap();
        f.vfs.write_atomic("/sd/evil.bak", &bytes).unwrap();

        let err = f.archiver.restore_backup("/sd/evil.bak", "pw").unwrap_err();
        assert!(matches!(err, CfgError::Archive(ArchiveError::UnsafeEntry(_))));
        assert!(f.vfs.list("/store").map(|e| e.is_empty()).unwrap_or(true));
    }

    #[test]
    fn test_archive_inside_included_dir_is_skipped() {
        let f = fixture();
        f.vfs.write_atomic("/store/scripts/a.js", b"a").unwrap();
        f.archiver.create_backup("/store/scripts/self.bak", "pw").unwrap();
        let summary = f.archiver.create_backup("/store/scripts/self.bak", "pw").unwrap();
        assert_eq!(summary.files, 1);
    }
}
