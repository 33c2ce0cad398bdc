//! Durable persistence of namespace maps.
//!
//! # Responsibilities
//! - Load and store one namespace map as a unit
//! - Enumerate persisted namespaces
//! - Replace the whole persisted set in one step (restore)
//!
//! # Design Decisions
//! - One JSON file per namespace, named after the namespace
//! - Writes go to a temp file, are fsynced, then renamed over the target
//! - Dot-files in the configuration directory are temp/staging artefacts

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

use crate::store::error::{StorageError, StorageResult};

/// One namespace's instance → value map.
pub type ParamMap = BTreeMap<String, String>;

/// Every namespace map, keyed by namespace.
pub type NamespaceDump = BTreeMap<String, ParamMap>;

/// Key-value persistence keyed by (namespace, key), one map at a time.
pub trait ParamBackend: Send + Sync {
    /// Load a namespace. `None` if it was never persisted.
    fn load(&self, namespace: &str) -> StorageResult<Option<ParamMap>>;

    /// Durably replace a namespace map.
    fn store(&self, namespace: &str, map: &ParamMap) -> StorageResult<()>;

    /// Names of all persisted namespaces.
    fn namespaces(&self) -> StorageResult<Vec<String>>;

    /// Replace the entire persisted set; namespaces missing from `dump` are dropped.
    fn replace_all(&self, dump: &NamespaceDump) -> StorageResult<()>;
}

/// Namespace files under a single configuration directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, namespace: &str) -> PathBuf {
        self.dir.join(namespace)
    }

    /// Sibling path of the configuration directory used for staging/swapping.
    fn sibling(&self, tag: &str) -> PathBuf {
        let name = self
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config".to_string());
        self.dir
            .with_file_name(format!(".{}.{}-{}", name, tag, Uuid::new_v4().simple()))
    }
}

impl ParamBackend for FileBackend {
    fn load(&self, namespace: &str) -> StorageResult<Option<ParamMap>> {
        let path = self.path_of(namespace);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(path, e)),
        };
        let map = serde_json::from_slice(&bytes).map_err(|source| StorageError::Decode {
            namespace: namespace.to_string(),
            source,
        })?;
        Ok(Some(map))
    }

    fn store(&self, namespace: &str, map: &ParamMap) -> StorageResult<()> {
        let bytes = encode(namespace, map)?;
        write_atomic(&self.path_of(namespace), &bytes)
    }

    fn namespaces(&self) -> StorageResult<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.dir, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry
                .file_type()
                .map_err(|e| StorageError::io(entry.path(), e))?;
            if file_type.is_file() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn replace_all(&self, dump: &NamespaceDump) -> StorageResult<()> {
        let staged = self.sibling("staged");
        fs::create_dir_all(&staged).map_err(|e| StorageError::io(&staged, e))?;

        let result = (|| -> StorageResult<()> {
            for (namespace, map) in dump {
                let path = staged.join(namespace);
                let bytes = encode(namespace, map)?;
                write_synced(&path, &bytes)?;
            }
            sync_dir(&staged);
            Ok(())
        })();
        if let Err(e) = result {
            let _ = fs::remove_dir_all(&staged);
            return Err(e);
        }

        let retired = self.sibling("old");
        let had_live = self.dir.exists();
        if had_live {
            if let Err(e) = fs::rename(&self.dir, &retired) {
                let _ = fs::remove_dir_all(&staged);
                return Err(StorageError::io(&self.dir, e));
            }
        }
        if let Err(e) = fs::rename(&staged, &self.dir) {
            if had_live {
                // put the previous set back
                let _ = fs::rename(&retired, &self.dir);
            }
            let _ = fs::remove_dir_all(&staged);
            return Err(StorageError::io(&self.dir, e));
        }
        if let Some(parent) = self.dir.parent() {
            sync_dir(parent);
        }

        if had_live {
            if let Err(e) = fs::remove_dir_all(&retired) {
                tracing::warn!(path = %retired.display(), error = %e, "Failed to remove retired configuration directory");
            }
        }
        Ok(())
    }
}

fn encode(namespace: &str, map: &ParamMap) -> StorageResult<Vec<u8>> {
    serde_json::to_vec_pretty(map).map_err(|source| StorageError::Encode {
        namespace: namespace.to_string(),
        source,
    })
}

fn write_synced(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let mut file = File::create(path).map_err(|e| StorageError::io(path, e))?;
    file.write_all(bytes).map_err(|e| StorageError::io(path, e))?;
    file.sync_all().map_err(|e| StorageError::io(path, e))
}

/// Best effort; not every platform can open a directory for syncing.
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

/// Write `bytes` to `path` so that readers see either the old or the new content.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StorageError::Unmounted(path.display().to_string()))?;
    fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.tmp-{}", file_name, Uuid::new_v4().simple()));

    if let Err(e) = write_synced(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(StorageError::io(path, e));
    }
    sync_dir(parent);
    Ok(())
}

/// In-memory backend with write fault injection.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    maps: Mutex<NamespaceDump>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing set of namespaces.
    pub fn with_dump(dump: NamespaceDump) -> Self {
        Self {
            maps: Mutex::new(dump),
            ..Self::default()
        }
    }

    /// Make every subsequent write fail until switched off again.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes (`store` and `replace_all`).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Copy of everything currently persisted.
    pub fn dump(&self) -> NamespaceDump {
        self.maps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("injected write failure".into()))
        } else {
            Ok(())
        }
    }
}

impl ParamBackend for MemoryBackend {
    fn load(&self, namespace: &str) -> StorageResult<Option<ParamMap>> {
        let maps = self.maps.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(maps.get(namespace).cloned())
    }

    fn store(&self, namespace: &str, map: &ParamMap) -> StorageResult<()> {
        self.check_writable()?;
        let mut maps = self.maps.lock().unwrap_or_else(PoisonError::into_inner);
        maps.insert(namespace.to_string(), map.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn namespaces(&self) -> StorageResult<Vec<String>> {
        let maps = self.maps.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(maps.keys().cloned().collect())
    }

    fn replace_all(&self, dump: &NamespaceDump) -> StorageResult<()> {
        self.check_writable()?;
        let mut maps = self.maps.lock().unwrap_or_else(PoisonError::into_inner);
        *maps = dump.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
