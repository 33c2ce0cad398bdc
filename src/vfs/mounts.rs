//! Mount table mapping logical device paths onto host directories.
//!
//! # Responsibilities
//! - Resolve `/store/...`, `/sd/...` style paths to host paths
//! - Basic file primitives: read, atomic write, remove, list, mkdir
//! - Recursive file enumeration for backups

use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::schema::StorageConfig;
use crate::store::backend::write_atomic;
use crate::store::error::{StorageError, StorageResult};
use crate::vfs::path::{is_within, normalize};

/// One mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Normalised logical prefix, e.g. `/store`.
    pub prefix: String,
    pub host: PathBuf,
}

impl Mount {
    pub fn new(prefix: &str, host: impl Into<PathBuf>) -> Self {
        Self {
            prefix: normalize(prefix),
            host: host.into(),
        }
    }
}

/// Directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// Filesystem rooted at a small set of mount points.
#[derive(Debug, Clone)]
pub struct Vfs {
    mounts: Vec<Mount>,
}

impl Vfs {
    pub fn new(mut mounts: Vec<Mount>) -> Self {
        // longest prefix wins
        mounts.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { mounts }
    }

    pub fn from_config(storage: &StorageConfig) -> Self {
        Self::new(
            storage
                .mounts
                .iter()
                .map(|m| Mount::new(&m.prefix, &m.host_path))
                .collect(),
        )
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// Host path for a logical path.
    pub fn resolve(&self, logical: &str) -> StorageResult<PathBuf> {
        let path = normalize(logical);
        for mount in &self.mounts {
            if !is_within(&path, &mount.prefix) {
                continue;
            }
            let rest = path[mount.prefix.len()..].trim_start_matches('/');
            return Ok(if rest.is_empty() {
                mount.host.clone()
            } else {
                mount.host.join(rest)
            });
        }
        Err(StorageError::Unmounted(path))
    }

    pub fn exists(&self, logical: &str) -> bool {
        self.resolve(logical).map(|p| p.exists()).unwrap_or(false)
    }

    /// File content, `None` if the file does not exist.
    pub fn read(&self, logical: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.resolve(logical)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    /// Replace a file's content atomically, creating parent directories.
    pub fn write_atomic(&self, logical: &str, bytes: &[u8]) -> StorageResult<()> {
        let path = self.resolve(logical)?;
        write_atomic(&path, bytes)
    }

    /// Delete a file. `Ok(false)` if there was nothing to delete.
    pub fn remove(&self, logical: &str) -> StorageResult<bool> {
        let path = self.resolve(logical)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    pub fn create_dir_all(&self, logical: &str) -> StorageResult<()> {
        let path = self.resolve(logical)?;
        fs::create_dir_all(&path).map_err(|e| StorageError::io(path, e))
    }

    /// Rename within the mount table; both paths must resolve to the same volume.
    pub fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        fs::rename(&source, &target).map_err(|e| StorageError::io(source, e))
    }

    /// Delete a directory tree. `Ok(false)` if it did not exist.
    pub fn remove_dir_all(&self, logical: &str) -> StorageResult<bool> {
        let path = self.resolve(logical)?;
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    /// Entries of a directory, sorted by name.
    pub fn list(&self, logical: &str) -> StorageResult<Vec<DirEntry>> {
        let path = self.resolve(logical)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&path).map_err(|e| StorageError::io(&path, e))? {
            let entry = entry.map_err(|e| StorageError::io(&path, e))?;
            let meta = entry
                .metadata()
                .map_err(|e| StorageError::io(entry.path(), e))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: meta.is_dir(),
                size: if meta.is_dir() { 0 } else { meta.len() },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Logical paths of every regular file below `logical`, sorted.
    ///
    /// Dot-files are temp/staging artefacts and are skipped. A missing
    /// directory yields an empty list.
    pub fn walk_files(&self, logical: &str) -> StorageResult<Vec<String>> {
        let root = normalize(logical);
        let host = self.resolve(&root)?;
        let mut files = Vec::new();
        if host.is_dir() {
            collect_files(&host, &root, &mut files)?;
        }
        files.sort();
        Ok(files)
    }
}

fn collect_files(dir: &std::path::Path, logical: &str, out: &mut Vec<String>) -> StorageResult<()> {
    for entry in fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))? {
        let entry = entry.map_err(|e| StorageError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let child = format!("{}/{}", logical.trim_end_matches('/'), name);
        let file_type = entry
            .file_type()
            .map_err(|e| StorageError::io(entry.path(), e))?;
        if file_type.is_dir() {
            collect_files(&entry.path(), &child, out)?;
        } else if file_type.is_file() {
            out.push(child);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vfs(root: &std::path::Path) -> Vfs {
        Vfs::new(vec![
            Mount::new("/store", root.join("store")),
            Mount::new("/sd", root.join("sd")),
        ])
    }

    #[test]
    fn test_resolve() {
        let tmp = tempfile::tempdir().unwrap();
        let v = vfs(tmp.path());
        assert_eq!(v.resolve("/store").unwrap(), tmp.path().join("store"));
        assert_eq!(
            v.resolve("/store/plugin/foo").unwrap(),
            tmp.path().join("store").join("plugin/foo")
        );
        assert!(matches!(v.resolve("/etc/passwd"), Err(StorageError::Unmounted(_))));
        assert!(matches!(v.resolve("/storex/a"), Err(StorageError::Unmounted(_))));
        // traversal cannot leave the mount table
        assert!(matches!(
            v.resolve("/store/../../etc/passwd"),
            Err(StorageError::Unmounted(_))
        ));
    }

    #[test]
    fn test_write_read_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let v = vfs(tmp.path());
        assert_eq!(v.read("/store/plugin/foo").unwrap(), None);
        v.write_atomic("/store/plugin/foo", b"<p>hi</p>").unwrap();
        assert_eq!(v.read("/store/plugin/foo").unwrap(), Some(b"<p>hi</p>".to_vec()));
        assert!(v.exists("/store/plugin/foo"));
        assert!(v.remove("/store/plugin/foo").unwrap());
        assert!(!v.remove("/store/plugin/foo").unwrap());
    }

    #[test]
    fn test_walk_and_list() {
        let tmp = tempfile::tempdir().unwrap();
        let v = vfs(tmp.path());
        v.write_atomic("/store/events/vehicle.on/10-lights", b"a").unwrap();
        v.write_atomic("/store/scripts/ovmsmain.js", b"b").unwrap();
        v.create_dir_all("/store/events/empty").unwrap();

        assert_eq!(
            v.walk_files("/store/events").unwrap(),
            vec!["/store/events/vehicle.on/10-lights"]
        );
        assert!(v.walk_files("/store/missing").unwrap().is_empty());

        let names: Vec<_> = v
            .list("/store")
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.is_dir))
            .collect();
        assert_eq!(
            names,
            vec![("events".to_string(), true), ("scripts".to_string(), true)]
        );
    }
}
