//! Protected-path policy.
//!
//! Pure predicate over logical paths. Every generic file browser/editor asks
//! it before touching a path and rejects with [`CfgError::ProtectedPath`],
//! which says nothing about whether the path exists.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::{ProtectionConfig, StorageConfig};
use crate::error::{CfgError, CfgResult};
use crate::vfs::path::{is_within, normalize};

/// Policy shared between request handlers and swapped on config reload.
pub type SharedPolicy = Arc<ArcSwap<ProtectedPathPolicy>>;

/// Denies the configuration storage area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedPathPolicy {
    /// Normalised, lower-cased roots; the root itself and everything below is denied.
    roots: Vec<String>,
    /// Lower-cased path components denied wherever they appear.
    components: Vec<String>,
}

impl ProtectedPathPolicy {
    /// Protect `config_root` and everything under it.
    pub fn new(config_root: &str) -> Self {
        Self {
            roots: vec![normalize(config_root).to_ascii_lowercase()],
            components: Vec::new(),
        }
    }

    pub fn with_root(mut self, root: &str) -> Self {
        let root = normalize(root).to_ascii_lowercase();
        if !self.roots.contains(&root) {
            self.roots.push(root);
        }
        self
    }

    /// Deny any path containing `name` as a component (e.g. an embedded config store).
    pub fn with_component(mut self, name: &str) -> Self {
        let name = name.trim_matches('/').to_ascii_lowercase();
        if !name.is_empty() && !self.components.contains(&name) {
            self.components.push(name);
        }
        self
    }

    pub fn from_config(storage: &StorageConfig, protection: &ProtectionConfig) -> Self {
        let mut policy = Self::new(&storage.config_dir);
        for root in &protection.protected_roots {
            policy = policy.with_root(root);
        }
        for name in &protection.protected_names {
            policy = policy.with_component(name);
        }
        policy
    }

    pub fn shared(self) -> SharedPolicy {
        Arc::new(ArcSwap::from_pointee(self))
    }

    /// True if `path` must not be opened by generic file access.
    ///
    /// Comparison is case-insensitive: the storage media are FAT formatted.
    pub fn is_protected(&self, path: &str) -> bool {
        let path = normalize(path).to_ascii_lowercase();
        if self.roots.iter().any(|root| is_within(&path, root)) {
            return true;
        }
        path.split('/')
            .any(|part| self.components.iter().any(|name| name == part))
    }

    /// True if serving `dir` recursively would reach a protected root.
    pub fn exposes(&self, dir: &str) -> bool {
        let dir = normalize(dir).to_ascii_lowercase();
        self.is_protected(&dir) || self.roots.iter().any(|root| is_within(root, &dir))
    }

    /// `Err(ProtectedPath)` for protected paths.
    pub fn check(&self, path: &str) -> CfgResult<()> {
        if self.is_protected(path) {
            tracing::warn!(path = %path, "Rejected access to protected path");
            Err(CfgError::ProtectedPath)
        } else {
            Ok(())
        }
    }
}
