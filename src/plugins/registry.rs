//! Plugin registration and content management.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use serde::Serialize;

use crate::error::{CfgError, CfgResult, FieldError, ValidationErrors};
use crate::events::{EventBus, StoreEvent};
use crate::observability::metrics;
use crate::plugins::descriptor::{
    enable_key, is_valid_key, PluginDescriptor, PluginEdit, PluginRow, PLUGIN_NAMESPACE,
};
use crate::store::{ParamMap, ParamStore, WriteGate};
use crate::vfs::path::strip_cr;
use crate::vfs::{SharedPolicy, Vfs};

/// Result of a successful list submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    /// Keys registered after the commit.
    pub registered: Vec<String>,
    /// Keys whose registration was dropped.
    pub removed: Vec<String>,
    /// Removed keys whose content file could not be deleted.
    pub orphaned: Vec<String>,
}

/// Editor view of one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginView {
    #[serde(flatten)]
    pub descriptor: PluginDescriptor,
    pub content: String,
}

/// Registry of web plugins backed by `http.plugin` and the content directory.
///
/// Content files are only touched under a [`WriteGate`], so backup and
/// restore never see a half-written plugin tree.
pub struct PluginRegistry {
    store: Arc<ParamStore>,
    vfs: Arc<Vfs>,
    policy: SharedPolicy,
    events: EventBus,
    content_dir: String,
    /// Serializes list submissions.
    list_lock: Mutex<()>,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl PluginRegistry {
    pub fn new(
        store: Arc<ParamStore>,
        vfs: Arc<Vfs>,
        policy: SharedPolicy,
        events: EventBus,
        content_dir: impl Into<String>,
    ) -> Self {
        Self {
            store,
            vfs,
            policy,
            events,
            content_dir: content_dir.into().trim_end_matches('/').to_string(),
            list_lock: Mutex::new(()),
            key_locks: DashMap::new(),
        }
    }

    /// Logical path of a plugin's content file.
    pub fn content_path(&self, key: &str) -> String {
        format!("{}/{}", self.content_dir, key)
    }

    pub fn list_descriptors(&self) -> Vec<PluginDescriptor> {
        PluginDescriptor::from_map(&self.store.snapshot(PLUGIN_NAMESPACE))
    }

    /// Replace the registered plugin set with the submitted rows.
    ///
    /// Keys missing from `rows` are unregistered and their content deleted
    /// after the commit. New keys get an empty content file before the
    /// commit. On any error nothing is registered or removed.
    pub fn reconcile_list(&self, rows: &[PluginRow]) -> CfgResult<ReconcileOutcome> {
        if let Err(errors) = self.validate_rows(rows) {
            tracing::warn!(errors = %errors, "Plugin list rejected");
            metrics::record_reconcile("rejected", 0);
            return Err(errors.into());
        }

        let _list = lock(&self.list_lock);
        let persisted = self.store.snapshot(PLUGIN_NAMESPACE);
        let mut touched: BTreeSet<String> = rows.iter().map(|r| r.key.clone()).collect();
        touched.extend(PluginDescriptor::from_map(&persisted).into_iter().map(|d| d.key));
        let locks = self.locks_for(touched.iter());
        let _guards: Vec<MutexGuard<'_, ()>> = locks.iter().map(|l| lock(l)).collect();
        let gate = self.store.write_gate()?;

        let created = match self.create_missing_content(rows) {
            Ok(created) => created,
            Err(e) => {
                metrics::record_reconcile("error", 0);
                return Err(e);
            }
        };

        let mut removed = Vec::new();
        let commit = gate.replace_with(PLUGIN_NAMESPACE, |current| {
            let mut next = ParamMap::new();
            for row in rows {
                row.to_descriptor(current).apply_to(&mut next);
            }
            removed = PluginDescriptor::from_map(current)
                .into_iter()
                .map(|d| d.key)
                .filter(|key| !next.contains_key(&enable_key(key)))
                .collect();
            Ok::<_, CfgError>(next)
        });

        if let Err(e) = commit {
            tracing::error!(error = %e, "Plugin list commit failed");
            for path in created {
                if let Err(e) = self.vfs.remove(&path) {
                    tracing::warn!(path = %path, error = %e, "Failed to roll back plugin content");
                }
            }
            metrics::record_reconcile("error", 0);
            return Err(e);
        }

        let mut orphaned = Vec::new();
        for key in &removed {
            let path = self.content_path(key);
            match self.vfs.remove(&path) {
                Ok(_) => self.events.emit(StoreEvent::FileRemoved(path)),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to delete plugin content");
                    orphaned.push(key.clone());
                }
            }
        }

        let registered: Vec<String> = rows.iter().map(|r| r.key.clone()).collect();
        tracing::info!(
            registered = registered.len(),
            removed = removed.len(),
            orphaned = orphaned.len(),
            "Plugin list saved"
        );
        metrics::record_reconcile("ok", registered.len());
        Ok(ReconcileOutcome {
            registered,
            removed,
            orphaned,
        })
    }

    /// Replace the content file of a registered plugin.
    pub fn save_content(&self, key: &str, content: &[u8]) -> CfgResult<()> {
        self.check_key(key)?;
        let key_lock = self.key_lock(key);
        let _guard = lock(&key_lock);
        let gate = self.store.write_gate()?;
        self.ensure_registered(&gate, key)?;
        self.write_content(key, content)
    }

    /// Descriptor and content of a registered plugin.
    pub fn load_plugin(&self, key: &str) -> CfgResult<Option<PluginView>> {
        self.check_key(key)?;
        let Some(descriptor) = PluginDescriptor::find(&self.store.snapshot(PLUGIN_NAMESPACE), key)
        else {
            return Ok(None);
        };
        let content = self
            .vfs
            .read(&self.content_path(key))?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();
        Ok(Some(PluginView {
            descriptor,
            content,
        }))
    }

    /// Editor save: content first, then the attributes in one replace.
    ///
    /// The enable flag is left untouched; it belongs to the list.
    pub fn update_plugin(&self, key: &str, edit: &PluginEdit) -> CfgResult<PluginDescriptor> {
        self.check_key(key)?;
        let key_lock = self.key_lock(key);
        let _guard = lock(&key_lock);
        let gate = self.store.write_gate()?;
        self.ensure_registered(&gate, key)?;

        self.write_content(key, edit.content.as_bytes())?;

        let mut updated = None;
        gate.replace_with(PLUGIN_NAMESPACE, |current| {
            let mut descriptor = PluginDescriptor::find(current, key).ok_or_else(|| {
                CfgError::from(FieldError::on(
                    "key",
                    format!("plugin `{}` is not registered", key),
                ))
            })?;
            descriptor.page = edit.page.clone();
            descriptor.kind = edit.kind.clone();
            let mut next = current.clone();
            descriptor.apply_to(&mut next);
            updated = Some(descriptor);
            Ok::<_, CfgError>(next)
        })?;

        tracing::info!(key = %key, "Plugin updated");
        updated.ok_or_else(|| FieldError::on("key", "plugin update lost").into())
    }

    fn ensure_registered(&self, gate: &WriteGate<'_>, key: &str) -> CfgResult<()> {
        if gate.snapshot(PLUGIN_NAMESPACE)?.contains_key(&enable_key(key)) {
            Ok(())
        } else {
            Err(FieldError::on("key", format!("plugin `{}` is not registered", key)).into())
        }
    }

    fn write_content(&self, key: &str, content: &[u8]) -> CfgResult<()> {
        let path = self.content_path(key);
        self.vfs.create_dir_all(&self.content_dir)?;
        self.vfs.write_atomic(&path, &strip_cr(content))?;
        tracing::debug!(key = %key, path = %path, "Plugin content written");
        self.events.emit(StoreEvent::FileChanged(path));
        Ok(())
    }

    /// Empty content files for submitted keys that have none yet.
    fn create_missing_content(&self, rows: &[PluginRow]) -> CfgResult<Vec<String>> {
        let mut created = Vec::new();
        let missing: Vec<&PluginRow> = rows
            .iter()
            .filter(|row| !self.vfs.exists(&self.content_path(&row.key)))
            .collect();
        if missing.is_empty() {
            return Ok(created);
        }
        self.vfs.create_dir_all(&self.content_dir)?;
        for row in missing {
            let path = self.content_path(&row.key);
            if let Err(e) = self.vfs.write_atomic(&path, b"") {
                for path in &created {
                    let _ = self.vfs.remove(path);
                }
                return Err(e.into());
            }
            created.push(path);
        }
        Ok(created)
    }

    /// Key syntax, then the content path against the protected-path policy.
    fn key_error(&self, key: &str) -> Option<String> {
        if !is_valid_key(key) {
            Some(format!("invalid plugin key `{}`", key))
        } else if self.policy.load().is_protected(&self.content_path(key)) {
            Some(format!("plugin key `{}` names a protected path", key))
        } else {
            None
        }
    }

    fn check_key(&self, key: &str) -> CfgResult<()> {
        match self.key_error(key) {
            Some(message) => Err(FieldError::on("key", message).into()),
            None => Ok(()),
        }
    }

    /// All row errors at once: key syntax, protection and duplicates.
    fn validate_rows(&self, rows: &[PluginRow]) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut seen = HashSet::new();
        for (i, row) in rows.iter().enumerate() {
            let field = format!("rows[{}].key", i);
            if let Some(message) = self.key_error(&row.key) {
                errors.push(FieldError::on(field, message));
            } else if !seen.insert(row.key.as_str()) {
                errors.push(FieldError::on(
                    field,
                    format!("duplicate plugin key `{}`", row.key),
                ));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.key_locks.entry(key.to_string()).or_default().clone()
    }

    /// Per-key locks in iteration order; callers pass sorted keys.
    fn locks_for<'a>(&self, keys: impl Iterator<Item = &'a String>) -> Vec<Arc<Mutex<()>>> {
        keys.map(|key| self.key_lock(key)).collect()
    }
}

fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
