//! Namespace-keyed cache of [`ConfigParam`]s.
//!
//! # Responsibilities
//! - Lazily load a namespace on first lookup and keep it for the process lifetime
//! - Serve lock-free snapshots to readers
//! - Persist, then publish, complete replacement maps
//! - Give backup/restore exclusive access to the whole store
//!
//! # Locking
//! ```text
//! gate (RwLock)        shared by namespace writers, WriteGate holders and
//!                      cache-miss loads, exclusive for Maintenance (backup / restore)
//! ConfigParam::writer  one writer per namespace at a time
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use serde::Serialize;

use crate::events::{EventBus, StoreEvent};
use crate::observability::metrics;
use crate::store::backend::{NamespaceDump, ParamBackend, ParamMap};
use crate::store::error::{StorageError, StorageResult};
use crate::store::param::ConfigParam;

/// Lifecycle of the store as a whole.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorePhase {
    /// Normal operation.
    Live = 0,
    /// Backup or restore holds the store exclusively.
    Maintenance = 1,
    /// A restore replaced the persisted state; writes are refused until restart.
    RestartPending = 2,
}

impl From<u8> for StorePhase {
    fn from(val: u8) -> Self {
        match val {
            1 => StorePhase::Maintenance,
            2 => StorePhase::RestartPending,
            _ => StorePhase::Live,
        }
    }
}

/// Check a namespace name before it is used as a file name.
pub fn validate_namespace(namespace: &str) -> StorageResult<()> {
    let valid = !namespace.is_empty()
        && !namespace.starts_with('.')
        && namespace.len() <= 64
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidNamespace(namespace.to_string()))
    }
}

/// The configuration parameter store.
///
/// Constructed once and shared by reference; there is no global instance.
pub struct ParamStore {
    backend: Arc<dyn ParamBackend>,
    params: DashMap<String, Arc<ConfigParam>>,
    gate: RwLock<()>,
    phase: AtomicU8,
    events: EventBus,
}

impl ParamStore {
    pub fn new(backend: Arc<dyn ParamBackend>, events: EventBus) -> Self {
        Self {
            backend,
            params: DashMap::new(),
            gate: RwLock::new(()),
            phase: AtomicU8::new(StorePhase::Live as u8),
            events,
        }
    }

    pub fn phase(&self) -> StorePhase {
        StorePhase::from(self.phase.load(Ordering::Acquire))
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Stored value, or `default` when absent or unreadable.
    pub fn get_value(&self, namespace: &str, key: &str, default: &str) -> String {
        self.snapshot(namespace)
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn is_defined(&self, namespace: &str, key: &str) -> bool {
        self.snapshot(namespace).contains_key(key)
    }

    /// Copy of the current map.
    pub fn get_map(&self, namespace: &str) -> ParamMap {
        self.snapshot(namespace).as_ref().clone()
    }

    /// Shared snapshot of the current map; empty if the namespace cannot be loaded.
    pub fn snapshot(&self, namespace: &str) -> Arc<ParamMap> {
        match self.param(namespace) {
            Ok(param) => param.snapshot(),
            Err(e) => {
                tracing::warn!(namespace = %namespace, error = %e, "Namespace unavailable, using defaults");
                Arc::new(ParamMap::new())
            }
        }
    }

    /// Set one key by replacing the whole map.
    pub fn set_value(&self, namespace: &str, key: &str, value: &str) -> StorageResult<()> {
        self.replace_with(namespace, |current| {
            let mut next = current.clone();
            next.insert(key.to_string(), value.to_string());
            Ok::<_, StorageError>(next)
        })
        .map(|_| ())
    }

    /// Remove one key by replacing the whole map.
    pub fn delete_value(&self, namespace: &str, key: &str) -> StorageResult<()> {
        self.replace_with(namespace, |current| {
            let mut next = current.clone();
            next.remove(key);
            Ok::<_, StorageError>(next)
        })
        .map(|_| ())
    }

    /// Atomically replace a namespace map and persist it before returning.
    pub fn set_map(&self, namespace: &str, map: ParamMap) -> StorageResult<()> {
        self.replace_with(namespace, move |_| Ok::<_, StorageError>(map))
            .map(|_| ())
    }

    /// Compute the complete next map from the current one and commit it once.
    ///
    /// `build` runs under the namespace write lock; if it fails nothing is
    /// written. Returns the map that was replaced.
    pub fn replace_with<E, F>(&self, namespace: &str, build: F) -> Result<Arc<ParamMap>, E>
    where
        F: FnOnce(&ParamMap) -> Result<ParamMap, E>,
        E: From<StorageError>,
    {
        self.write_gate()?.replace_with(namespace, build)
    }

    /// Shared hold on the gate for writers with file side effects.
    ///
    /// Backup and restore wait until every [`WriteGate`] is dropped, so file
    /// writes made under one never interleave with a snapshot or a swap.
    pub fn write_gate(&self) -> StorageResult<WriteGate<'_>> {
        let gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        self.ensure_writable()?;
        Ok(WriteGate {
            store: self,
            _gate: gate,
        })
    }

    fn replace_locked<E, F>(&self, namespace: &str, build: F) -> Result<Arc<ParamMap>, E>
    where
        F: FnOnce(&ParamMap) -> Result<ParamMap, E>,
        E: From<StorageError>,
    {
        let param = self.param_locked(namespace)?;
        let _writer = param.lock_writer();
        let current = param.snapshot();
        let next = build(&current)?;

        if let Err(e) = self.backend.store(namespace, &next) {
            tracing::error!(namespace = %namespace, error = %e, "Failed to persist namespace");
            metrics::record_storage_failure("set_map");
            metrics::record_map_replace(namespace, false);
            return Err(e.into());
        }
        param.publish(next);

        tracing::debug!(namespace = %namespace, "Namespace replaced");
        metrics::record_map_replace(namespace, true);
        self.events
            .emit(StoreEvent::NamespaceReplaced(namespace.to_string()));
        Ok(current)
    }

    /// Names of all persisted namespaces.
    pub fn namespaces(&self) -> StorageResult<Vec<String>> {
        self.backend.namespaces()
    }

    /// Take the store exclusively; writers and cache-miss loads wait until dropped.
    pub fn maintenance(&self) -> StorageResult<Maintenance<'_>> {
        let gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        if self.phase() == StorePhase::RestartPending {
            return Err(StorageError::RestartPending);
        }
        self.phase
            .store(StorePhase::Maintenance as u8, Ordering::Release);
        Ok(Maintenance {
            store: self,
            _gate: gate,
        })
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        match self.phase() {
            StorePhase::RestartPending => Err(StorageError::RestartPending),
            _ => Ok(()),
        }
    }

    fn param(&self, namespace: &str) -> StorageResult<Arc<ConfigParam>> {
        if let Some(param) = self.params.get(namespace) {
            return Ok(param.clone());
        }
        let _gate = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        self.param_locked(namespace)
    }

    /// Cache lookup/load; the caller holds the gate.
    fn param_locked(&self, namespace: &str) -> StorageResult<Arc<ConfigParam>> {
        validate_namespace(namespace)?;
        let entry = self
            .params
            .entry(namespace.to_string())
            .or_try_insert_with(|| {
                let map = self.backend.load(namespace)?.unwrap_or_default();
                tracing::trace!(namespace = %namespace, keys = map.len(), "Namespace loaded");
                Ok::<_, StorageError>(Arc::new(ConfigParam::new(namespace, map)))
            })?;
        Ok(entry.clone())
    }
}

/// Shared hold on the store gate; see [`ParamStore::write_gate`].
///
/// The gate is not reentrant: while holding one, use its accessors rather
/// than the store's own.
pub struct WriteGate<'a> {
    store: &'a ParamStore,
    _gate: RwLockReadGuard<'a, ()>,
}

impl WriteGate<'_> {
    pub fn snapshot(&self, namespace: &str) -> StorageResult<Arc<ParamMap>> {
        Ok(self.store.param_locked(namespace)?.snapshot())
    }

    pub fn replace_with<E, F>(&self, namespace: &str, build: F) -> Result<Arc<ParamMap>, E>
    where
        F: FnOnce(&ParamMap) -> Result<ParamMap, E>,
        E: From<StorageError>,
    {
        self.store.replace_locked(namespace, build)
    }
}

/// Exclusive hold on the whole store for backup and restore.
pub struct Maintenance<'a> {
    store: &'a ParamStore,
    _gate: RwLockWriteGuard<'a, ()>,
}

impl Maintenance<'_> {
    /// Every persisted namespace, read from the backend.
    pub fn snapshot_all(&self) -> StorageResult<NamespaceDump> {
        let mut dump = NamespaceDump::new();
        for namespace in self.store.backend.namespaces()? {
            let map = self.store.backend.load(&namespace)?.unwrap_or_default();
            dump.insert(namespace, map);
        }
        Ok(dump)
    }

    /// Replace the entire persisted set and drop every cached namespace.
    pub fn install(&self, dump: &NamespaceDump) -> StorageResult<()> {
        for namespace in dump.keys() {
            validate_namespace(namespace)?;
        }
        if let Err(e) = self.store.backend.replace_all(dump) {
            metrics::record_storage_failure("install");
            return Err(e);
        }
        self.store.params.clear();
        tracing::info!(namespaces = dump.len(), "Namespace set installed");
        Ok(())
    }

    /// Refuse all further writes until the process restarts.
    pub fn seal_for_restart(&self) {
        self.store
            .phase
            .store(StorePhase::RestartPending as u8, Ordering::Release);
    }
}

impl Drop for Maintenance<'_> {
    fn drop(&mut self) {
        // fails when sealed for restart; RestartPending must stick
        let _ = self.store.phase.compare_exchange(
            StorePhase::Maintenance as u8,
            StorePhase::Live as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}
