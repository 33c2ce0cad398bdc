//! One namespace's cached map.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;

use crate::store::backend::ParamMap;

/// Cached map of a single namespace.
///
/// Readers take lock-free snapshots; writers serialize on `writer`, persist,
/// then publish the finished map in one swap.
#[derive(Debug)]
pub struct ConfigParam {
    namespace: String,
    map: ArcSwap<ParamMap>,
    writer: Mutex<()>,
}

impl ConfigParam {
    pub(crate) fn new(namespace: impl Into<String>, map: ParamMap) -> Self {
        Self {
            namespace: namespace.into(),
            map: ArcSwap::from_pointee(map),
            writer: Mutex::new(()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Current map; later writes do not affect it.
    pub fn snapshot(&self) -> Arc<ParamMap> {
        self.map.load_full()
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.map.load().get(key).cloned()
    }

    pub fn is_defined(&self, key: &str) -> bool {
        self.map.load().contains_key(key)
    }

    pub(crate) fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn publish(&self, map: ParamMap) {
        self.map.store(Arc::new(map));
    }
}
