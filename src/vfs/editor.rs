//! Generic guarded file access (text editor / file browser backend).

use std::sync::Arc;

use crate::error::{CfgResult, FieldError};
use crate::events::{EventBus, StoreEvent};
use crate::store::ParamStore;
use crate::vfs::mounts::{DirEntry, Vfs};
use crate::vfs::path::{normalize, strip_cr};
use crate::vfs::policy::SharedPolicy;

/// Reads and writes arbitrary user files, never protected ones.
///
/// Writes hold the store's write gate so they cannot land in a script tree
/// while a backup or restore has it.
pub struct FileEditor {
    vfs: Arc<Vfs>,
    policy: SharedPolicy,
    store: Arc<ParamStore>,
    events: EventBus,
}

impl FileEditor {
    pub fn new(
        vfs: Arc<Vfs>,
        policy: SharedPolicy,
        store: Arc<ParamStore>,
        events: EventBus,
    ) -> Self {
        Self {
            vfs,
            policy,
            store,
            events,
        }
    }

    /// File content, `None` for a missing file.
    pub fn read(&self, path: &str) -> CfgResult<Option<Vec<u8>>> {
        self.policy.load().check(path)?;
        Ok(self.vfs.read(path)?)
    }

    /// Save text content; carriage returns are stripped, parents are created.
    pub fn write(&self, path: &str, content: &[u8]) -> CfgResult<()> {
        self.policy.load().check(path)?;
        if path.is_empty() || !path.starts_with('/') || path.ends_with('/') {
            return Err(FieldError::on("path", "Missing or invalid path").into());
        }

        let path = normalize(path);
        let _gate = self.store.write_gate()?;
        self.vfs.write_atomic(&path, &strip_cr(content))?;
        tracing::info!(path = %path, "File saved");
        self.events.emit(StoreEvent::FileChanged(path));
        Ok(())
    }

    pub fn list(&self, path: &str) -> CfgResult<Vec<DirEntry>> {
        self.policy.load().check(path)?;
        Ok(self.vfs.list(path)?)
    }
}
