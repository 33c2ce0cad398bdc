//! Change notifications for other subsystems.
//!
//! Fire-and-forget: a send with no subscribers is not an error, and nothing
//! in the store's consistency guarantees depends on delivery.

use tokio::sync::broadcast;

/// Capacity of the broadcast ring; slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 64;

/// Something changed in persisted configuration or on a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A file was written (logical path).
    FileChanged(String),
    /// A file was deleted (logical path).
    FileRemoved(String),
    /// A namespace map was replaced.
    NamespaceReplaced(String),
    /// A restore finished and a restart is pending.
    RestoreCompleted,
}

impl StoreEvent {
    /// Event name as announced on the device event bus.
    pub fn name(&self) -> &'static str {
        match self {
            StoreEvent::FileChanged(_) => "system.vfs.file.changed",
            StoreEvent::FileRemoved(_) => "system.vfs.file.removed",
            StoreEvent::NamespaceReplaced(_) => "config.changed",
            StoreEvent::RestoreCompleted => "config.restored",
        }
    }
}

/// Broadcast sink shared by every component.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: StoreEvent) {
        tracing::trace!(event = event.name(), detail = ?event, "Event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new();
        bus.emit(StoreEvent::RestoreCompleted);
    }

    #[test]
    fn test_subscriber_receives() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(StoreEvent::FileChanged("/store/plugin/foo".into()));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.name(), "system.vfs.file.changed");
        assert_eq!(event, StoreEvent::FileChanged("/store/plugin/foo".into()));
    }
}
