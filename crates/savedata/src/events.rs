//! Best-effort notifications about cache activity.

use tokio::sync::broadcast;

use crate::key::TypeKey;

/// Where a loaded record came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// Decoded from persisted bytes.
    Disk,
    /// Nothing was persisted; constructed with `Default`.
    Default,
    /// Persisted bytes could not be read or decoded; constructed with `Default`.
    Recovered,
}

/// Cache activity published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataEvent {
    Loaded { key: TypeKey, source: LoadSource },
    Saved { key: TypeKey },
    SaveFailed { key: TypeKey, reason: String },
    Unloaded { key: TypeKey },
    Deleted { key: Option<TypeKey> },
    Flushed { written: usize },
}

/// Single-channel event bus.
///
/// Publishing never blocks or fails; with no subscribers the event is dropped.
#[derive(Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<DataEvent>,
}

impl EventBus {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub(crate) fn publish(&self, event: DataEvent) {
        if self.tx.send(event).is_err() {
            // No subscribers - this is normal, not an error
            tracing::trace!("No subscribers for data event");
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<DataEvent> {
        self.tx.subscribe()
    }
}
