//! Save outcomes published by the coordinator.
//!
//! [`SaveEventBus`] wraps a `tokio::sync::broadcast` channel so any number of
//! sessions (and the HTTP layer, if it cares) can observe every outcome.

use serde::Serialize;
use shopfront_core::types::{PageId, Timestamp, VersionStamp};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveStatus {
    Saved {
        version: VersionStamp,
        at: Timestamp,
    },
    /// The stored page moved on. Nothing was written and nothing is retried
    /// until the caller decides.
    Conflict {
        expected: VersionStamp,
        actual: VersionStamp,
    },
    Failed {
        message: String,
        retrying: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveEvent {
    pub page_id: PageId,
    /// Editor revision of the snapshot this outcome belongs to.
    pub revision: u64,
    #[serde(flatten)]
    pub status: SaveStatus,
}

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

pub struct SaveEventBus {
    sender: broadcast::Sender<SaveEvent>,
}

impl SaveEventBus {
    /// When the buffer is full the oldest events are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: SaveEvent) {
        // A send error only means nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SaveEvent> {
        self.sender.subscribe()
    }
}

impl Default for SaveEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
