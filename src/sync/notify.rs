//! "Record changed" notifications for whoever renders the local store.

use tokio::sync::broadcast;

use crate::models::{EntityKind, LocalId};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordChange {
    pub kind: EntityKind,
    pub local_id: LocalId,
    pub change: ChangeKind,
}

/// Fan-out of local record changes.
///
/// Clones share the same channel. Sending never blocks; slow subscribers
/// observe `RecvError::Lagged` and should reload from the store.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<RecordChange>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordChange> {
        self.sender.subscribe()
    }

    pub fn notify(&self, kind: EntityKind, local_id: LocalId, change: ChangeKind) {
        // No subscribers is fine.
        let _ = self.sender.send(RecordChange {
            kind,
            local_id,
            change,
        });
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
