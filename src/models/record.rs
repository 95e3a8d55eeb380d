use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::SyncStatus;

/// Local store identifier. Zero means the record has not been persisted yet.
pub type LocalId = i64;

/// A payload plus the bookkeeping needed to reconcile it with the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord<E> {
    pub local_id: LocalId,
    /// Backend id, `None` until the first successful push.
    pub remote_id: Option<String>,
    /// Correlation id generated on this device, never rewritten.
    pub client_id: Uuid,
    pub payload: E,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,
    /// Tombstone set by a local delete awaiting remote confirmation.
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<E> SyncRecord<E> {
    /// A freshly created local record waiting for its first push.
    pub fn new(payload: E) -> Self {
        let now = Utc::now();
        Self {
            local_id: 0,
            remote_id: None,
            client_id: Uuid::new_v4(),
            payload,
            sync_status: SyncStatus::PendingCreate,
            last_synced_at: None,
            sync_error: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Merges a partial update into this record and stamps `updated_at`.
    pub fn apply(&mut self, patch: RecordPatch<E>) {
        if let Some(payload) = patch.payload {
            self.payload = payload;
        }
        if let Some(remote_id) = patch.remote_id {
            self.remote_id = remote_id;
        }
        if let Some(status) = patch.sync_status {
            self.sync_status = status;
        }
        if let Some(at) = patch.last_synced_at {
            self.last_synced_at = at;
        }
        if let Some(error) = patch.sync_error {
            self.sync_error = error;
        }
        if let Some(at) = patch.deleted_at {
            self.deleted_at = at;
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update for [`SyncRecord`].
///
/// Outer `None` leaves a field untouched; for nullable fields `Some(None)`
/// clears it. The client id is deliberately absent: it never changes.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPatch<E> {
    pub payload: Option<E>,
    pub remote_id: Option<Option<String>>,
    pub sync_status: Option<SyncStatus>,
    pub last_synced_at: Option<Option<DateTime<Utc>>>,
    pub sync_error: Option<Option<String>>,
    pub deleted_at: Option<Option<DateTime<Utc>>>,
}

impl<E> Default for RecordPatch<E> {
    fn default() -> Self {
        Self {
            payload: None,
            remote_id: None,
            sync_status: None,
            last_synced_at: None,
            sync_error: None,
            deleted_at: None,
        }
    }
}

impl<E> RecordPatch<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payload(mut self, payload: E) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(Some(remote_id.into()));
        self
    }

    pub fn status(mut self, status: SyncStatus) -> Self {
        self.sync_status = Some(status);
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.sync_error = Some(Some(message.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.sync_error = Some(None);
        self
    }

    pub fn deleted_at(mut self, at: DateTime<Utc>) -> Self {
        self.deleted_at = Some(Some(at));
        self
    }

    /// The full "server confirmed this state" update.
    pub fn synced(self, at: DateTime<Utc>) -> Self {
        let mut patch = self.status(SyncStatus::Synced).clear_error();
        patch.last_synced_at = Some(Some(at));
        patch
    }
}
