//! Local store contract consumed by the sync engine.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{Entity, LocalId, RecordPatch, SyncRecord, SyncStatus};

/// Failures of the local durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// One durable collection of [`SyncRecord`]s.
///
/// Each method is atomic with respect to a single record: `update` applies
/// the whole patch or nothing, and `delete` removes the record together with
/// any child rows that hang off it.
#[async_trait]
pub trait LocalStore<E: Entity>: Send + Sync {
    /// Inserts a record and returns its newly assigned id. The `local_id`
    /// carried by `record` is ignored.
    async fn add(&self, record: SyncRecord<E>) -> Result<LocalId, StoreError>;

    async fn get(&self, local_id: LocalId) -> Result<Option<SyncRecord<E>>, StoreError>;

    /// Returns `false` when no record with this id exists.
    async fn update(&self, local_id: LocalId, patch: RecordPatch<E>) -> Result<bool, StoreError>;

    async fn delete(&self, local_id: LocalId) -> Result<(), StoreError>;

    /// Records in the given status, ordered by `local_id`.
    async fn list_by_sync_status(&self, status: SyncStatus)
        -> Result<Vec<SyncRecord<E>>, StoreError>;

    /// Every record including tombstones, ordered by `local_id`.
    async fn list_all(&self) -> Result<Vec<SyncRecord<E>>, StoreError>;
}

#[async_trait]
impl<E, S> LocalStore<E> for Arc<S>
where
    E: Entity,
    S: LocalStore<E> + ?Sized,
{
    async fn add(&self, record: SyncRecord<E>) -> Result<LocalId, StoreError> {
        (**self).add(record).await
    }

    async fn get(&self, local_id: LocalId) -> Result<Option<SyncRecord<E>>, StoreError> {
        (**self).get(local_id).await
    }

    async fn update(&self, local_id: LocalId, patch: RecordPatch<E>) -> Result<bool, StoreError> {
        (**self).update(local_id, patch).await
    }

    async fn delete(&self, local_id: LocalId) -> Result<(), StoreError> {
        (**self).delete(local_id).await
    }

    async fn list_by_sync_status(
        &self,
        status: SyncStatus,
    ) -> Result<Vec<SyncRecord<E>>, StoreError> {
        (**self).list_by_sync_status(status).await
    }

    async fn list_all(&self) -> Result<Vec<SyncRecord<E>>, StoreError> {
        (**self).list_all().await
    }
}
