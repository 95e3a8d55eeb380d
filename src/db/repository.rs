use chrono::Utc;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use thiserror::Error;

use crate::models::{Entity, LocalId, RecordPatch, SyncRecord, SyncStatus};
use crate::sync::{ChangeKind, ChangeNotifier, LocalStore, StoreError};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("No {kind} with id {id}")]
    NotFound { kind: String, id: LocalId },

    #[error("{kind} {id} is deleted and waiting to sync")]
    Deleted { kind: String, id: LocalId },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Local user actions on one collection.
///
/// Every write marks the record for the next sync and publishes a change;
/// nothing here talks to the backend.
pub struct EntityRepository<E, S> {
    store: S,
    notifier: ChangeNotifier,
    _entity: PhantomData<fn() -> E>,
}

impl<E, S> EntityRepository<E, S>
where
    E: Entity,
    S: LocalStore<E>,
{
    pub fn new(store: S) -> Self {
        Self::with_notifier(store, ChangeNotifier::default())
    }

    /// Shares `notifier` with other writers, typically the sync engine.
    pub fn with_notifier(store: S, notifier: ChangeNotifier) -> Self {
        Self {
            store,
            notifier,
            _entity: PhantomData,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub async fn create(&self, payload: E) -> Result<SyncRecord<E>, RepositoryError> {
        let mut record = SyncRecord::new(payload);
        record.local_id = self.store.add(record.clone()).await?;

        tracing::debug!(kind = %E::KIND, local_id = record.local_id, "created record");
        self.notifier
            .notify(E::KIND, record.local_id, ChangeKind::Inserted);
        Ok(record)
    }

    /// Replaces the payload and queues the change for the next push.
    pub async fn edit(&self, local_id: LocalId, payload: E) -> Result<SyncRecord<E>, RepositoryError> {
        let current = self.require(local_id).await?;
        if current.is_deleted() || current.sync_status == SyncStatus::PendingDelete {
            return Err(RepositoryError::Deleted {
                kind: E::KIND.to_string(),
                id: local_id,
            });
        }

        let status = match (current.sync_status, current.remote_id.is_some()) {
            (SyncStatus::PendingCreate, _) => SyncStatus::PendingCreate,
            (_, true) => SyncStatus::PendingUpdate,
            (_, false) => SyncStatus::PendingCreate,
        };

        self.store
            .update(local_id, RecordPatch::new().payload(payload).status(status))
            .await?;
        self.notifier.notify(E::KIND, local_id, ChangeKind::Updated);

        self.require(local_id).await
    }

    /// Tombstones the record. Removal happens when the next sync confirms it.
    pub async fn delete(&self, local_id: LocalId) -> Result<(), RepositoryError> {
        let current = self.require(local_id).await?;
        if current.is_deleted() {
            return Ok(());
        }

        self.store
            .update(
                local_id,
                RecordPatch::new()
                    .status(SyncStatus::PendingDelete)
                    .deleted_at(Utc::now()),
            )
            .await?;

        tracing::debug!(kind = %E::KIND, local_id, "tombstoned record");
        self.notifier.notify(E::KIND, local_id, ChangeKind::Updated);
        Ok(())
    }

    pub async fn get(&self, local_id: LocalId) -> Result<Option<SyncRecord<E>>, RepositoryError> {
        Ok(self.store.get(local_id).await?)
    }

    /// Visible records: everything except tombstones, ordered by id.
    pub async fn list(&self) -> Result<Vec<SyncRecord<E>>, RepositoryError> {
        let records = self.store.list_all().await?;
        Ok(records.into_iter().filter(|r| !r.is_deleted()).collect())
    }

    /// Record totals per status, tombstones included. Every status is present.
    pub async fn status_counts(&self) -> Result<BTreeMap<SyncStatus, usize>, RepositoryError> {
        let mut counts: BTreeMap<SyncStatus, usize> =
            SyncStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for record in self.store.list_all().await? {
            *counts.entry(record.sync_status).or_default() += 1;
        }
        Ok(counts)
    }

    async fn require(&self, local_id: LocalId) -> Result<SyncRecord<E>, RepositoryError> {
        self.store
            .get(local_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound {
                kind: E::KIND.to_string(),
                id: local_id,
            })
    }
}
