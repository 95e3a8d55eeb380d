use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::models::{Entity, LocalId, RecordPatch, SyncRecord, SyncStatus};
use crate::sync::{LocalStore, StoreError};

/// Volatile [`LocalStore`] kept in process memory.
pub struct MemoryStore<E> {
    inner: Mutex<MemoryInner<E>>,
}

struct MemoryInner<E> {
    records: BTreeMap<LocalId, SyncRecord<E>>,
    next_id: LocalId,
}

impl<E> MemoryStore<E> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                records: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner<E>>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl<E> Default for MemoryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Entity> LocalStore<E> for MemoryStore<E> {
    async fn add(&self, mut record: SyncRecord<E>) -> Result<LocalId, StoreError> {
        let mut inner = self.lock()?;
        let local_id = inner.next_id;
        inner.next_id += 1;
        record.local_id = local_id;
        inner.records.insert(local_id, record);
        Ok(local_id)
    }

    async fn get(&self, local_id: LocalId) -> Result<Option<SyncRecord<E>>, StoreError> {
        Ok(self.lock()?.records.get(&local_id).cloned())
    }

    async fn update(&self, local_id: LocalId, patch: RecordPatch<E>) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        match inner.records.get_mut(&local_id) {
            Some(record) => {
                record.apply(patch);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, local_id: LocalId) -> Result<(), StoreError> {
        self.lock()?.records.remove(&local_id);
        Ok(())
    }

    async fn list_by_sync_status(
        &self,
        status: SyncStatus,
    ) -> Result<Vec<SyncRecord<E>>, StoreError> {
        Ok(self
            .lock()?
            .records
            .values()
            .filter(|r| r.sync_status == status)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<SyncRecord<E>>, StoreError> {
        Ok(self.lock()?.records.values().cloned().collect())
    }
}
