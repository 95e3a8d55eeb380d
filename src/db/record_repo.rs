use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::marker::PhantomData;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{Entity, LocalId, RecordPatch, SyncRecord, SyncStatus};
use crate::sync::{LocalStore, StoreError};

/// Durable [`LocalStore`] backed by one SQLite table per entity kind.
pub struct SqliteStore<E> {
    pub(super) pool: SqlitePool,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for SqliteStore<E> {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

// Row type for database queries
#[derive(sqlx::FromRow)]
struct RecordRow {
    local_id: i64,
    remote_id: Option<String>,
    client_id: String,
    payload: String,
    sync_status: String,
    last_synced_at: Option<String>,
    sync_error: Option<String>,
    deleted_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl<E> SqliteStore<E> {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl<E: Entity> SqliteStore<E> {
    fn table() -> &'static str {
        E::KIND.table()
    }

    fn hydrate(row: RecordRow) -> Result<SyncRecord<E>, StoreError> {
        let corrupt = |what: &str| {
            StoreError::Corrupt(format!("{} #{}: bad {}", Self::table(), row.local_id, what))
        };

        Ok(SyncRecord {
            local_id: row.local_id,
            remote_id: row.remote_id.clone(),
            client_id: Uuid::parse_str(&row.client_id).map_err(|_| corrupt("client_id"))?,
            payload: serde_json::from_str(&row.payload)?,
            sync_status: SyncStatus::from_str(&row.sync_status)
                .map_err(|_| corrupt("sync_status"))?,
            last_synced_at: parse_optional_time(row.last_synced_at.as_deref())
                .map_err(|_| corrupt("last_synced_at"))?,
            sync_error: row.sync_error.clone(),
            deleted_at: parse_optional_time(row.deleted_at.as_deref())
                .map_err(|_| corrupt("deleted_at"))?,
            created_at: parse_time(&row.created_at).map_err(|_| corrupt("created_at"))?,
            updated_at: parse_time(&row.updated_at).map_err(|_| corrupt("updated_at"))?,
        })
    }

    async fn fetch_where(
        &self,
        clause: &str,
        status: Option<SyncStatus>,
    ) -> Result<Vec<SyncRecord<E>>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} {} ORDER BY local_id",
            Self::table(),
            clause
        );
        let mut query = sqlx::query_as::<_, RecordRow>(&sql);
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter().map(Self::hydrate).collect()
    }
}

#[async_trait]
impl<E: Entity> LocalStore<E> for SqliteStore<E> {
    async fn add(&self, record: SyncRecord<E>) -> Result<LocalId, StoreError> {
        let payload = serde_json::to_string(&record.payload)?;

        let result = sqlx::query(&format!(
            r#"
            INSERT INTO {} (remote_id, client_id, payload, sync_status, last_synced_at, sync_error, deleted_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            Self::table()
        ))
        .bind(&record.remote_id)
        .bind(record.client_id.to_string())
        .bind(&payload)
        .bind(record.sync_status.as_str())
        .bind(record.last_synced_at.map(|t| t.to_rfc3339()))
        .bind(&record.sync_error)
        .bind(record.deleted_at.map(|t| t.to_rfc3339()))
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get(&self, local_id: LocalId) -> Result<Option<SyncRecord<E>>, StoreError> {
        let sql = format!("SELECT * FROM {} WHERE local_id = ?", Self::table());
        let row: Option<RecordRow> = sqlx::query_as(&sql)
            .bind(local_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::hydrate).transpose()
    }

    async fn update(&self, local_id: LocalId, patch: RecordPatch<E>) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let select = format!("SELECT * FROM {} WHERE local_id = ?", Self::table());
        let row: Option<RecordRow> = sqlx::query_as(&select)
            .bind(local_id)
            .fetch_optional(&mut *tx)
            .await?;

        // Dropping the transaction rolls it back.
        let Some(row) = row else {
            return Ok(false);
        };

        let mut record = Self::hydrate(row)?;
        record.apply(patch);
        let payload = serde_json::to_string(&record.payload)?;

        sqlx::query(&format!(
            r#"
            UPDATE {}
            SET remote_id = ?, payload = ?, sync_status = ?, last_synced_at = ?,
                sync_error = ?, deleted_at = ?, updated_at = ?
            WHERE local_id = ?
            "#,
            Self::table()
        ))
        .bind(&record.remote_id)
        .bind(&payload)
        .bind(record.sync_status.as_str())
        .bind(record.last_synced_at.map(|t| t.to_rfc3339()))
        .bind(&record.sync_error)
        .bind(record.deleted_at.map(|t| t.to_rfc3339()))
        .bind(record.updated_at.to_rfc3339())
        .bind(local_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn delete(&self, local_id: LocalId) -> Result<(), StoreError> {
        // CASCADE will handle child rows such as mint reminders
        sqlx::query(&format!("DELETE FROM {} WHERE local_id = ?", Self::table()))
            .bind(local_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_by_sync_status(
        &self,
        status: SyncStatus,
    ) -> Result<Vec<SyncRecord<E>>, StoreError> {
        self.fetch_where("WHERE sync_status = ?", Some(status)).await
    }

    async fn list_all(&self) -> Result<Vec<SyncRecord<E>>, StoreError> {
        self.fetch_where("", None).await
    }
}

pub(super) fn parse_time(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}

fn parse_optional_time(value: Option<&str>) -> Result<Option<DateTime<Utc>>, chrono::ParseError> {
    value.map(parse_time).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::models::{FarmingProject, Mint, TaskItem, TodoTask};
    use tempfile::TempDir;

    struct TestContext {
        pool: SqlitePool,
        _temp_dir: TempDir, // Keep alive for duration of test
    }

    async fn setup() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let pool = init_db(&db_path).await.unwrap();
        TestContext {
            pool,
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_add_and_get_roundtrip() {
        let ctx = setup().await;
        let store = SqliteStore::<TodoTask>::new(ctx.pool.clone());

        let task = TodoTask::new("Renew domain").with_subtasks(vec![TaskItem::new("pay")]);
        let record = SyncRecord::new(task.clone());
        let client_id = record.client_id;

        let id = store.add(record).await.unwrap();
        let fetched = store.get(id).await.unwrap().unwrap();
        assert_eq!(fetched.local_id, id);
        assert_eq!(fetched.client_id, client_id);
        assert_eq!(fetched.payload, task);
        assert_eq!(fetched.sync_status, SyncStatus::PendingCreate);
        assert!(fetched.remote_id.is_none());
    }

    #[tokio::test]
    async fn test_update_applies_patch() {
        let ctx = setup().await;
        let store = SqliteStore::<Mint>::new(ctx.pool.clone());
        let id = store
            .add(SyncRecord::new(Mint::new("Pals", "sol")))
            .await
            .unwrap();

        let now = Utc::now();
        let changed = store
            .update(
                id,
                RecordPatch::new()
                    .payload(Mint::new("Pals", "sol").with_supply(500))
                    .remote_id("17")
                    .synced(now),
            )
            .await
            .unwrap();
        assert!(changed);

        let record = store.get(id).await.unwrap().unwrap();
        assert_eq!(record.remote_id.as_deref(), Some("17"));
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(record.payload.supply, Some(500));
        assert_eq!(
            record.last_synced_at.map(|t| t.timestamp()),
            Some(now.timestamp())
        );
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let ctx = setup().await;
        let store = SqliteStore::<Mint>::new(ctx.pool.clone());
        let changed = store
            .update(404, RecordPatch::new().status(SyncStatus::Synced))
            .await
            .unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn test_list_by_sync_status_is_per_table() {
        let ctx = setup().await;
        let mints = SqliteStore::<Mint>::new(ctx.pool.clone());
        let farms = SqliteStore::<FarmingProject>::new(ctx.pool.clone());

        let a = mints.add(SyncRecord::new(Mint::new("A", "sol"))).await.unwrap();
        mints.add(SyncRecord::new(Mint::new("B", "sol"))).await.unwrap();
        farms
            .add(SyncRecord::new(FarmingProject::new("Scroll", "l2")))
            .await
            .unwrap();
        mints
            .update(a, RecordPatch::new().status(SyncStatus::PendingDelete).deleted_at(Utc::now()))
            .await
            .unwrap();

        let pending = mints
            .list_by_sync_status(SyncStatus::PendingCreate)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].payload.name, "B");

        let deleting = mints
            .list_by_sync_status(SyncStatus::PendingDelete)
            .await
            .unwrap();
        assert_eq!(deleting.len(), 1);
        assert!(deleting[0].deleted_at.is_some());

        assert_eq!(mints.list_all().await.unwrap().len(), 2);
        assert_eq!(farms.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let ctx = setup().await;
        let store = SqliteStore::<TodoTask>::new(ctx.pool.clone());
        let id = store.add(SyncRecord::new(TodoTask::new("x"))).await.unwrap();

        store.delete(id).await.unwrap();
        assert!(store.get(id).await.unwrap().is_none());
        // Deleting twice is harmless
        store.delete(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_status_is_reported() {
        let ctx = setup().await;
        let store = SqliteStore::<TodoTask>::new(ctx.pool.clone());
        let id = store.add(SyncRecord::new(TodoTask::new("x"))).await.unwrap();

        sqlx::query("UPDATE todos SET sync_status = 'bogus' WHERE local_id = ?")
            .bind(id)
            .execute(&ctx.pool)
            .await
            .unwrap();

        let err = store.get(id).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
        assert!(err.to_string().contains("sync_status"));
    }
}
