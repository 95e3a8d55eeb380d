use chrono::{DateTime, Utc};
use serde::Serialize;

use super::record_repo::parse_time;
use super::SqliteStore;
use crate::models::{LocalId, Mint};
use crate::sync::StoreError;

/// A local-only reminder attached to a mint. Never synced; removed
/// together with its mint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MintReminder {
    pub id: i64,
    pub mint_local_id: LocalId,
    pub remind_at: DateTime<Utc>,
    pub note: String,
}

#[derive(sqlx::FromRow)]
struct ReminderRow {
    id: i64,
    mint_local_id: i64,
    remind_at: String,
    note: String,
}

impl TryFrom<ReminderRow> for MintReminder {
    type Error = StoreError;

    fn try_from(row: ReminderRow) -> Result<Self, Self::Error> {
        let remind_at = parse_time(&row.remind_at)
            .map_err(|_| StoreError::Corrupt(format!("mint_reminders #{}: bad remind_at", row.id)))?;
        Ok(MintReminder {
            id: row.id,
            mint_local_id: row.mint_local_id,
            remind_at,
            note: row.note,
        })
    }
}

impl SqliteStore<Mint> {
    /// Attaches a reminder to an existing mint.
    pub async fn add_reminder(
        &self,
        mint_local_id: LocalId,
        remind_at: DateTime<Utc>,
        note: &str,
    ) -> Result<MintReminder, StoreError> {
        let result = sqlx::query(
            "INSERT INTO mint_reminders (mint_local_id, remind_at, note) VALUES (?, ?, ?)",
        )
        .bind(mint_local_id)
        .bind(remind_at.to_rfc3339())
        .bind(note)
        .execute(&self.pool)
        .await?;

        Ok(MintReminder {
            id: result.last_insert_rowid(),
            mint_local_id,
            remind_at,
            note: note.to_string(),
        })
    }

    pub async fn reminders(&self, mint_local_id: LocalId) -> Result<Vec<MintReminder>, StoreError> {
        let rows: Vec<ReminderRow> = sqlx::query_as(
            "SELECT * FROM mint_reminders WHERE mint_local_id = ? ORDER BY remind_at, id",
        )
        .bind(mint_local_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MintReminder::try_from).collect()
    }

    /// Reminders due at or before `now`, across all mints.
    pub async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<MintReminder>, StoreError> {
        let rows: Vec<ReminderRow> =
            sqlx::query_as("SELECT * FROM mint_reminders ORDER BY remind_at, id")
                .fetch_all(&self.pool)
                .await?;

        // RFC 3339 strings with mixed offsets don't sort lexically, so compare parsed.
        let reminders = rows
            .into_iter()
            .map(MintReminder::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reminders.into_iter().filter(|r| r.remind_at <= now).collect())
    }
}
