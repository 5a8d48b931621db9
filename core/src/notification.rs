use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{Pool, Row, Sqlite, sqlite::SqliteRow};
use uuid::Uuid;

use crate::db::Database;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub payload: JsonValue,
    pub read: bool,
    pub created_at: i64,
}

#[derive(Clone)]
pub struct NotificationStore {
    pool: Pool<Sqlite>,
}

impl NotificationStore {
    pub fn new(database: &Database) -> Self {
        Self {
            pool: database.pool().clone(),
        }
    }

    pub async fn enqueue(
        &self,
        user_id: &str,
        kind: &str,
        payload: JsonValue,
    ) -> Result<NotificationRecord> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().timestamp();
        let serialized = serde_json::to_string(&payload)?;

        sqlx::query(
            "INSERT INTO notifications (id, user_id, kind, payload, read, created_at)
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(kind)
        .bind(serialized)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(NotificationRecord {
            id,
            user_id: user_id.to_owned(),
            kind: kind.to_owned(),
            payload,
            read: false,
            created_at,
        })
    }

    pub async fn list_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<NotificationRecord>> {
        let rows = sqlx::query(
            "SELECT id, user_id, kind, payload, read, created_at FROM notifications
             WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Self::map_row).collect())
    }

    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE user_id = ? AND read = 0")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    fn map_row(row: SqliteRow) -> NotificationRecord {
        NotificationRecord {
            id: row.get("id"),
            user_id: row.get("user_id"),
            kind: row.get("kind"),
            payload: serde_json::from_str(row.get::<String, _>("payload").as_str())
                .unwrap_or(JsonValue::Null),
            read: row.get::<i64, _>("read") != 0,
            created_at: row.get("created_at"),
        }
    }
}
