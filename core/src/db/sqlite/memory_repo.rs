use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Pool, QueryBuilder, Row, Sqlite, sqlite::SqliteRow};
use std::str::FromStr;

use crate::{
    db::memory_repo::{CreateMemoryParams, MemoryRepository, UpdateMemoryParams},
    ids::{CapsuleId, MemoryId, UserId},
    memory::{MemoryCommentRecord, MemoryKind, MemoryRecord, ReactionRecord, ReactionToggle},
};

pub struct SqliteMemoryRepository {
    pool: Pool<Sqlite>,
}

impl SqliteMemoryRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn serialize_tags(tags: &[String]) -> Result<String> {
        Ok(serde_json::to_string(tags)?)
    }

    fn deserialize_tags(raw: &str) -> Vec<String> {
        serde_json::from_str(raw).unwrap_or_default()
    }

    fn map_memory_row(row: SqliteRow) -> Result<MemoryRecord> {
        Ok(MemoryRecord {
            id: MemoryId::from(row.get::<String, _>("id")),
            capsule_id: CapsuleId::from(row.get::<String, _>("capsule_id")),
            kind: MemoryKind::from_str(row.get::<String, _>("kind").as_str())?,
            title: row.get("title"),
            body: row.get("body"),
            media_url: row.get("media_url"),
            tags: Self::deserialize_tags(row.get::<String, _>("tags").as_str()),
            pinned: row.get::<i64, _>("pinned") != 0,
            created_by: UserId::from(row.get::<String, _>("created_by")),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn map_comment_row(row: SqliteRow) -> MemoryCommentRecord {
        MemoryCommentRecord {
            id: row.get("id"),
            memory_id: MemoryId::from(row.get::<String, _>("memory_id")),
            author_id: UserId::from(row.get::<String, _>("author_id")),
            body: row.get("body"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl MemoryRepository for SqliteMemoryRepository {
    async fn create_memory(&self, params: CreateMemoryParams) -> Result<MemoryRecord> {
        let CreateMemoryParams {
            id,
            capsule_id,
            created_by,
            kind,
            title,
            body,
            media_url,
            tags,
            created_at,
        } = params;

        sqlx::query(
            "INSERT INTO memories (
                 id,
                 capsule_id,
                 kind,
                 title,
                 body,
                 media_url,
                 tags,
                 pinned,
                 created_by,
                 created_at,
                 updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&capsule_id)
        .bind(kind.as_str())
        .bind(title.as_ref())
        .bind(body.as_ref())
        .bind(media_url.as_ref())
        .bind(Self::serialize_tags(&tags)?)
        .bind(&created_by)
        .bind(created_at)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(MemoryRecord {
            id: MemoryId::from(id),
            capsule_id: CapsuleId::from(capsule_id),
            kind,
            title,
            body,
            media_url,
            tags,
            pinned: false,
            created_by: UserId::from(created_by),
            created_at,
            updated_at: created_at,
        })
    }

    async fn fetch_memory(&self, id: &str) -> Result<Option<MemoryRecord>> {
        let row = sqlx::query(
            "SELECT id, capsule_id, kind, title, body, media_url, tags, pinned, created_by, created_at, updated_at
             FROM memories WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::map_memory_row).transpose()
    }

    async fn list_memories(&self, capsule_id: &str) -> Result<Vec<MemoryRecord>> {
        let rows = sqlx::query(
            "SELECT id, capsule_id, kind, title, body, media_url, tags, pinned, created_by, created_at, updated_at
             FROM memories WHERE capsule_id = ?
             ORDER BY pinned DESC, created_at DESC, id DESC",
        )
        .bind(capsule_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::map_memory_row).collect()
    }

    async fn update_memory(&self, params: UpdateMemoryParams) -> Result<bool> {
        let UpdateMemoryParams {
            id,
            title,
            body,
            tags,
            updated_at,
        } = params;

        let mut builder = QueryBuilder::new("UPDATE memories SET ");
        let mut has_updates = false;

        if let Some(title) = title {
            builder.push("title = ");
            builder.push_bind(title);
            has_updates = true;
        }
        if let Some(body) = body {
            if has_updates {
                builder.push(", ");
            }
            builder.push("body = ");
            builder.push_bind(body);
            has_updates = true;
        }
        if let Some(tags) = tags {
            if has_updates {
                builder.push(", ");
            }
            builder.push("tags = ");
            builder.push_bind(Self::serialize_tags(&tags)?);
            has_updates = true;
        }

        if !has_updates {
            return Ok(false);
        }

        builder.push(", updated_at = ");
        builder.push_bind(updated_at);
        builder.push(" WHERE id = ");
        builder.push_bind(id);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_memory(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM memory_reactions WHERE memory_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM memory_comments WHERE memory_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM memories WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_pinned(&self, id: &str, pinned: bool, updated_at: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE memories SET pinned = ?, updated_at = ? WHERE id = ?")
            .bind(if pinned { 1_i64 } else { 0_i64 })
            .bind(updated_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn toggle_reaction(
        &self,
        memory_id: &str,
        user_id: &str,
        emoji: &str,
        created_at: i64,
    ) -> Result<ReactionToggle> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM memory_reactions WHERE memory_id = ? AND user_id = ? AND emoji = ?",
        )
        .bind(memory_id)
        .bind(user_id)
        .bind(emoji)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let toggle = if removed > 0 {
            ReactionToggle::Removed
        } else {
            sqlx::query(
                "INSERT INTO memory_reactions (memory_id, user_id, emoji, created_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(memory_id)
            .bind(user_id)
            .bind(emoji)
            .bind(created_at)
            .execute(&mut *tx)
            .await?;
            ReactionToggle::Added
        };

        tx.commit().await?;
        Ok(toggle)
    }

    async fn list_reactions(&self, memory_id: &str) -> Result<Vec<ReactionRecord>> {
        let rows = sqlx::query(
            "SELECT memory_id, user_id, emoji, created_at FROM memory_reactions
             WHERE memory_id = ? ORDER BY created_at ASC",
        )
        .bind(memory_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ReactionRecord {
                memory_id: MemoryId::from(row.get::<String, _>("memory_id")),
                user_id: UserId::from(row.get::<String, _>("user_id")),
                emoji: row.get("emoji"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn create_comment(
        &self,
        id: String,
        memory_id: &str,
        author_id: &str,
        body: &str,
        created_at: i64,
    ) -> Result<MemoryCommentRecord> {
        sqlx::query(
            "INSERT INTO memory_comments (id, memory_id, author_id, body, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(memory_id)
        .bind(author_id)
        .bind(body)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(MemoryCommentRecord {
            id,
            memory_id: MemoryId::from(memory_id),
            author_id: UserId::from(author_id),
            body: body.to_owned(),
            created_at,
        })
    }

    async fn list_comments(&self, memory_id: &str) -> Result<Vec<MemoryCommentRecord>> {
        let rows = sqlx::query(
            "SELECT id, memory_id, author_id, body, created_at FROM memory_comments
             WHERE memory_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(memory_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Self::map_comment_row).collect())
    }
}
