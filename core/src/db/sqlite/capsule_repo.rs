use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Pool, QueryBuilder, Row, Sqlite, sqlite::SqliteRow};
use std::str::FromStr;

use crate::{
    capsule::{CapsuleRecord, CapsuleVisibility, ContributorWithUser},
    db::capsule_repo::{CapsuleRepository, CreateCapsuleParams, UpdateCapsuleParams},
    ids::{CapsuleId, UserId},
    membership::CapsuleRole,
};

pub struct SqliteCapsuleRepository {
    pool: Pool<Sqlite>,
}

impl SqliteCapsuleRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn map_capsule_row(row: SqliteRow) -> Result<CapsuleRecord> {
        Ok(CapsuleRecord {
            id: CapsuleId::from(row.get::<String, _>("id")),
            title: row.get("title"),
            description: row.get("description"),
            owner_id: UserId::from(row.get::<String, _>("owner_id")),
            visibility: CapsuleVisibility::from_str(row.get::<String, _>("visibility").as_str())?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn map_contributor_row(row: SqliteRow) -> Result<ContributorWithUser> {
        Ok(ContributorWithUser {
            capsule_id: CapsuleId::from(row.get::<String, _>("capsule_id")),
            user_id: UserId::from(row.get::<String, _>("user_id")),
            role: CapsuleRole::from_str(row.get::<String, _>("role").as_str())?,
            added_at: row.get("added_at"),
            email: row.get("email"),
            name: row.get("name"),
            avatar_url: row.get("avatar_url"),
        })
    }
}

#[async_trait]
impl CapsuleRepository for SqliteCapsuleRepository {
    async fn create_capsule(&self, params: CreateCapsuleParams) -> Result<CapsuleRecord> {
        let CreateCapsuleParams {
            id,
            owner_id,
            title,
            description,
            visibility,
            created_at,
        } = params;

        sqlx::query(
            "INSERT INTO capsules (id, title, description, owner_id, visibility, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&title)
        .bind(description.as_ref())
        .bind(&owner_id)
        .bind(visibility.as_str())
        .bind(created_at)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(CapsuleRecord {
            id: CapsuleId::from(id),
            title,
            description,
            owner_id: UserId::from(owner_id),
            visibility,
            created_at,
            updated_at: created_at,
        })
    }

    async fn fetch_capsule(&self, id: &str) -> Result<Option<CapsuleRecord>> {
        let row = sqlx::query(
            "SELECT id, title, description, owner_id, visibility, created_at, updated_at
             FROM capsules WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::map_capsule_row).transpose()
    }

    async fn list_capsules_for_user(&self, user_id: &str) -> Result<Vec<CapsuleRecord>> {
        let rows = sqlx::query(
            "SELECT DISTINCT c.id, c.title, c.description, c.owner_id, c.visibility, c.created_at, c.updated_at
             FROM capsules c
             LEFT JOIN capsule_contributors cc ON cc.capsule_id = c.id
             WHERE c.owner_id = ? OR cc.user_id = ?
             ORDER BY c.created_at DESC",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::map_capsule_row).collect()
    }

    async fn list_capsule_ids_for_user(&self, user_id: &str) -> Result<Vec<CapsuleId>> {
        let rows = sqlx::query(
            "SELECT id FROM capsules WHERE owner_id = ?
             UNION
             SELECT capsule_id FROM capsule_contributors WHERE user_id = ?",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| CapsuleId::from(row.get::<String, _>(0)))
            .collect())
    }

    async fn update_capsule(&self, params: UpdateCapsuleParams) -> Result<bool> {
        let UpdateCapsuleParams {
            id,
            title,
            description,
            visibility,
            updated_at,
        } = params;

        let mut builder = QueryBuilder::new("UPDATE capsules SET ");
        let mut has_updates = false;

        if let Some(title) = title {
            builder.push("title = ");
            builder.push_bind(title);
            has_updates = true;
        }
        if let Some(description) = description {
            if has_updates {
                builder.push(", ");
            }
            builder.push("description = ");
            builder.push_bind(description);
            has_updates = true;
        }
        if let Some(visibility) = visibility {
            if has_updates {
                builder.push(", ");
            }
            builder.push("visibility = ");
            builder.push_bind(visibility.as_str());
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

    async fn delete_capsule(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM memory_reactions WHERE memory_id IN
                 (SELECT id FROM memories WHERE capsule_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM memory_comments WHERE memory_id IN
                 (SELECT id FROM memories WHERE capsule_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM memories WHERE capsule_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM capsule_contributors WHERE capsule_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM capsules WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_contributors(&self, capsule_id: &str) -> Result<Vec<ContributorWithUser>> {
        let rows = sqlx::query(
            "SELECT cc.capsule_id, cc.user_id, cc.role, cc.added_at, u.email, u.name, u.avatar_url
             FROM capsule_contributors cc
             JOIN users u ON u.id = cc.user_id
             WHERE cc.capsule_id = ?
             ORDER BY cc.added_at ASC",
        )
        .bind(capsule_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::map_contributor_row).collect()
    }

    async fn find_contributor_role(
        &self,
        capsule_id: &str,
        user_id: &str,
    ) -> Result<Option<CapsuleRole>> {
        let role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM capsule_contributors WHERE capsule_id = ? AND user_id = ?",
        )
        .bind(capsule_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        role.map(|value| CapsuleRole::from_str(&value)).transpose()
    }

    async fn upsert_contributor(
        &self,
        capsule_id: &str,
        user_id: &str,
        role: CapsuleRole,
        added_at: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO capsule_contributors (capsule_id, user_id, role, added_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(capsule_id, user_id) DO UPDATE SET role = excluded.role",
        )
        .bind(capsule_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(added_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_contributor(&self, capsule_id: &str, user_id: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM capsule_contributors WHERE capsule_id = ? AND user_id = ?")
                .bind(capsule_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
