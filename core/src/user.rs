use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use sqlx::{Pool, QueryBuilder, Row, Sqlite, sqlite::SqliteRow};
use uuid::Uuid;

use crate::db::Database;

pub const SESSION_TTL_SECONDS: i64 = 60 * 60 * 24 * 14;

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub disabled: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl SessionRecord {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

#[derive(Clone)]
pub struct UserStore {
    pool: Pool<Sqlite>,
}

impl UserStore {
    pub fn new(database: &Database) -> Self {
        Self {
            pool: database.pool().clone(),
        }
    }

    pub async fn create(
        &self,
        email: &str,
        password_hash: &str,
        name: Option<&str>,
    ) -> Result<UserRecord> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().timestamp();

        sqlx::query(
            "INSERT INTO users (id, email, password_hash, created_at, name) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(password_hash)
        .bind(created_at)
        .bind(name)
        .execute(&self.pool)
        .await
        .with_context(|| "failed to insert user".to_string())?;

        Ok(UserRecord {
            id,
            email: email.to_owned(),
            password_hash: password_hash.to_owned(),
            name: name.map(|value| value.to_owned()),
            avatar_url: None,
            disabled: false,
            created_at,
        })
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, name, avatar_url, disabled, created_at \
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::map_row))
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, name, avatar_url, disabled, created_at \
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::map_row))
    }

    pub async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<UserRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::new(
            "SELECT id, email, password_hash, name, avatar_url, disabled, created_at FROM users WHERE id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        builder.push(")");

        let rows = builder.build().fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(Self::map_row).collect())
    }

    pub async fn update_profile(
        &self,
        user_id: &str,
        name: Option<Option<&str>>,
        avatar_url: Option<Option<&str>>,
    ) -> Result<UserRecord> {
        let mut builder = QueryBuilder::new("UPDATE users SET ");
        let mut has_updates = false;

        if let Some(name) = name {
            builder.push("name = ");
            builder.push_bind(name.map(ToOwned::to_owned));
            has_updates = true;
        }
        if let Some(avatar_url) = avatar_url {
            if has_updates {
                builder.push(", ");
            }
            builder.push("avatar_url = ");
            builder.push_bind(avatar_url.map(ToOwned::to_owned));
            has_updates = true;
        }

        if has_updates {
            builder.push(" WHERE id = ");
            builder.push_bind(user_id);
            builder.build().execute(&self.pool).await?;
        }

        self.find_by_id(user_id)
            .await?
            .ok_or_else(|| anyhow!("user not found"))
    }

    pub async fn create_session(&self, user_id: &str) -> Result<SessionRecord> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().timestamp();
        let expires_at = created_at + SESSION_TTL_SECONDS;

        sqlx::query(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(SessionRecord {
            id,
            user_id: user_id.to_owned(),
            created_at,
            expires_at,
        })
    }

    pub async fn find_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let row =
            sqlx::query("SELECT id, user_id, created_at, expires_at FROM sessions WHERE id = ?")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;

        let now = Utc::now().timestamp();

        let record = row.map(|row| SessionRecord {
            id: row.get("id"),
            user_id: row.get("user_id"),
            created_at: row.get::<i64, _>("created_at"),
            expires_at: row.get::<i64, _>("expires_at"),
        });

        if let Some(record) = record {
            if record.is_expired(now) {
                self.delete_session(&record.id).await?;
                Ok(None)
            } else {
                Ok(Some(record))
            }
        } else {
            Ok(None)
        }
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_sessions_by_user(&self, user_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn refresh_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        if let Some(mut record) = self.find_session(session_id).await? {
            record.expires_at = Utc::now().timestamp() + SESSION_TTL_SECONDS;
            sqlx::query("UPDATE sessions SET expires_at = ? WHERE id = ?")
                .bind(record.expires_at)
                .bind(session_id)
                .execute(&self.pool)
                .await?;
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64> {
        let now = Utc::now().timestamp();
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn add_admin(&self, user_id: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            "INSERT INTO admin_users (user_id, created_at)
             VALUES (?, ?)
             ON CONFLICT(user_id) DO UPDATE SET created_at = excluded.created_at",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn is_admin(&self, user_id: &str) -> Result<bool> {
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM admin_users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(exists.is_some())
    }
}

impl UserStore {
    fn map_row(row: SqliteRow) -> UserRecord {
        let disabled = row.get::<i64, _>("disabled") != 0;
        UserRecord {
            id: row.get("id"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            name: row.get::<Option<String>, _>("name"),
            avatar_url: row.get::<Option<String>, _>("avatar_url"),
            disabled,
            created_at: row.get::<i64, _>("created_at"),
        }
    }
}
