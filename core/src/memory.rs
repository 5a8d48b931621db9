use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::{
    db::{
        Database,
        memory_repo::{CreateMemoryParams, MemoryRepositoryRef, UpdateMemoryParams},
    },
    ids::{CapsuleId, MemoryId, UserId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Text,
    Image,
    Video,
    Audio,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl FromStr for MemoryKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            other => Err(anyhow::anyhow!("unknown memory kind: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryRecord {
    pub id: MemoryId,
    pub capsule_id: CapsuleId,
    pub kind: MemoryKind,
    pub title: Option<String>,
    pub body: Option<String>,
    pub media_url: Option<String>,
    pub tags: Vec<String>,
    pub pinned: bool,
    pub created_by: UserId,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct ReactionRecord {
    pub memory_id: MemoryId,
    pub user_id: UserId,
    pub emoji: String,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct MemoryCommentRecord {
    pub id: String,
    pub memory_id: MemoryId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: i64,
}

/// Outcome of a reaction toggle: posting the same (user, emoji) pair
/// twice removes the reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionToggle {
    Added,
    Removed,
}

#[derive(Clone)]
pub struct MemoryStore {
    memory_repo: MemoryRepositoryRef,
}

impl MemoryStore {
    pub fn new(database: &Database) -> Self {
        Self {
            memory_repo: database.repositories().memory_repo(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        capsule_id: &str,
        created_by: &str,
        kind: MemoryKind,
        title: Option<&str>,
        body: Option<&str>,
        media_url: Option<&str>,
        tags: Vec<String>,
    ) -> Result<MemoryRecord> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().timestamp();

        self.memory_repo
            .create_memory(CreateMemoryParams {
                id,
                capsule_id: capsule_id.to_owned(),
                created_by: created_by.to_owned(),
                kind,
                title: title.map(ToOwned::to_owned),
                body: body.map(ToOwned::to_owned),
                media_url: media_url.map(ToOwned::to_owned),
                tags,
                created_at,
            })
            .await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<MemoryRecord>> {
        self.memory_repo.fetch_memory(id).await
    }

    /// Pinned memories first, then newest first.
    pub async fn list_for_capsule(&self, capsule_id: &str) -> Result<Vec<MemoryRecord>> {
        self.memory_repo.list_memories(capsule_id).await
    }

    pub async fn update(
        &self,
        id: &str,
        title: Option<Option<&str>>,
        body: Option<Option<&str>>,
        tags: Option<Vec<String>>,
    ) -> Result<Option<MemoryRecord>> {
        let has_updates = title.is_some() || body.is_some() || tags.is_some();
        if !has_updates {
            return self.find_by_id(id).await;
        }

        let updated = self
            .memory_repo
            .update_memory(UpdateMemoryParams {
                id: id.to_owned(),
                title: title.map(|value| value.map(ToOwned::to_owned)),
                body: body.map(|value| value.map(ToOwned::to_owned)),
                tags,
                updated_at: Utc::now().timestamp(),
            })
            .await?;

        if !updated {
            return Ok(None);
        }

        self.find_by_id(id).await
    }

    /// Fill in generated title/summary/tags without clobbering fields the
    /// author already wrote. Returns the refreshed record when the row
    /// still exists.
    pub async fn apply_caption(
        &self,
        id: &str,
        title: Option<&str>,
        summary: Option<&str>,
        tags: Vec<String>,
    ) -> Result<Option<MemoryRecord>> {
        let Some(existing) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let title = match (&existing.title, title) {
            (None, Some(generated)) => Some(Some(generated)),
            _ => None,
        };
        let body = match (&existing.body, summary) {
            (None, Some(generated)) => Some(Some(generated)),
            _ => None,
        };
        let tags = if existing.tags.is_empty() && !tags.is_empty() {
            Some(tags)
        } else {
            None
        };

        self.update(id, title, body, tags).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.memory_repo.delete_memory(id).await
    }

    pub async fn set_pinned(&self, id: &str, pinned: bool) -> Result<bool> {
        self.memory_repo
            .set_pinned(id, pinned, Utc::now().timestamp())
            .await
    }

    pub async fn toggle_reaction(
        &self,
        memory_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> Result<ReactionToggle> {
        self.memory_repo
            .toggle_reaction(memory_id, user_id, emoji, Utc::now().timestamp())
            .await
    }

    pub async fn list_reactions(&self, memory_id: &str) -> Result<Vec<ReactionRecord>> {
        self.memory_repo.list_reactions(memory_id).await
    }

    pub async fn add_comment(
        &self,
        memory_id: &str,
        author_id: &str,
        body: &str,
    ) -> Result<MemoryCommentRecord> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().timestamp();
        self.memory_repo
            .create_comment(id, memory_id, author_id, body, created_at)
            .await
    }

    pub async fn list_comments(&self, memory_id: &str) -> Result<Vec<MemoryCommentRecord>> {
        self.memory_repo.list_comments(memory_id).await
    }
}
