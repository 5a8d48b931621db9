use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::memory::{
    MemoryCommentRecord, MemoryKind, MemoryRecord, ReactionRecord, ReactionToggle,
};

#[derive(Debug, Clone)]
pub struct CreateMemoryParams {
    pub id: String,
    pub capsule_id: String,
    pub created_by: String,
    pub kind: MemoryKind,
    pub title: Option<String>,
    pub body: Option<String>,
    pub media_url: Option<String>,
    pub tags: Vec<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct UpdateMemoryParams {
    pub id: String,
    pub title: Option<Option<String>>,
    pub body: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub updated_at: i64,
}

#[async_trait]
pub trait MemoryRepository: Send + Sync {
    async fn create_memory(&self, params: CreateMemoryParams) -> Result<MemoryRecord>;

    async fn fetch_memory(&self, id: &str) -> Result<Option<MemoryRecord>>;

    async fn list_memories(&self, capsule_id: &str) -> Result<Vec<MemoryRecord>>;

    async fn update_memory(&self, params: UpdateMemoryParams) -> Result<bool>;

    async fn delete_memory(&self, id: &str) -> Result<bool>;

    async fn set_pinned(&self, id: &str, pinned: bool, updated_at: i64) -> Result<bool>;

    async fn toggle_reaction(
        &self,
        memory_id: &str,
        user_id: &str,
        emoji: &str,
        created_at: i64,
    ) -> Result<ReactionToggle>;

    async fn list_reactions(&self, memory_id: &str) -> Result<Vec<ReactionRecord>>;

    async fn create_comment(
        &self,
        id: String,
        memory_id: &str,
        author_id: &str,
        body: &str,
        created_at: i64,
    ) -> Result<MemoryCommentRecord>;

    async fn list_comments(&self, memory_id: &str) -> Result<Vec<MemoryCommentRecord>>;
}

pub type MemoryRepositoryRef = Arc<dyn MemoryRepository>;
