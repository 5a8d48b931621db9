use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::{
    capsule::{CapsuleRecord, CapsuleVisibility, ContributorWithUser},
    ids::CapsuleId,
    membership::CapsuleRole,
};

#[derive(Debug, Clone)]
pub struct CreateCapsuleParams {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub visibility: CapsuleVisibility,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct UpdateCapsuleParams {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub visibility: Option<CapsuleVisibility>,
    pub updated_at: i64,
}

#[async_trait]
pub trait CapsuleRepository: Send + Sync {
    async fn create_capsule(&self, params: CreateCapsuleParams) -> Result<CapsuleRecord>;

    async fn fetch_capsule(&self, id: &str) -> Result<Option<CapsuleRecord>>;

    async fn list_capsules_for_user(&self, user_id: &str) -> Result<Vec<CapsuleRecord>>;

    async fn list_capsule_ids_for_user(&self, user_id: &str) -> Result<Vec<CapsuleId>>;

    async fn update_capsule(&self, params: UpdateCapsuleParams) -> Result<bool>;

    async fn delete_capsule(&self, id: &str) -> Result<bool>;

    async fn list_contributors(&self, capsule_id: &str) -> Result<Vec<ContributorWithUser>>;

    async fn find_contributor_role(
        &self,
        capsule_id: &str,
        user_id: &str,
    ) -> Result<Option<CapsuleRole>>;

    async fn upsert_contributor(
        &self,
        capsule_id: &str,
        user_id: &str,
        role: CapsuleRole,
        added_at: i64,
    ) -> Result<()>;

    async fn delete_contributor(&self, capsule_id: &str, user_id: &str) -> Result<bool>;
}

pub type CapsuleRepositoryRef = Arc<dyn CapsuleRepository>;
