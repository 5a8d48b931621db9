use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::{
    db::{
        Database,
        capsule_repo::{CapsuleRepositoryRef, CreateCapsuleParams, UpdateCapsuleParams},
    },
    ids::{CapsuleId, UserId},
    membership::CapsuleRole,
};

pub const DEFAULT_CAPSULE_TITLE: &str = "Untitled Capsule";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapsuleVisibility {
    Public,
    Private,
    Timed,
}

impl CapsuleVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Timed => "timed",
        }
    }
}

impl FromStr for CapsuleVisibility {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            "timed" => Ok(Self::Timed),
            other => Err(anyhow::anyhow!("unknown capsule visibility: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapsuleRecord {
    pub id: CapsuleId,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: UserId,
    pub visibility: CapsuleVisibility,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct ContributorRecord {
    pub capsule_id: CapsuleId,
    pub user_id: UserId,
    pub role: CapsuleRole,
    pub added_at: i64,
}

/// Contributor row joined with the user profile, for member listings.
#[derive(Debug, Clone)]
pub struct ContributorWithUser {
    pub capsule_id: CapsuleId,
    pub user_id: UserId,
    pub role: CapsuleRole,
    pub added_at: i64,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Clone)]
pub struct CapsuleStore {
    capsule_repo: CapsuleRepositoryRef,
}

impl CapsuleStore {
    pub fn new(database: &Database) -> Self {
        Self {
            capsule_repo: database.repositories().capsule_repo(),
        }
    }

    pub async fn create(
        &self,
        owner_id: &str,
        title: Option<&str>,
        description: Option<&str>,
        visibility: Option<CapsuleVisibility>,
    ) -> Result<CapsuleRecord> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().timestamp();
        let resolved_title = title
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| DEFAULT_CAPSULE_TITLE.to_string());

        self.capsule_repo
            .create_capsule(CreateCapsuleParams {
                id,
                owner_id: owner_id.to_owned(),
                title: resolved_title,
                description: description
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(ToOwned::to_owned),
                visibility: visibility.unwrap_or(CapsuleVisibility::Private),
                created_at,
            })
            .await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<CapsuleRecord>> {
        self.capsule_repo.fetch_capsule(id).await
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<CapsuleRecord>> {
        self.capsule_repo.list_capsules_for_user(user_id).await
    }

    /// Capsule ids the user may enter: everything they own plus every
    /// capsule they are listed on as a contributor.
    pub async fn list_ids_for_user(&self, user_id: &str) -> Result<Vec<CapsuleId>> {
        self.capsule_repo.list_capsule_ids_for_user(user_id).await
    }

    pub async fn update(
        &self,
        id: &str,
        title: Option<&str>,
        description: Option<Option<&str>>,
        visibility: Option<CapsuleVisibility>,
    ) -> Result<Option<CapsuleRecord>> {
        let normalized_title = title
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| value.to_owned());
        let normalized_description =
            description.map(|value| value.map(|inner| inner.trim().to_owned()));

        let has_updates =
            normalized_title.is_some() || normalized_description.is_some() || visibility.is_some();
        if !has_updates {
            return self.find_by_id(id).await;
        }

        let updated = self
            .capsule_repo
            .update_capsule(UpdateCapsuleParams {
                id: id.to_owned(),
                title: normalized_title,
                description: normalized_description,
                visibility,
                updated_at: Utc::now().timestamp(),
            })
            .await?;

        if !updated {
            return Ok(None);
        }

        self.find_by_id(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.capsule_repo.delete_capsule(id).await
    }

    pub async fn list_contributors(&self, capsule_id: &str) -> Result<Vec<ContributorWithUser>> {
        self.capsule_repo.list_contributors(capsule_id).await
    }

    pub async fn find_contributor_role(
        &self,
        capsule_id: &str,
        user_id: &str,
    ) -> Result<Option<CapsuleRole>> {
        self.capsule_repo
            .find_contributor_role(capsule_id, user_id)
            .await
    }

    pub async fn set_contributor(
        &self,
        capsule_id: &str,
        user_id: &str,
        role: CapsuleRole,
    ) -> Result<()> {
        self.capsule_repo
            .upsert_contributor(capsule_id, user_id, role, Utc::now().timestamp())
            .await
    }

    pub async fn remove_contributor(&self, capsule_id: &str, user_id: &str) -> Result<bool> {
        self.capsule_repo
            .delete_contributor(capsule_id, user_id)
            .await
    }
}
