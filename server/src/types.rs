// Request and response types for REST API handlers

use memoryscape_core::{
    capsule::{CapsuleRecord, CapsuleVisibility, ContributorWithUser},
    memory::{MemoryCommentRecord, MemoryKind, MemoryRecord, ReactionRecord, ReactionToggle},
    membership::CapsuleRole,
    notification::NotificationRecord,
    user,
};
use serde::{Deserialize, Serialize};

// ========== Authentication Types ==========

pub struct AuthenticatedRestSession {
    pub(crate) user: user::UserRecord,
    pub(crate) set_cookies: Vec<String>,
}

/// Outcome of resolving a user against a capsule: the capsule row plus the
/// effective role, if any.
#[derive(Clone, Debug)]
pub(crate) struct CapsuleAccess {
    pub(crate) capsule: CapsuleRecord,
    pub(crate) role: Option<CapsuleRole>,
}

pub(crate) struct SessionLookup {
    pub(crate) user: Option<SessionUser>,
    pub(crate) cookies: Vec<String>,
}

// ========== Request Types ==========

#[derive(Deserialize)]
pub(crate) struct CreateUserRequest {
    pub(crate) email: String,
    pub(crate) password: String,
    #[serde(default)]
    pub(crate) name: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct CreateAdminUserRequest {
    pub(crate) email: String,
    pub(crate) password: String,
}

#[derive(Deserialize)]
pub(crate) struct CreateSessionRequest {
    pub(crate) email: String,
    pub(crate) password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignInRequest {
    pub(crate) email: String,
    #[serde(default)]
    pub(crate) password: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct PreflightRequest {
    pub(crate) email: String,
}

#[derive(Deserialize, Default)]
pub(crate) struct DeleteSessionRequest {
    #[serde(default)]
    pub(crate) session_id: Option<String>,
    #[serde(default)]
    pub(crate) user_id: Option<String>,
}

#[derive(Deserialize, Default)]
pub(crate) struct RefreshSessionRequest {
    #[serde(default)]
    pub(crate) session_id: Option<String>,
    #[serde(default)]
    pub(crate) user_id: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateProfileRequest {
    #[serde(default, with = "double_option")]
    pub(crate) name: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    pub(crate) avatar_url: Option<Option<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateCapsuleRequest {
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) visibility: Option<CapsuleVisibility>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateCapsuleRequest {
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default, with = "double_option")]
    pub(crate) description: Option<Option<String>>,
    #[serde(default)]
    pub(crate) visibility: Option<CapsuleVisibility>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SetContributorRequest {
    pub(crate) user_id: String,
    pub(crate) role: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateMemoryRequest {
    pub(crate) kind: MemoryKind,
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) body: Option<String>,
    #[serde(default)]
    pub(crate) media_url: Option<String>,
    #[serde(default)]
    pub(crate) tags: Vec<String>,
    /// Request an AI caption once the memory is stored.
    #[serde(default)]
    pub(crate) caption: bool,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateMemoryRequest {
    #[serde(default, with = "double_option")]
    pub(crate) title: Option<Option<String>>,
    #[serde(default, with = "double_option")]
    pub(crate) body: Option<Option<String>>,
    #[serde(default)]
    pub(crate) tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub(crate) struct ReactionRequest {
    pub(crate) emoji: String,
}

#[derive(Deserialize)]
pub(crate) struct CreateCommentRequest {
    pub(crate) body: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SetPinnedRequest {
    pub(crate) pinned: bool,
}

#[derive(Deserialize, Default)]
pub(crate) struct ListNotificationsQuery {
    #[serde(default)]
    pub(crate) limit: Option<i64>,
}

// ========== Response Types ==========

#[derive(Serialize)]
pub(crate) struct CreateUserResponse {
    pub(crate) id: String,
    pub(crate) email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PreflightResponse {
    pub(crate) registered: bool,
    pub(crate) has_password: bool,
}

#[derive(Serialize)]
pub(crate) struct CreateSessionResponse {
    pub(crate) session_id: String,
    pub(crate) user_id: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub(crate) id: String,
    pub(crate) email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) avatar_url: Option<String>,
    pub(crate) disabled: bool,
    pub(crate) has_password: bool,
}

impl From<&user::UserRecord> for SessionUser {
    fn from(record: &user::UserRecord) -> Self {
        Self {
            id: record.id.clone(),
            email: record.email.clone(),
            name: record.name.clone(),
            avatar_url: record.avatar_url.clone(),
            disabled: record.disabled,
            has_password: !record.password_hash.trim().is_empty(),
        }
    }
}

#[derive(Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionUserPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) user: Option<SessionUser>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserResponse {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) avatar_url: Option<String>,
    pub(crate) disabled: bool,
}

impl From<user::UserRecord> for UserResponse {
    fn from(record: user::UserRecord) -> Self {
        let name = record
            .name
            .clone()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| {
                record
                    .email
                    .split('@')
                    .next()
                    .unwrap_or(record.email.as_str())
                    .to_owned()
            });
        Self {
            id: record.id,
            email: record.email,
            name,
            avatar_url: record.avatar_url,
            disabled: record.disabled,
        }
    }
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapsuleResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) description: Option<String>,
    pub(crate) owner_id: String,
    pub(crate) visibility: CapsuleVisibility,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}

impl From<CapsuleRecord> for CapsuleResponse {
    fn from(record: CapsuleRecord) -> Self {
        Self {
            id: record.id.into(),
            title: record.title,
            description: record.description,
            owner_id: record.owner_id.into(),
            visibility: record.visibility,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Serialize)]
pub(crate) struct CapsuleListResponse {
    pub(crate) capsules: Vec<CapsuleResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ContributorResponse {
    pub(crate) user_id: String,
    pub(crate) role: String,
    pub(crate) added_at: i64,
    pub(crate) email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) avatar_url: Option<String>,
}

impl From<ContributorWithUser> for ContributorResponse {
    fn from(record: ContributorWithUser) -> Self {
        Self {
            user_id: record.user_id.into(),
            role: record.role.as_str().to_owned(),
            added_at: record.added_at,
            email: record.email,
            name: record.name,
            avatar_url: record.avatar_url,
        }
    }
}

#[derive(Serialize)]
pub(crate) struct ContributorListResponse {
    pub(crate) contributors: Vec<ContributorResponse>,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryResponse {
    pub(crate) id: String,
    pub(crate) capsule_id: String,
    pub(crate) kind: MemoryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) media_url: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) pinned: bool,
    pub(crate) created_by: String,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}

impl From<MemoryRecord> for MemoryResponse {
    fn from(record: MemoryRecord) -> Self {
        Self {
            id: record.id.into(),
            capsule_id: record.capsule_id.into(),
            kind: record.kind,
            title: record.title,
            body: record.body,
            media_url: record.media_url,
            tags: record.tags,
            pinned: record.pinned,
            created_by: record.created_by.into(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Serialize)]
pub(crate) struct MemoryListResponse {
    pub(crate) memories: Vec<MemoryResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReactionResponse {
    pub(crate) user_id: String,
    pub(crate) emoji: String,
    pub(crate) created_at: i64,
}

impl From<ReactionRecord> for ReactionResponse {
    fn from(record: ReactionRecord) -> Self {
        Self {
            user_id: record.user_id.into(),
            emoji: record.emoji,
            created_at: record.created_at,
        }
    }
}

#[derive(Serialize)]
pub(crate) struct ToggleReactionResponse {
    pub(crate) action: ReactionToggle,
    pub(crate) reactions: Vec<ReactionResponse>,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub(crate) id: String,
    pub(crate) memory_id: String,
    pub(crate) author_id: String,
    pub(crate) body: String,
    pub(crate) created_at: i64,
}

impl From<MemoryCommentRecord> for CommentResponse {
    fn from(record: MemoryCommentRecord) -> Self {
        Self {
            id: record.id,
            memory_id: record.memory_id.into(),
            author_id: record.author_id.into(),
            body: record.body,
            created_at: record.created_at,
        }
    }
}

#[derive(Serialize)]
pub(crate) struct CommentListResponse {
    pub(crate) comments: Vec<CommentResponse>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NotificationResponse {
    pub(crate) id: String,
    pub(crate) kind: String,
    pub(crate) payload: serde_json::Value,
    pub(crate) read: bool,
    pub(crate) created_at: i64,
}

impl From<NotificationRecord> for NotificationResponse {
    fn from(record: NotificationRecord) -> Self {
        Self {
            id: record.id,
            kind: record.kind,
            payload: record.payload,
            read: record.read,
            created_at: record.created_at,
        }
    }
}

#[derive(Serialize)]
pub(crate) struct NotificationListResponse {
    pub(crate) notifications: Vec<NotificationResponse>,
}

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
}

/// Distinguishes "field absent" from "field set to null" in PATCH bodies.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub(crate) fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
