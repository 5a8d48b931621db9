// Authentication and authorization logic

use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{
        Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        rand_core::OsRng,
    },
};
use axum::http::HeaderMap;
use memoryscape_core::{capsule::CapsuleStore, membership::CapsuleRole, user};

use crate::{
    error::AppError,
    state::{AppState, SocketRuntimeState},
    types::{AuthenticatedRestSession, CapsuleAccess, SessionLookup},
    user::service::UserService,
};

pub(crate) trait AuthState: Send + Sync {
    fn user_service(&self) -> &UserService;
    fn capsule_store(&self) -> &CapsuleStore;
}

impl AuthState for AppState {
    fn user_service(&self) -> &UserService {
        self.user_service.as_ref()
    }

    fn capsule_store(&self) -> &CapsuleStore {
        &self.capsule_store
    }
}

impl AuthState for SocketRuntimeState {
    fn user_service(&self) -> &UserService {
        self.user_service.as_ref()
    }

    fn capsule_store(&self) -> &CapsuleStore {
        &self.capsule_store
    }
}

impl<T> AuthState for Arc<T>
where
    T: AuthState + ?Sized,
{
    fn user_service(&self) -> &UserService {
        (**self).user_service()
    }

    fn capsule_store(&self) -> &CapsuleStore {
        (**self).capsule_store()
    }
}

pub(crate) async fn authenticate_rest_request<S>(
    state: &S,
    headers: &HeaderMap,
) -> Result<AuthenticatedRestSession, AppError>
where
    S: AuthState,
{
    state
        .user_service()
        .authenticate_rest_request(headers)
        .await
}

/// Resolve a user's effective role on a capsule. The owner outranks the
/// contributor table; everyone else is looked up there.
pub(crate) async fn resolve_capsule_access<S>(
    state: &S,
    capsule_id: &str,
    user_id: &str,
) -> Result<CapsuleAccess, AppError>
where
    S: AuthState,
{
    let Some(capsule) = state
        .capsule_store()
        .find_by_id(capsule_id)
        .await
        .map_err(AppError::from_anyhow)?
    else {
        return Err(AppError::capsule_not_found(capsule_id));
    };

    let role = if capsule.owner_id.as_str() == user_id {
        Some(CapsuleRole::Owner)
    } else {
        state
            .capsule_store()
            .find_contributor_role(capsule_id, user_id)
            .await
            .map_err(AppError::from_anyhow)?
    };

    Ok(CapsuleAccess { capsule, role })
}

/// Same as [`resolve_capsule_access`] but a missing role is an error.
pub(crate) async fn require_capsule_member<S>(
    state: &S,
    capsule_id: &str,
    user_id: &str,
) -> Result<(CapsuleAccess, CapsuleRole), AppError>
where
    S: AuthState,
{
    let access = resolve_capsule_access(state, capsule_id, user_id).await?;
    let Some(role) = access.role else {
        return Err(AppError::capsule_access_denied(capsule_id));
    };
    Ok((access, role))
}

pub(crate) async fn require_capsule_role<S>(
    state: &S,
    capsule_id: &str,
    user_id: &str,
    minimum: CapsuleRole,
) -> Result<CapsuleAccess, AppError>
where
    S: AuthState,
{
    let (access, role) = require_capsule_member(state, capsule_id, user_id).await?;
    if role < minimum {
        return Err(AppError::capsule_access_denied(capsule_id));
    }
    Ok(access)
}

pub(crate) async fn authenticate_with_password(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<(user::UserRecord, user::SessionRecord), AppError> {
    let Some(user) = state
        .user_store
        .find_by_email(email)
        .await
        .map_err(AppError::from_anyhow)?
    else {
        return Err(AppError::unauthorized("invalid credentials"));
    };

    if user.disabled {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    if user.password_hash.trim().is_empty() {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let parsed_hash =
        PasswordHash::new(&user.password_hash).map_err(|err| AppError::internal(err.into()))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::unauthorized("invalid credentials"))?;

    let session = state
        .user_store
        .create_session(&user.id)
        .await
        .map_err(AppError::from_anyhow)?;

    Ok((user, session))
}

pub(crate) async fn pad_session_response(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<SessionLookup, AppError> {
    state.user_service.pad_session_response(headers).await
}

pub fn generate_password_hash(password: &str) -> Result<String, PasswordHashError> {
    let mut rng = OsRng;
    let salt = SaltString::generate(&mut rng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}
