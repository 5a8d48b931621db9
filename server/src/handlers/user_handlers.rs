// User account and profile handlers

use argon2::password_hash::Error as PasswordHashError;
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::{
    auth::{authenticate_rest_request, generate_password_hash},
    cookies::{build_session_cookie, build_user_cookie},
    error::AppError,
    http::append_set_cookie_headers,
    state::AppState,
    types::{CreateUserRequest, SessionUser, UpdateProfileRequest, UserResponse},
    user::helpers::is_valid_email,
};

pub(crate) async fn create_user_handler(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Response, AppError> {
    let email = payload.email.trim();
    if !is_valid_email(email) {
        return Err(AppError::bad_request("invalid email address"));
    }

    if payload.password.is_empty() {
        return Err(AppError::bad_request("password is required"));
    }

    if state
        .user_store
        .find_by_email(email)
        .await
        .map_err(AppError::from_anyhow)?
        .is_some()
    {
        return Err(AppError::conflict("email address already registered"));
    }

    let password_hash = generate_password_hash(&payload.password)
        .map_err(|err: PasswordHashError| AppError::internal(err.into()))?;

    let user = state
        .user_store
        .create(email, &password_hash, payload.name.as_deref())
        .await
        .map_err(AppError::from_anyhow)?;

    let session = state
        .user_store
        .create_session(&user.id)
        .await
        .map_err(AppError::from_anyhow)?;

    let cookies = vec![
        build_session_cookie(&session.id, session.expires_at),
        build_user_cookie(&user.id, session.expires_at),
    ];

    let mut response = (StatusCode::CREATED, Json(SessionUser::from(&user))).into_response();
    append_set_cookie_headers(&mut response, &cookies)?;
    Ok(response)
}

pub(crate) async fn get_user_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;

    let user = state.user_service.fetch_user(&user_id).await?;

    let mut response = Json(UserResponse::from(user)).into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

pub(crate) async fn update_profile_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;

    state
        .user_service
        .ensure_self_or_admin(&auth.user.id, &user_id, "cannot update another user's profile")
        .await?;

    // Confirm the target exists before touching the row.
    state.user_service.fetch_user(&user_id).await?;

    let name = payload
        .name
        .as_ref()
        .map(|value| value.as_deref().map(str::trim).filter(|s| !s.is_empty()));
    let avatar_url = payload
        .avatar_url
        .as_ref()
        .map(|value| value.as_deref());

    let updated = state
        .user_store
        .update_profile(&user_id, name, avatar_url)
        .await
        .map_err(AppError::from_anyhow)?;

    let mut response = Json(UserResponse::from(updated)).into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}
