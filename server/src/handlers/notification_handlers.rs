// Notification inbox handlers

use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::{
    auth::authenticate_rest_request,
    error::AppError,
    http::append_set_cookie_headers,
    state::AppState,
    types::{ListNotificationsQuery, NotificationListResponse, NotificationResponse},
};

const DEFAULT_NOTIFICATION_LIMIT: i64 = 50;
const MAX_NOTIFICATION_LIMIT: i64 = 200;

pub(crate) async fn list_notifications_handler(
    State(state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_NOTIFICATION_LIMIT)
        .clamp(1, MAX_NOTIFICATION_LIMIT);

    let notifications = state
        .notification_store
        .list_for_user(&auth.user.id, limit)
        .await
        .map_err(AppError::from_anyhow)?;

    let mut response = Json(NotificationListResponse {
        notifications: notifications
            .into_iter()
            .map(NotificationResponse::from)
            .collect(),
    })
    .into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

pub(crate) async fn mark_notifications_read_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;

    let updated = state
        .notification_store
        .mark_all_read(&auth.user.id)
        .await
        .map_err(AppError::from_anyhow)?;

    let mut response = Json(json!({ "updated": updated })).into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}
