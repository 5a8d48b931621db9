// Capsule management handlers

use std::str::FromStr;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use memoryscape_core::{capsule::CapsuleVisibility, membership::CapsuleRole};

use crate::{
    auth::{authenticate_rest_request, require_capsule_member, require_capsule_role,
        resolve_capsule_access},
    error::AppError,
    http::append_set_cookie_headers,
    socket::broadcast::DomainEvent,
    state::AppState,
    types::{
        CapsuleAccess, CapsuleListResponse, CapsuleResponse, ContributorListResponse,
        ContributorResponse, CreateCapsuleRequest, SessionUser, SetContributorRequest,
        UpdateCapsuleRequest,
    },
};

/// Read access: any member, or anyone signed in when the capsule is public.
async fn require_capsule_read(
    state: &AppState,
    capsule_id: &str,
    user_id: &str,
) -> Result<CapsuleAccess, AppError> {
    let access = resolve_capsule_access(state, capsule_id, user_id).await?;
    if access.role.is_none() && access.capsule.visibility != CapsuleVisibility::Public {
        return Err(AppError::capsule_access_denied(capsule_id));
    }
    Ok(access)
}

pub(crate) async fn create_capsule_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateCapsuleRequest>,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;

    let capsule = state
        .capsule_store
        .create(
            &auth.user.id,
            payload.title.as_deref(),
            payload.description.as_deref(),
            payload.visibility,
        )
        .await
        .map_err(AppError::from_anyhow)?;

    let response_body = CapsuleResponse::from(capsule.clone());
    state.broadcaster.to_all(
        DomainEvent::CapsuleCreated {
            capsule: capsule.into(),
        },
        None,
    );

    let mut response = (StatusCode::CREATED, Json(response_body)).into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

pub(crate) async fn list_capsules_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;

    let capsules = state
        .capsule_store
        .list_for_user(&auth.user.id)
        .await
        .map_err(AppError::from_anyhow)?;

    let mut response = Json(CapsuleListResponse {
        capsules: capsules.into_iter().map(CapsuleResponse::from).collect(),
    })
    .into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

pub(crate) async fn get_capsule_handler(
    State(state): State<AppState>,
    Path(capsule_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;
    let access = require_capsule_read(&state, &capsule_id, &auth.user.id).await?;

    let mut response = Json(CapsuleResponse::from(access.capsule)).into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

pub(crate) async fn update_capsule_handler(
    State(state): State<AppState>,
    Path(capsule_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdateCapsuleRequest>,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;
    require_capsule_role(&state, &capsule_id, &auth.user.id, CapsuleRole::Admin).await?;

    let description = payload
        .description
        .as_ref()
        .map(|value| value.as_deref());

    let updated = state
        .capsule_store
        .update(
            &capsule_id,
            payload.title.as_deref(),
            description,
            payload.visibility,
        )
        .await
        .map_err(AppError::from_anyhow)?
        .ok_or_else(|| AppError::capsule_not_found(&capsule_id))?;

    let response_body = CapsuleResponse::from(updated.clone());
    state.broadcaster.to_capsule(
        &capsule_id,
        DomainEvent::CapsuleUpdated {
            capsule: updated.into(),
        },
        None,
    );

    let mut response = Json(response_body).into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

pub(crate) async fn delete_capsule_handler(
    State(state): State<AppState>,
    Path(capsule_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;
    require_capsule_role(&state, &capsule_id, &auth.user.id, CapsuleRole::Owner).await?;

    let deleted = state
        .capsule_store
        .delete(&capsule_id)
        .await
        .map_err(AppError::from_anyhow)?;
    if !deleted {
        return Err(AppError::capsule_not_found(&capsule_id));
    }

    let mut response = StatusCode::NO_CONTENT.into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

pub(crate) async fn list_contributors_handler(
    State(state): State<AppState>,
    Path(capsule_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;
    require_capsule_read(&state, &capsule_id, &auth.user.id).await?;

    let contributors = state
        .capsule_store
        .list_contributors(&capsule_id)
        .await
        .map_err(AppError::from_anyhow)?;

    let mut response = Json(ContributorListResponse {
        contributors: contributors
            .into_iter()
            .map(ContributorResponse::from)
            .collect(),
    })
    .into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

pub(crate) async fn set_contributor_handler(
    State(state): State<AppState>,
    Path(capsule_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<SetContributorRequest>,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;
    let access =
        require_capsule_role(&state, &capsule_id, &auth.user.id, CapsuleRole::Admin).await?;

    let role = CapsuleRole::from_str(&payload.role)
        .map_err(|_| AppError::bad_request("unknown contributor role"))?;
    if role == CapsuleRole::Owner {
        return Err(AppError::bad_request("ownership cannot be granted"));
    }
    if access.capsule.owner_id.as_str() == payload.user_id {
        return Err(AppError::bad_request("the owner is not a contributor"));
    }

    let target = state.user_service.fetch_user(&payload.user_id).await?;

    state
        .capsule_store
        .set_contributor(&capsule_id, &payload.user_id, role)
        .await
        .map_err(AppError::from_anyhow)?;

    state.broadcaster.to_capsule(
        &capsule_id,
        DomainEvent::UserJoinedCapsule {
            capsule_id: capsule_id.clone(),
            user: SessionUser::from(&target),
        },
        None,
    );

    let contributors = state
        .capsule_store
        .list_contributors(&capsule_id)
        .await
        .map_err(AppError::from_anyhow)?;

    let mut response = Json(ContributorListResponse {
        contributors: contributors
            .into_iter()
            .map(ContributorResponse::from)
            .collect(),
    })
    .into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

pub(crate) async fn remove_contributor_handler(
    State(state): State<AppState>,
    Path((capsule_id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;

    // Contributors may remove themselves; removing anyone else takes admin.
    if auth.user.id != user_id {
        require_capsule_role(&state, &capsule_id, &auth.user.id, CapsuleRole::Admin).await?;
    } else {
        require_capsule_member(&state, &capsule_id, &auth.user.id).await?;
    }

    let removed = state
        .capsule_store
        .remove_contributor(&capsule_id, &user_id)
        .await
        .map_err(AppError::from_anyhow)?;
    if !removed {
        return Err(AppError::not_found("contributor not found"));
    }

    state.broadcaster.to_capsule(
        &capsule_id,
        DomainEvent::UserLeftCapsule {
            capsule_id: capsule_id.clone(),
            user_id: user_id.clone(),
        },
        None,
    );

    let mut response = StatusCode::NO_CONTENT.into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json,
        body::to_bytes,
        extract::{Path, State},
        http::{HeaderMap, HeaderValue, StatusCode, header::COOKIE},
    };
    use serde_json::{Value as JsonValue, json};

    use crate::{
        auth::generate_password_hash,
        cookies::{SESSION_COOKIE_NAME, USER_COOKIE_NAME},
        test_support::{seed_capsule, setup_state},
    };

    async fn signed_in_headers(state: &AppState, user_id: &str) -> HeaderMap {
        let session = state
            .user_store
            .create_session(user_id)
            .await
            .expect("create session");
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!(
                "{}={}; {}={}",
                SESSION_COOKIE_NAME, session.id, USER_COOKIE_NAME, user_id
            ))
            .expect("cookie header"),
        );
        headers
    }

    #[tokio::test]
    async fn create_capsule_handler_returns_created() {
        let (_temp_dir, _database, state) = setup_state().await;
        let password_hash = generate_password_hash("secret").expect("hash password");
        let user = state
            .user_store
            .create("creator@example.com", &password_hash, None)
            .await
            .expect("create user");
        let headers = signed_in_headers(&state, &user.id).await;

        let response = create_capsule_handler(
            State(state.clone()),
            headers,
            Json(serde_json::from_value(json!({ "title": "Summer 2025" })).unwrap()),
        )
        .await
        .expect("create capsule");

        assert_eq!(response.status(), StatusCode::CREATED);
        let (_parts, body) = response.into_parts();
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        let json: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["title"], "Summer 2025");
        assert_eq!(json["ownerId"], user.id);
    }

    #[tokio::test]
    async fn get_capsule_handler_denies_strangers() {
        let (_temp_dir, _database, state) = setup_state().await;
        let (capsule_id, _owner_id) = seed_capsule(&state).await;
        let password_hash = generate_password_hash("secret").expect("hash password");
        let stranger = state
            .user_store
            .create("stranger@example.com", &password_hash, None)
            .await
            .expect("create stranger");
        let headers = signed_in_headers(&state, &stranger.id).await;

        let err = get_capsule_handler(State(state.clone()), Path(capsule_id), headers)
            .await
            .expect_err("stranger should be denied");

        let (status, payload) = err.into_payload();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(payload.name, "CAPSULE_ACCESS_DENIED");
    }

    #[tokio::test]
    async fn get_capsule_handler_returns_missing_as_not_found() {
        let (_temp_dir, _database, state) = setup_state().await;
        let password_hash = generate_password_hash("secret").expect("hash password");
        let user = state
            .user_store
            .create("nobody@example.com", &password_hash, None)
            .await
            .expect("create user");
        let headers = signed_in_headers(&state, &user.id).await;

        let err = get_capsule_handler(State(state.clone()), Path("missing".into()), headers)
            .await
            .expect_err("missing capsule should 404");

        let (status, payload) = err.into_payload();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(payload.name, "CAPSULE_NOT_FOUND");
    }

    #[tokio::test]
    async fn update_capsule_handler_requires_admin() {
        let (_temp_dir, _database, state) = setup_state().await;
        let (capsule_id, _owner_id) = seed_capsule(&state).await;
        let password_hash = generate_password_hash("secret").expect("hash password");
        let viewer = state
            .user_store
            .create("viewer@example.com", &password_hash, None)
            .await
            .expect("create viewer");
        state
            .capsule_store
            .set_contributor(&capsule_id, &viewer.id, CapsuleRole::Viewer)
            .await
            .expect("add viewer");
        let headers = signed_in_headers(&state, &viewer.id).await;

        let err = update_capsule_handler(
            State(state.clone()),
            Path(capsule_id),
            headers,
            Json(serde_json::from_value(json!({ "title": "Renamed" })).unwrap()),
        )
        .await
        .expect_err("viewer cannot update");

        let (status, _payload) = err.into_payload();
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn update_capsule_handler_applies_patch() {
        let (_temp_dir, _database, state) = setup_state().await;
        let (capsule_id, owner_id) = seed_capsule(&state).await;
        let headers = signed_in_headers(&state, &owner_id).await;

        let response = update_capsule_handler(
            State(state.clone()),
            Path(capsule_id),
            headers,
            Json(
                serde_json::from_value(json!({ "title": "Renamed", "description": null }))
                    .unwrap(),
            ),
        )
        .await
        .expect("update capsule");

        assert_eq!(response.status(), StatusCode::OK);
        let (_parts, body) = response.into_parts();
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        let json: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["title"], "Renamed");
        assert!(json.get("description").is_none());
    }

    #[tokio::test]
    async fn delete_capsule_handler_requires_owner() {
        let (_temp_dir, _database, state) = setup_state().await;
        let (capsule_id, _owner_id) = seed_capsule(&state).await;
        let password_hash = generate_password_hash("secret").expect("hash password");
        let admin = state
            .user_store
            .create("admin@example.com", &password_hash, None)
            .await
            .expect("create admin contributor");
        state
            .capsule_store
            .set_contributor(&capsule_id, &admin.id, CapsuleRole::Admin)
            .await
            .expect("add admin");
        let headers = signed_in_headers(&state, &admin.id).await;

        let err = delete_capsule_handler(State(state.clone()), Path(capsule_id), headers)
            .await
            .expect_err("admin is not owner");

        let (status, _payload) = err.into_payload();
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn contributor_lifecycle_round_trips() {
        let (_temp_dir, _database, state) = setup_state().await;
        let (capsule_id, owner_id) = seed_capsule(&state).await;
        let password_hash = generate_password_hash("secret").expect("hash password");
        let friend = state
            .user_store
            .create("friend@example.com", &password_hash, Some("Friend"))
            .await
            .expect("create friend");
        let headers = signed_in_headers(&state, &owner_id).await;

        let response = set_contributor_handler(
            State(state.clone()),
            Path(capsule_id.clone()),
            headers,
            Json(
                serde_json::from_value(json!({
                    "userId": friend.id,
                    "role": "contributor",
                }))
                .unwrap(),
            ),
        )
        .await
        .expect("add contributor");
        assert_eq!(response.status(), StatusCode::OK);

        let role = state
            .capsule_store
            .find_contributor_role(&capsule_id, &friend.id)
            .await
            .expect("query role");
        assert_eq!(role, Some(CapsuleRole::Contributor));

        // Self removal needs no admin role.
        let friend_headers = signed_in_headers(&state, &friend.id).await;
        let response = remove_contributor_handler(
            State(state.clone()),
            Path((capsule_id.clone(), friend.id.clone())),
            friend_headers,
        )
        .await
        .expect("self removal");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let role = state
            .capsule_store
            .find_contributor_role(&capsule_id, &friend.id)
            .await
            .expect("query role");
        assert_eq!(role, None);
    }

    #[tokio::test]
    async fn set_contributor_handler_rejects_owner_grant() {
        let (_temp_dir, _database, state) = setup_state().await;
        let (capsule_id, owner_id) = seed_capsule(&state).await;
        let password_hash = generate_password_hash("secret").expect("hash password");
        let friend = state
            .user_store
            .create("owner-grant@example.com", &password_hash, None)
            .await
            .expect("create friend");
        let headers = signed_in_headers(&state, &owner_id).await;

        let err = set_contributor_handler(
            State(state.clone()),
            Path(capsule_id),
            headers,
            Json(
                serde_json::from_value(json!({
                    "userId": friend.id,
                    "role": "owner",
                }))
                .unwrap(),
            ),
        )
        .await
        .expect_err("owner role is not assignable");

        let (status, _payload) = err.into_payload();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
