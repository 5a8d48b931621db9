// Memory, reaction, and comment handlers

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use memoryscape_core::{
    capsule::CapsuleVisibility,
    membership::CapsuleRole,
    memory::{MemoryKind, MemoryRecord},
};
use serde_json::json;
use tracing::warn;

use crate::{
    ai::spawn_caption_task,
    auth::{authenticate_rest_request, require_capsule_member, require_capsule_role,
        resolve_capsule_access},
    error::AppError,
    http::append_set_cookie_headers,
    socket::broadcast::DomainEvent,
    state::AppState,
    types::{
        CommentListResponse, CommentResponse, CreateCommentRequest, CreateMemoryRequest,
        MemoryListResponse, MemoryResponse, ReactionRequest, ReactionResponse, SetPinnedRequest,
        ToggleReactionResponse, UpdateMemoryRequest,
    },
};

/// Fetch a memory, checking that it actually belongs to the capsule named in
/// the path. Cross-capsule ids are treated as absent.
async fn fetch_capsule_memory(
    state: &AppState,
    capsule_id: &str,
    memory_id: &str,
) -> Result<MemoryRecord, AppError> {
    let memory = state
        .memory_store
        .find_by_id(memory_id)
        .await
        .map_err(AppError::from_anyhow)?
        .ok_or_else(|| AppError::memory_not_found(capsule_id, memory_id))?;

    if memory.capsule_id.as_str() != capsule_id {
        return Err(AppError::memory_not_found(capsule_id, memory_id));
    }

    Ok(memory)
}

/// Author of the memory, or a capsule admin. Used for edit and delete.
async fn require_author_or_admin(
    state: &AppState,
    capsule_id: &str,
    memory: &MemoryRecord,
    user_id: &str,
) -> Result<(), AppError> {
    let (_access, role) = require_capsule_member(state, capsule_id, user_id).await?;
    if memory.created_by.as_str() == user_id || role >= CapsuleRole::Admin {
        Ok(())
    } else {
        Err(AppError::capsule_access_denied(capsule_id))
    }
}

pub(crate) async fn create_memory_handler(
    State(state): State<AppState>,
    Path(capsule_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CreateMemoryRequest>,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;
    require_capsule_role(&state, &capsule_id, &auth.user.id, CapsuleRole::Contributor).await?;

    if payload.kind == MemoryKind::Text {
        if payload.body.as_deref().unwrap_or("").trim().is_empty() {
            return Err(AppError::bad_request("text memories need a body"));
        }
    } else if payload.media_url.as_deref().unwrap_or("").trim().is_empty() {
        return Err(AppError::bad_request("media memories need a media url"));
    }

    let memory = state
        .memory_store
        .create(
            &capsule_id,
            &auth.user.id,
            payload.kind,
            payload.title.as_deref(),
            payload.body.as_deref(),
            payload.media_url.as_deref(),
            payload.tags,
        )
        .await
        .map_err(AppError::from_anyhow)?;

    state.broadcaster.to_capsule(
        &capsule_id,
        DomainEvent::NewMemory {
            memory: memory.clone().into(),
        },
        None,
    );

    if payload.caption {
        spawn_caption_task(&state, memory.clone());
    }

    let mut response = (StatusCode::CREATED, Json(MemoryResponse::from(memory))).into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

pub(crate) async fn list_memories_handler(
    State(state): State<AppState>,
    Path(capsule_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;
    let access = resolve_capsule_access(&state, &capsule_id, &auth.user.id).await?;
    if access.role.is_none() && access.capsule.visibility != CapsuleVisibility::Public {
        return Err(AppError::capsule_access_denied(&capsule_id));
    }

    let memories = state
        .memory_store
        .list_for_capsule(&capsule_id)
        .await
        .map_err(AppError::from_anyhow)?;

    let mut response = Json(MemoryListResponse {
        memories: memories.into_iter().map(MemoryResponse::from).collect(),
    })
    .into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

pub(crate) async fn update_memory_handler(
    State(state): State<AppState>,
    Path((capsule_id, memory_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<UpdateMemoryRequest>,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;
    let memory = fetch_capsule_memory(&state, &capsule_id, &memory_id).await?;
    require_author_or_admin(&state, &capsule_id, &memory, &auth.user.id).await?;

    let title = payload.title.as_ref().map(|value| value.as_deref());
    let body = payload.body.as_ref().map(|value| value.as_deref());

    let updated = state
        .memory_store
        .update(&memory_id, title, body, payload.tags)
        .await
        .map_err(AppError::from_anyhow)?
        .ok_or_else(|| AppError::memory_not_found(&capsule_id, &memory_id))?;

    let response_body = MemoryResponse::from(updated.clone());
    state.broadcaster.to_capsule(
        &capsule_id,
        DomainEvent::MemoryUpdated {
            memory: updated.into(),
        },
        None,
    );

    let mut response = Json(response_body).into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

pub(crate) async fn delete_memory_handler(
    State(state): State<AppState>,
    Path((capsule_id, memory_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;
    let memory = fetch_capsule_memory(&state, &capsule_id, &memory_id).await?;
    require_author_or_admin(&state, &capsule_id, &memory, &auth.user.id).await?;

    let deleted = state
        .memory_store
        .delete(&memory_id)
        .await
        .map_err(AppError::from_anyhow)?;
    if !deleted {
        return Err(AppError::memory_not_found(&capsule_id, &memory_id));
    }

    state.broadcaster.to_capsule(
        &capsule_id,
        DomainEvent::MemoryDeleted {
            capsule_id: capsule_id.clone(),
            memory_id: memory_id.clone(),
        },
        None,
    );

    let mut response = StatusCode::NO_CONTENT.into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

pub(crate) async fn set_pinned_handler(
    State(state): State<AppState>,
    Path((capsule_id, memory_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<SetPinnedRequest>,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;
    require_capsule_role(&state, &capsule_id, &auth.user.id, CapsuleRole::Admin).await?;
    fetch_capsule_memory(&state, &capsule_id, &memory_id).await?;

    let changed = state
        .memory_store
        .set_pinned(&memory_id, payload.pinned)
        .await
        .map_err(AppError::from_anyhow)?;
    if !changed {
        return Err(AppError::memory_not_found(&capsule_id, &memory_id));
    }

    // The pinning admin already knows the outcome from the HTTP response,
    // so the room broadcast skips their sockets.
    state.broadcaster.to_capsule(
        &capsule_id,
        DomainEvent::MemoryPinned {
            capsule_id: capsule_id.clone(),
            memory_id: memory_id.clone(),
            pinned: payload.pinned,
        },
        Some(auth.user.id.as_str()),
    );

    let mut response = Json(json!({ "pinned": payload.pinned })).into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

pub(crate) async fn toggle_reaction_handler(
    State(state): State<AppState>,
    Path((capsule_id, memory_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<ReactionRequest>,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;
    require_capsule_member(&state, &capsule_id, &auth.user.id).await?;
    fetch_capsule_memory(&state, &capsule_id, &memory_id).await?;

    let emoji = payload.emoji.trim();
    if emoji.is_empty() {
        return Err(AppError::bad_request("emoji must not be empty"));
    }

    let action = state
        .memory_store
        .toggle_reaction(&memory_id, &auth.user.id, emoji)
        .await
        .map_err(AppError::from_anyhow)?;

    state.broadcaster.to_capsule(
        &capsule_id,
        DomainEvent::MemoryReaction {
            capsule_id: capsule_id.clone(),
            memory_id: memory_id.clone(),
            user_id: auth.user.id.clone(),
            emoji: emoji.to_owned(),
            action,
        },
        None,
    );

    let reactions = state
        .memory_store
        .list_reactions(&memory_id)
        .await
        .map_err(AppError::from_anyhow)?;

    let mut response = Json(ToggleReactionResponse {
        action,
        reactions: reactions.into_iter().map(ReactionResponse::from).collect(),
    })
    .into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

pub(crate) async fn create_comment_handler(
    State(state): State<AppState>,
    Path((capsule_id, memory_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;
    require_capsule_member(&state, &capsule_id, &auth.user.id).await?;
    let memory = fetch_capsule_memory(&state, &capsule_id, &memory_id).await?;

    let body = payload.body.trim();
    if body.is_empty() {
        return Err(AppError::bad_request("comment body must not be empty"));
    }

    let comment = state
        .memory_store
        .add_comment(&memory_id, &auth.user.id, body)
        .await
        .map_err(AppError::from_anyhow)?;

    state.broadcaster.to_capsule(
        &capsule_id,
        DomainEvent::NewComment {
            capsule_id: capsule_id.clone(),
            comment: comment.clone().into(),
        },
        None,
    );

    // Tell the memory author someone commented. Not worth failing the
    // request over.
    if memory.created_by.as_str() != auth.user.id {
        if let Err(err) = state
            .notification_store
            .enqueue(
                memory.created_by.as_str(),
                "new_comment",
                json!({
                    "capsuleId": capsule_id,
                    "memoryId": memory_id,
                    "commentId": comment.id,
                    "authorId": auth.user.id,
                }),
            )
            .await
        {
            warn!(memory_id = %memory_id, error = %err, "failed to enqueue comment notification");
        }
    }

    let mut response =
        (StatusCode::CREATED, Json(CommentResponse::from(comment))).into_response();
    append_set_cookie_headers(&mut response, &auth.set_cookies)?;
    Ok(response)
}

pub(crate) async fn list_comments_handler(
    State(state): State<AppState>,
    Path((capsule_id, memory_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let auth = authenticate_rest_request(&state, &headers).await?;
    require_capsule_member(&state, &capsule_id, &auth.user.id).await?;
    fetch_capsule_memory(&state, &capsule_id, &memory_id).await?;

    let comments = state
        .memory_store
        .list_comments(&memory_id)
        .await
        .map_err(AppError::from_anyhow)?;

    let mut response = Json(CommentListResponse {
        comments: comments.into_iter().map(CommentResponse::from).collect(),
    })
    .into_response();
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
    use memoryscape_core::memory::ReactionToggle;
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

    fn presence_user(id: &str) -> crate::types::SessionUser {
        crate::types::SessionUser {
            id: id.to_owned(),
            email: format!("{id}@example.com"),
            name: None,
            avatar_url: None,
            disabled: false,
            has_password: true,
        }
    }

    async fn seed_memory(state: &AppState, capsule_id: &str, author_id: &str) -> MemoryRecord {
        state
            .memory_store
            .create(
                capsule_id,
                author_id,
                MemoryKind::Text,
                Some("First day"),
                Some("We made it to the coast."),
                None,
                vec!["travel".into()],
            )
            .await
            .expect("seed memory")
    }

    #[tokio::test]
    async fn create_memory_handler_requires_contributor() {
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

        let err = create_memory_handler(
            State(state.clone()),
            Path(capsule_id),
            headers,
            Json(
                serde_json::from_value(json!({ "kind": "text", "body": "hello" })).unwrap(),
            ),
        )
        .await
        .expect_err("viewer cannot post memories");

        let (status, _payload) = err.into_payload();
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn create_memory_handler_rejects_empty_text() {
        let (_temp_dir, _database, state) = setup_state().await;
        let (capsule_id, owner_id) = seed_capsule(&state).await;
        let headers = signed_in_headers(&state, &owner_id).await;

        let err = create_memory_handler(
            State(state.clone()),
            Path(capsule_id),
            headers,
            Json(serde_json::from_value(json!({ "kind": "text" })).unwrap()),
        )
        .await
        .expect_err("empty text memory should fail");

        let (status, _payload) = err.into_payload();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_memory_handler_persists_and_returns_created() {
        let (_temp_dir, _database, state) = setup_state().await;
        let (capsule_id, owner_id) = seed_capsule(&state).await;
        let headers = signed_in_headers(&state, &owner_id).await;

        let response = create_memory_handler(
            State(state.clone()),
            Path(capsule_id.clone()),
            headers,
            Json(
                serde_json::from_value(json!({
                    "kind": "image",
                    "title": "Sunset",
                    "mediaUrl": "https://cdn.example.com/sunset.jpg",
                    "tags": ["sky"],
                }))
                .unwrap(),
            ),
        )
        .await
        .expect("create memory");

        assert_eq!(response.status(), StatusCode::CREATED);
        let (_parts, body) = response.into_parts();
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        let json: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["capsuleId"], capsule_id);
        assert_eq!(json["title"], "Sunset");

        let listed = state
            .memory_store
            .list_for_capsule(&capsule_id)
            .await
            .expect("list memories");
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn update_memory_handler_rejects_non_author_member() {
        let (_temp_dir, _database, state) = setup_state().await;
        let (capsule_id, owner_id) = seed_capsule(&state).await;
        let memory = seed_memory(&state, &capsule_id, &owner_id).await;
        let password_hash = generate_password_hash("secret").expect("hash password");
        let contributor = state
            .user_store
            .create("contrib@example.com", &password_hash, None)
            .await
            .expect("create contributor");
        state
            .capsule_store
            .set_contributor(&capsule_id, &contributor.id, CapsuleRole::Contributor)
            .await
            .expect("add contributor");
        let headers = signed_in_headers(&state, &contributor.id).await;

        let err = update_memory_handler(
            State(state.clone()),
            Path((capsule_id, memory.id.into())),
            headers,
            Json(serde_json::from_value(json!({ "title": "Hijacked" })).unwrap()),
        )
        .await
        .expect_err("plain contributor cannot edit someone else's memory");

        let (status, _payload) = err.into_payload();
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn update_memory_handler_hides_cross_capsule_ids() {
        let (_temp_dir, _database, state) = setup_state().await;
        let (capsule_id, owner_id) = seed_capsule(&state).await;
        let other_capsule = state
            .capsule_store
            .create(&owner_id, Some("Other"), None, None)
            .await
            .expect("create second capsule");
        let memory = seed_memory(&state, other_capsule.id.as_str(), &owner_id).await;
        let headers = signed_in_headers(&state, &owner_id).await;

        let memory_id: String = memory.id.into();
        let err = update_memory_handler(
            State(state.clone()),
            Path((capsule_id.clone(), memory_id.clone())),
            headers,
            Json(serde_json::from_value(json!({ "title": "Moved" })).unwrap()),
        )
        .await
        .expect_err("memory from another capsule should read as missing");

        let (status, payload) = err.into_payload();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(payload.name, "MEMORY_NOT_FOUND");
        // The refusal names the capsule the caller asked about, not the one
        // the memory actually lives in.
        let data = payload.data.expect("data present");
        assert_eq!(data["capsuleId"], capsule_id);
        assert_eq!(data["memoryId"], memory_id);
    }

    #[tokio::test]
    async fn delete_memory_handler_removes_row() {
        let (_temp_dir, _database, state) = setup_state().await;
        let (capsule_id, owner_id) = seed_capsule(&state).await;
        let memory = seed_memory(&state, &capsule_id, &owner_id).await;
        let memory_id: String = memory.id.into();
        let headers = signed_in_headers(&state, &owner_id).await;

        let response = delete_memory_handler(
            State(state.clone()),
            Path((capsule_id, memory_id.clone())),
            headers,
        )
        .await
        .expect("delete memory");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let found = state
            .memory_store
            .find_by_id(&memory_id)
            .await
            .expect("query memory");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn set_pinned_handler_requires_admin() {
        let (_temp_dir, _database, state) = setup_state().await;
        let (capsule_id, owner_id) = seed_capsule(&state).await;
        let memory = seed_memory(&state, &capsule_id, &owner_id).await;
        let password_hash = generate_password_hash("secret").expect("hash password");
        let contributor = state
            .user_store
            .create("pinner@example.com", &password_hash, None)
            .await
            .expect("create contributor");
        state
            .capsule_store
            .set_contributor(&capsule_id, &contributor.id, CapsuleRole::Contributor)
            .await
            .expect("add contributor");
        let headers = signed_in_headers(&state, &contributor.id).await;

        let err = set_pinned_handler(
            State(state.clone()),
            Path((capsule_id, memory.id.into())),
            headers,
            Json(serde_json::from_value(json!({ "pinned": true })).unwrap()),
        )
        .await
        .expect_err("contributor cannot pin");

        let (status, _payload) = err.into_payload();
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn set_pinned_handler_broadcasts_past_the_actor() {
        let (_temp_dir, _database, state) = setup_state().await;
        let (capsule_id, owner_id) = seed_capsule(&state).await;
        let memory = seed_memory(&state, &capsule_id, &owner_id).await;
        let password_hash = generate_password_hash("secret").expect("hash password");
        let watcher = state
            .user_store
            .create("watcher@example.com", &password_hash, None)
            .await
            .expect("create watcher");
        state
            .capsule_store
            .set_contributor(&capsule_id, &watcher.id, CapsuleRole::Contributor)
            .await
            .expect("add watcher");

        // Give the dispatcher a live handle so the pin actually fans out.
        let (_layer, io) = socketioxide::SocketIo::builder().build_layer();
        let _ = state.socket_io.set(std::sync::Arc::new(io));

        // Both users hold connections and sit in the capsule room.
        state.presence.register(presence_user(&owner_id), "sock-owner", 100);
        state.presence.register(presence_user(&watcher.id), "sock-watcher", 100);
        state.presence.join_room(&owner_id, &capsule_id);
        state.presence.join_room(&watcher.id, &capsule_id);

        let headers = signed_in_headers(&state, &owner_id).await;
        let response = set_pinned_handler(
            State(state.clone()),
            Path((capsule_id.clone(), memory.id.into())),
            headers,
            Json(serde_json::from_value(json!({ "pinned": true })).unwrap()),
        )
        .await
        .expect("pin memory");
        assert_eq!(response.status(), StatusCode::OK);

        // The room heard exactly one fan-out, and the audience after
        // subtracting the actor's connection is the watcher alone.
        assert_eq!(state.socket_metrics.broadcast_count(), 1);
        let actor_socket = state.presence.socket_of(&owner_id).expect("owner online");
        let audience: Vec<String> = state
            .presence
            .member_socket_ids(&capsule_id)
            .into_iter()
            .filter(|socket_id| *socket_id != actor_socket)
            .collect();
        assert_eq!(audience, ["sock-watcher"]);
    }

    #[tokio::test]
    async fn toggle_reaction_handler_round_trips() {
        let (_temp_dir, _database, state) = setup_state().await;
        let (capsule_id, owner_id) = seed_capsule(&state).await;
        let memory = seed_memory(&state, &capsule_id, &owner_id).await;
        let memory_id: String = memory.id.into();

        let headers = signed_in_headers(&state, &owner_id).await;
        let response = toggle_reaction_handler(
            State(state.clone()),
            Path((capsule_id.clone(), memory_id.clone())),
            headers,
            Json(serde_json::from_value(json!({ "emoji": "🔥" })).unwrap()),
        )
        .await
        .expect("toggle reaction");
        assert_eq!(response.status(), StatusCode::OK);

        let (_parts, body) = response.into_parts();
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        let json: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["action"], "added");
        assert_eq!(json["reactions"].as_array().unwrap().len(), 1);

        // Second toggle with the same emoji removes it.
        let headers = signed_in_headers(&state, &owner_id).await;
        let response = toggle_reaction_handler(
            State(state.clone()),
            Path((capsule_id, memory_id)),
            headers,
            Json(serde_json::from_value(json!({ "emoji": "🔥" })).unwrap()),
        )
        .await
        .expect("toggle reaction again");
        let (_parts, body) = response.into_parts();
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        let json: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["action"], "removed");
        assert!(json["reactions"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_comment_handler_notifies_author() {
        let (_temp_dir, _database, state) = setup_state().await;
        let (capsule_id, owner_id) = seed_capsule(&state).await;
        let memory = seed_memory(&state, &capsule_id, &owner_id).await;
        let memory_id: String = memory.id.into();
        let password_hash = generate_password_hash("secret").expect("hash password");
        let commenter = state
            .user_store
            .create("commenter@example.com", &password_hash, None)
            .await
            .expect("create commenter");
        state
            .capsule_store
            .set_contributor(&capsule_id, &commenter.id, CapsuleRole::Contributor)
            .await
            .expect("add commenter");
        let headers = signed_in_headers(&state, &commenter.id).await;

        let response = create_comment_handler(
            State(state.clone()),
            Path((capsule_id, memory_id.clone())),
            headers,
            Json(serde_json::from_value(json!({ "body": "love this" })).unwrap()),
        )
        .await
        .expect("create comment");
        assert_eq!(response.status(), StatusCode::CREATED);

        let comments = state
            .memory_store
            .list_comments(&memory_id)
            .await
            .expect("list comments");
        assert_eq!(comments.len(), 1);

        let notifications = state
            .notification_store
            .list_for_user(&owner_id, 10)
            .await
            .expect("list notifications");
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, "new_comment");
    }

    #[tokio::test]
    async fn reaction_toggle_enum_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(ReactionToggle::Added).unwrap(),
            json!("added")
        );
    }
}
