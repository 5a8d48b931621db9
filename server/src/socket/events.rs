use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use socketioxide::{
    SocketIo,
    extract::{AckSender, Data, Extension, SocketRef},
    handler::ConnectHandler,
};
use tracing::Instrument;
use tracing::{debug, info, warn};

use crate::{
    auth::require_capsule_member,
    error::AppError,
    socket::{
        auth::SocketAuthMiddleware,
        broadcast::DomainEvent,
        rooms::{capsule_room_name, user_room_name},
        types::{SocketAck, SocketRequestContext, SocketUserContext},
    },
    state::SocketRuntimeState,
    types::SessionUser,
};

pub(crate) fn register_namespace(io: &SocketIo, runtime: Arc<SocketRuntimeState>) {
    let middleware = SocketAuthMiddleware::new(runtime);
    let _ = io.ns("/", on_connect.with(middleware));
}

async fn on_connect(
    socket: SocketRef,
    Extension(user): Extension<SocketUserContext>,
    Extension(runtime): Extension<Arc<SocketRuntimeState>>,
) {
    let now = Utc::now().timestamp();
    socket.join(user_room_name(&user.user_id));

    // Last-connect-wins: a fresh connection for the same account replaces
    // the old one, and the old socket gets disconnected.
    let replaced = runtime
        .presence
        .register(user.user.clone(), &socket.id.to_string(), now);
    if let Some(replaced_socket_id) = replaced {
        if replaced_socket_id != socket.id.to_string() {
            if let Some(io) = runtime.socket_io.get() {
                disconnect_socket(io, &replaced_socket_id);
            }
        }
    }

    info!(
        socket_id = %socket.id,
        user_id = %user.user_id,
        "socket connected"
    );

    runtime.broadcaster.to_all(
        DomainEvent::UserOnline {
            user: user.user.clone(),
        },
        Some(&user.user_id),
    );

    socket.on("join_capsule", handle_capsule_join);
    socket.on("join_capsules", handle_capsule_join_all);
    socket.on("leave_capsule", handle_capsule_leave);
    socket.on("typing_start", handle_typing_start);
    socket.on("typing_stop", handle_typing_stop);
    socket.on("live_reaction", handle_live_reaction);
    socket.on("viewing_memory", handle_memory_viewing);

    socket.on_disconnect(handle_disconnect);
}

/// Force-close one connection by socket id. Used when a fresh connection
/// replaces an older one and when the sweeper evicts a stale identity.
pub(crate) fn disconnect_socket(io: &SocketIo, socket_id: &str) {
    let Some(ns) = io.of("/") else {
        return;
    };
    for other in ns.sockets() {
        if other.id.to_string() == socket_id {
            if let Err(err) = other.disconnect() {
                warn!(?err, socket_id, "failed to disconnect socket");
            }
        }
    }
}

fn start_socket_span(
    event: &'static str,
    socket: &SocketRef,
    user: &SocketUserContext,
    capsule_id: Option<&str>,
    request_id: &str,
) -> tracing::Span {
    logfire::span!(
        "socket {event}",
        event = event,
        socket_id = socket.id.to_string(),
        user_id = user.user_id.as_str(),
        capsule_id = capsule_id.unwrap_or(""),
        request_id = request_id
    )
}

fn socket_in_room(socket: &SocketRef, room: &str) -> bool {
    socket
        .rooms()
        .iter()
        .any(|current| current.as_ref() == room)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinCapsuleRequest {
    capsule_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinCapsuleResponse {
    capsule_id: String,
    members: Vec<SessionUser>,
}

async fn handle_capsule_join(
    socket: SocketRef,
    Data(payload): Data<JoinCapsuleRequest>,
    ack: AckSender,
    Extension(user): Extension<SocketUserContext>,
    Extension(request): Extension<SocketRequestContext>,
    Extension(runtime): Extension<Arc<SocketRuntimeState>>,
) {
    let span = start_socket_span(
        "join_capsule",
        &socket,
        &user,
        Some(payload.capsule_id.as_str()),
        request.request_id.as_str(),
    );

    async move {
        let capsule_id = payload.capsule_id;
        runtime.presence.touch(&user.user_id, Utc::now().timestamp());

        // Membership is checked against the store at join time; a store
        // failure denies the join and is reported only to the requester.
        if let Err(err) = require_capsule_member(runtime.as_ref(), &capsule_id, &user.user_id).await
        {
            warn!(
                request_id = %request.request_id,
                capsule_id = %capsule_id,
                error = %err,
                "socket join_capsule denied"
            );
            SocketAck::<JoinCapsuleResponse>::refused(err, Some(&request.request_id)).send(ack);
            return;
        }

        let members = runtime.presence.join_room(&user.user_id, &capsule_id);
        socket.join(capsule_room_name(&capsule_id));

        if let Err(err) = socket
            .broadcast()
            .to(capsule_room_name(&capsule_id))
            .emit(
                "user_joined_capsule",
                &DomainEvent::UserJoinedCapsule {
                    capsule_id: capsule_id.clone(),
                    user: user.user.clone(),
                }
                .payload(),
            )
            .await
        {
            warn!(?err, "failed to broadcast capsule join");
        }

        info!(
            request_id = %request.request_id,
            capsule_id = %capsule_id,
            member_count = members.len(),
            "socket join_capsule success"
        );

        SocketAck::ok(JoinCapsuleResponse {
            capsule_id,
            members,
        })
        .send(ack);
    }
    .instrument(span)
    .await;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinAllResponse {
    joined: usize,
}

/// Reconnect convenience: rejoin every capsule the user can enter, without
/// per-room presence broadcasts.
async fn handle_capsule_join_all(
    socket: SocketRef,
    ack: AckSender,
    Extension(user): Extension<SocketUserContext>,
    Extension(request): Extension<SocketRequestContext>,
    Extension(runtime): Extension<Arc<SocketRuntimeState>>,
) {
    let span = start_socket_span(
        "join_capsules",
        &socket,
        &user,
        None,
        request.request_id.as_str(),
    );

    async move {
        runtime.presence.touch(&user.user_id, Utc::now().timestamp());

        let capsule_ids = match runtime.capsule_store.list_ids_for_user(&user.user_id).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(
                    request_id = %request.request_id,
                    error = %err,
                    "socket join_capsules store lookup failed"
                );
                SocketAck::<JoinAllResponse>::refused(
                    AppError::from_anyhow(err),
                    Some(&request.request_id),
                )
                .send(ack);
                return;
            }
        };

        let ids: Vec<String> = capsule_ids.into_iter().map(String::from).collect();
        let joined = runtime.presence.join_all(&user.user_id, &ids);
        for capsule_id in &ids {
            socket.join(capsule_room_name(capsule_id));
        }

        info!(
            request_id = %request.request_id,
            joined,
            "socket join_capsules success"
        );

        SocketAck::ok(JoinAllResponse { joined }).send(ack);
    }
    .instrument(span)
    .await;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LeaveCapsuleResponse {
    success: bool,
}

async fn handle_capsule_leave(
    socket: SocketRef,
    Data(payload): Data<JoinCapsuleRequest>,
    ack: AckSender,
    Extension(user): Extension<SocketUserContext>,
    Extension(request): Extension<SocketRequestContext>,
    Extension(runtime): Extension<Arc<SocketRuntimeState>>,
) {
    let span = start_socket_span(
        "leave_capsule",
        &socket,
        &user,
        Some(payload.capsule_id.as_str()),
        request.request_id.as_str(),
    );

    async move {
        let capsule_id = payload.capsule_id;
        runtime.presence.touch(&user.user_id, Utc::now().timestamp());

        let was_member = runtime.presence.leave_room(&user.user_id, &capsule_id);
        socket.leave(capsule_room_name(&capsule_id));

        if was_member {
            if let Err(err) = socket
                .broadcast()
                .to(capsule_room_name(&capsule_id))
                .emit(
                    "user_left_capsule",
                    &DomainEvent::UserLeftCapsule {
                        capsule_id: capsule_id.clone(),
                        user_id: user.user_id.clone(),
                    }
                    .payload(),
                )
                .await
            {
                warn!(?err, "failed to broadcast capsule leave");
            }
        }

        SocketAck::ok(LeaveCapsuleResponse { success: true }).send(ack);
    }
    .instrument(span)
    .await;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingRequest {
    capsule_id: String,
    #[serde(default)]
    memory_id: Option<String>,
}

async fn handle_typing_start(
    socket: SocketRef,
    Data(payload): Data<TypingRequest>,
    ack: AckSender,
    Extension(user): Extension<SocketUserContext>,
    Extension(request): Extension<SocketRequestContext>,
    Extension(runtime): Extension<Arc<SocketRuntimeState>>,
) {
    relay_typing(socket, payload, ack, user, request, runtime, true).await;
}

async fn handle_typing_stop(
    socket: SocketRef,
    Data(payload): Data<TypingRequest>,
    ack: AckSender,
    Extension(user): Extension<SocketUserContext>,
    Extension(request): Extension<SocketRequestContext>,
    Extension(runtime): Extension<Arc<SocketRuntimeState>>,
) {
    relay_typing(socket, payload, ack, user, request, runtime, false).await;
}

/// Typing indicators are fire-and-forget: membership is informational, not
/// enforced, since only sockets already in the room will hear the relay.
async fn relay_typing(
    socket: SocketRef,
    payload: TypingRequest,
    ack: AckSender,
    user: SocketUserContext,
    request: SocketRequestContext,
    runtime: Arc<SocketRuntimeState>,
    typing: bool,
) {
    let event = if typing {
        "typing_start"
    } else {
        "typing_stop"
    };
    let span = start_socket_span(
        event,
        &socket,
        &user,
        Some(payload.capsule_id.as_str()),
        request.request_id.as_str(),
    );

    async move {
        let capsule_id = payload.capsule_id;
        runtime.presence.touch(&user.user_id, Utc::now().timestamp());

        if !socket_in_room(&socket, &capsule_room_name(&capsule_id)) {
            debug!(
                request_id = %request.request_id,
                capsule_id = %capsule_id,
                "typing indicator from a socket outside the room"
            );
        }

        if let Err(err) = socket
            .broadcast()
            .to(capsule_room_name(&capsule_id))
            .emit(
                "user_typing",
                &DomainEvent::UserTyping {
                    capsule_id: capsule_id.clone(),
                    memory_id: payload.memory_id.clone(),
                    user_id: user.user_id.clone(),
                    typing,
                }
                .payload(),
            )
            .await
        {
            warn!(?err, "failed to relay typing indicator");
        }

        SocketAck::ok(LeaveCapsuleResponse { success: true }).send(ack);
    }
    .instrument(span)
    .await;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveReactionRequest {
    capsule_id: String,
    #[serde(default)]
    memory_id: Option<String>,
    emoji: String,
    #[serde(default)]
    position: Option<JsonValue>,
}

async fn handle_live_reaction(
    socket: SocketRef,
    Data(payload): Data<LiveReactionRequest>,
    ack: AckSender,
    Extension(user): Extension<SocketUserContext>,
    Extension(request): Extension<SocketRequestContext>,
    Extension(runtime): Extension<Arc<SocketRuntimeState>>,
) {
    let span = start_socket_span(
        "live_reaction",
        &socket,
        &user,
        Some(payload.capsule_id.as_str()),
        request.request_id.as_str(),
    );

    async move {
        runtime.presence.touch(&user.user_id, Utc::now().timestamp());

        // Ephemeral overlay reactions are never persisted and membership is
        // not enforced; only people in the room will hear it anyway.
        if let Err(err) = socket
            .broadcast()
            .to(capsule_room_name(&payload.capsule_id))
            .emit(
                "live_reaction",
                &DomainEvent::LiveReaction {
                    capsule_id: payload.capsule_id.clone(),
                    memory_id: payload.memory_id.clone(),
                    user_id: user.user_id.clone(),
                    emoji: payload.emoji.clone(),
                    position: payload.position.clone(),
                }
                .payload(),
            )
            .await
        {
            warn!(?err, "failed to relay live reaction");
        }

        SocketAck::ok(LeaveCapsuleResponse { success: true }).send(ack);
    }
    .instrument(span)
    .await;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewingRequest {
    capsule_id: String,
    memory_id: String,
}

async fn handle_memory_viewing(
    socket: SocketRef,
    Data(payload): Data<ViewingRequest>,
    ack: AckSender,
    Extension(user): Extension<SocketUserContext>,
    Extension(request): Extension<SocketRequestContext>,
    Extension(runtime): Extension<Arc<SocketRuntimeState>>,
) {
    let span = start_socket_span(
        "viewing_memory",
        &socket,
        &user,
        Some(payload.capsule_id.as_str()),
        request.request_id.as_str(),
    );

    async move {
        runtime.presence.touch(&user.user_id, Utc::now().timestamp());

        if let Err(err) = socket
            .broadcast()
            .to(capsule_room_name(&payload.capsule_id))
            .emit(
                "user_viewing_memory",
                &DomainEvent::UserViewingMemory {
                    capsule_id: payload.capsule_id.clone(),
                    memory_id: payload.memory_id.clone(),
                    user_id: user.user_id.clone(),
                }
                .payload(),
            )
            .await
        {
            warn!(?err, "failed to relay viewing indicator");
        }

        SocketAck::ok(LeaveCapsuleResponse { success: true }).send(ack);
    }
    .instrument(span)
    .await;
}

/// Graceful or not, every disconnect funnels through here: the identity is
/// unregistered, each non-empty room hears a departure, and everyone hears
/// the user go offline.
async fn handle_disconnect(
    socket: SocketRef,
    Extension(user): Extension<SocketUserContext>,
    Extension(runtime): Extension<Arc<SocketRuntimeState>>,
) {
    let socket_id = socket.id.to_string();

    // A replaced connection must not tear down the live one's presence.
    if runtime.presence.socket_of(&user.user_id).as_deref() == Some(socket_id.as_str()) {
        let departures = runtime.presence.unregister(&user.user_id);
        for departure in departures {
            if departure.has_remaining_members {
                runtime.broadcaster.to_capsule(
                    &departure.capsule_id,
                    DomainEvent::UserLeftCapsule {
                        capsule_id: departure.capsule_id.clone(),
                        user_id: user.user_id.clone(),
                    },
                    Some(&user.user_id),
                );
            }
        }
        runtime.broadcaster.to_all(
            DomainEvent::UserOffline {
                user_id: user.user_id.clone(),
            },
            Some(&user.user_id),
        );
    }

    info!(socket_id = %socket_id, user_id = %user.user_id, "socket disconnected");
    runtime.socket_metrics.dec_connections();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typing_request_accepts_the_memory_context() {
        let request: TypingRequest =
            serde_json::from_value(json!({ "capsuleId": "cap-1", "memoryId": "mem-1" }))
                .expect("typing payload");
        assert_eq!(request.capsule_id, "cap-1");
        assert_eq!(request.memory_id.as_deref(), Some("mem-1"));

        // Capsule-level typing omits the memory id.
        let request: TypingRequest =
            serde_json::from_value(json!({ "capsuleId": "cap-1" })).expect("typing payload");
        assert!(request.memory_id.is_none());
    }

    #[test]
    fn live_reaction_request_carries_memory_and_position() {
        let request: LiveReactionRequest = serde_json::from_value(json!({
            "capsuleId": "cap-1",
            "memoryId": "mem-1",
            "emoji": "🎉",
            "position": { "x": 0.5, "y": 0.125 },
        }))
        .expect("live reaction payload");
        assert_eq!(request.memory_id.as_deref(), Some("mem-1"));
        assert_eq!(request.position.as_ref().unwrap()["x"], 0.5);
    }
}
