// Outbound event protocol and the broadcast dispatcher.
//
// Every mutation that survives persistence goes through here. Delivery is
// best-effort and at-most-once per connection: failures are logged and
// swallowed, never surfaced to the originating request.

use std::sync::Arc;

use memoryscape_core::memory::ReactionToggle;
use once_cell::sync::OnceCell;
use serde_json::{Value as JsonValue, json};
use socketioxide::SocketIo;
use tokio::spawn;
use tracing::warn;

use crate::{
    socket::rooms::{PresenceRegistry, capsule_room_name, user_room_name},
    state::SocketMetrics,
    types::{CapsuleResponse, CommentResponse, MemoryResponse, SessionUser},
};

/// Everything the server pushes to clients. `name()` is the socket.io event
/// name on the wire; payloads are camelCase JSON.
#[derive(Clone)]
pub enum DomainEvent {
    NewMemory {
        memory: MemoryResponse,
    },
    MemoryUpdated {
        memory: MemoryResponse,
    },
    MemoryDeleted {
        capsule_id: String,
        memory_id: String,
    },
    MemoryReaction {
        capsule_id: String,
        memory_id: String,
        user_id: String,
        emoji: String,
        action: ReactionToggle,
    },
    NewComment {
        capsule_id: String,
        comment: CommentResponse,
    },
    MemoryPinned {
        capsule_id: String,
        memory_id: String,
        pinned: bool,
    },
    UserJoinedCapsule {
        capsule_id: String,
        user: SessionUser,
    },
    UserLeftCapsule {
        capsule_id: String,
        user_id: String,
    },
    UserTyping {
        capsule_id: String,
        memory_id: Option<String>,
        user_id: String,
        typing: bool,
    },
    LiveReaction {
        capsule_id: String,
        memory_id: Option<String>,
        user_id: String,
        emoji: String,
        position: Option<JsonValue>,
    },
    UserViewingMemory {
        capsule_id: String,
        memory_id: String,
        user_id: String,
    },
    UserOnline {
        user: SessionUser,
    },
    UserOffline {
        user_id: String,
    },
    CapsuleCreated {
        capsule: CapsuleResponse,
    },
    CapsuleUpdated {
        capsule: CapsuleResponse,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewMemory { .. } => "new_memory",
            Self::MemoryUpdated { .. } => "memory_updated",
            Self::MemoryDeleted { .. } => "memory_deleted",
            Self::MemoryReaction { .. } => "memory_reaction",
            Self::NewComment { .. } => "new_comment",
            Self::MemoryPinned { .. } => "memory_pinned",
            Self::UserJoinedCapsule { .. } => "user_joined_capsule",
            Self::UserLeftCapsule { .. } => "user_left_capsule",
            Self::UserTyping { .. } => "user_typing",
            Self::LiveReaction { .. } => "live_reaction",
            Self::UserViewingMemory { .. } => "user_viewing_memory",
            Self::UserOnline { .. } => "user_online",
            Self::UserOffline { .. } => "user_offline",
            Self::CapsuleCreated { .. } => "capsule_created",
            Self::CapsuleUpdated { .. } => "capsule_updated",
        }
    }

    pub fn payload(&self) -> JsonValue {
        match self {
            Self::NewMemory { memory } | Self::MemoryUpdated { memory } => {
                json!({ "memory": memory })
            }
            Self::MemoryDeleted {
                capsule_id,
                memory_id,
            } => json!({ "capsuleId": capsule_id, "memoryId": memory_id }),
            Self::MemoryReaction {
                capsule_id,
                memory_id,
                user_id,
                emoji,
                action,
            } => json!({
                "capsuleId": capsule_id,
                "memoryId": memory_id,
                "userId": user_id,
                "emoji": emoji,
                "action": action,
            }),
            Self::NewComment {
                capsule_id,
                comment,
            } => json!({ "capsuleId": capsule_id, "comment": comment }),
            Self::MemoryPinned {
                capsule_id,
                memory_id,
                pinned,
            } => json!({ "capsuleId": capsule_id, "memoryId": memory_id, "isPinned": pinned }),
            Self::UserJoinedCapsule { capsule_id, user } => {
                json!({ "capsuleId": capsule_id, "user": user })
            }
            Self::UserLeftCapsule {
                capsule_id,
                user_id,
            } => json!({ "capsuleId": capsule_id, "userId": user_id }),
            Self::UserTyping {
                capsule_id,
                memory_id,
                user_id,
                typing,
            } => json!({
                "capsuleId": capsule_id,
                "memoryId": memory_id,
                "userId": user_id,
                "isTyping": typing,
            }),
            Self::LiveReaction {
                capsule_id,
                memory_id,
                user_id,
                emoji,
                position,
            } => json!({
                "capsuleId": capsule_id,
                "memoryId": memory_id,
                "userId": user_id,
                "emoji": emoji,
                "position": position,
            }),
            Self::UserViewingMemory {
                capsule_id,
                memory_id,
                user_id,
            } => json!({ "capsuleId": capsule_id, "memoryId": memory_id, "userId": user_id }),
            Self::UserOnline { user } => json!({ "user": user }),
            Self::UserOffline { user_id } => json!({ "userId": user_id }),
            Self::CapsuleCreated { capsule } | Self::CapsuleUpdated { capsule } => {
                json!({ "capsule": capsule })
            }
        }
    }
}

/// Fans domain events out to live connections through the socket.io
/// namespace. The `SocketIo` handle is installed once the socket layer is
/// built; events emitted before that are dropped.
#[derive(Clone)]
pub struct Broadcaster {
    socket_io: Arc<OnceCell<Arc<SocketIo>>>,
    registry: Arc<PresenceRegistry>,
    metrics: Arc<SocketMetrics>,
}

impl Broadcaster {
    pub fn new(
        socket_io: Arc<OnceCell<Arc<SocketIo>>>,
        registry: Arc<PresenceRegistry>,
        metrics: Arc<SocketMetrics>,
    ) -> Self {
        Self {
            socket_io,
            registry,
            metrics,
        }
    }

    pub fn registry(&self) -> &PresenceRegistry {
        self.registry.as_ref()
    }

    /// Target room plus the private room to subtract when the actor must not
    /// hear their own mutation echoed back.
    fn capsule_route(capsule_id: &str, exclude_user_id: Option<&str>) -> (String, Option<String>) {
        (
            capsule_room_name(capsule_id),
            exclude_user_id.map(user_room_name),
        )
    }

    /// Emit to everyone currently in the capsule room, optionally skipping
    /// one user's connection.
    pub fn to_capsule(
        &self,
        capsule_id: &str,
        event: DomainEvent,
        exclude_user_id: Option<&str>,
    ) {
        let Some(io) = self.socket_io.get() else {
            return;
        };
        self.metrics.inc_broadcasts();

        let (room, excluded_room) = Self::capsule_route(capsule_id, exclude_user_id);
        let io = io.clone();
        let name = event.name();
        let payload = event.payload();
        spawn(async move {
            let Some(ns) = io.of("/") else {
                return;
            };
            let operators = ns.to(room);
            let result = match excluded_room {
                Some(excluded) => operators.except(excluded).emit(name, &payload).await,
                None => operators.emit(name, &payload).await,
            };
            if let Err(err) = result {
                warn!(?err, event = name, "failed to broadcast to capsule room");
            }
        });
    }

    /// Emit to every live connection, optionally skipping one user.
    pub fn to_all(&self, event: DomainEvent, exclude_user_id: Option<&str>) {
        let Some(io) = self.socket_io.get() else {
            return;
        };
        self.metrics.inc_broadcasts();

        let excluded_room = exclude_user_id.map(user_room_name);
        let io = io.clone();
        let name = event.name();
        let payload = event.payload();
        spawn(async move {
            let Some(ns) = io.of("/") else {
                return;
            };
            let result = match excluded_room {
                Some(excluded) => ns.except(excluded).emit(name, &payload).await,
                None => ns.emit(name, &payload).await,
            };
            if let Err(err) = result {
                warn!(?err, event = name, "failed to broadcast globally");
            }
        });
    }

    /// Emit to a single user's connection, if they are online.
    pub fn to_user(&self, user_id: &str, event: DomainEvent) {
        if !self.registry.is_online(user_id) {
            return;
        }
        let Some(io) = self.socket_io.get() else {
            return;
        };
        self.metrics.inc_broadcasts();

        let room = user_room_name(user_id);
        let io = io.clone();
        let name = event.name();
        let payload = event.payload();
        spawn(async move {
            let Some(ns) = io.of("/") else {
                return;
            };
            if let Err(err) = ns.to(room).emit(name, &payload).await {
                warn!(?err, event = name, "failed to emit to user");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> SessionUser {
        SessionUser {
            id: "u1".into(),
            email: "u1@example.com".into(),
            name: None,
            avatar_url: None,
            disabled: false,
            has_password: true,
        }
    }

    #[test]
    fn event_names_match_the_wire_protocol() {
        let event = DomainEvent::MemoryDeleted {
            capsule_id: "cap".into(),
            memory_id: "mem".into(),
        };
        assert_eq!(event.name(), "memory_deleted");

        let event = DomainEvent::UserOnline {
            user: sample_user(),
        };
        assert_eq!(event.name(), "user_online");
    }

    #[test]
    fn payloads_use_camel_case_keys() {
        let event = DomainEvent::MemoryReaction {
            capsule_id: "cap".into(),
            memory_id: "mem".into(),
            user_id: "u1".into(),
            emoji: "🎉".into(),
            action: ReactionToggle::Added,
        };
        let payload = event.payload();
        assert_eq!(payload["capsuleId"], "cap");
        assert_eq!(payload["memoryId"], "mem");
        assert_eq!(payload["userId"], "u1");
        assert_eq!(payload["action"], "added");
    }

    #[test]
    fn typing_payload_uses_is_typing_key() {
        let event = DomainEvent::UserTyping {
            capsule_id: "cap".into(),
            memory_id: Some("mem".into()),
            user_id: "u1".into(),
            typing: false,
        };
        let payload = event.payload();
        assert_eq!(payload["isTyping"], false);
        assert_eq!(payload["memoryId"], "mem");
        assert!(payload.get("typing").is_none());
    }

    #[test]
    fn pinned_payload_uses_is_pinned_key() {
        let event = DomainEvent::MemoryPinned {
            capsule_id: "cap".into(),
            memory_id: "mem".into(),
            pinned: true,
        };
        let payload = event.payload();
        assert_eq!(payload["isPinned"], true);
        assert!(payload.get("pinned").is_none());
    }

    #[test]
    fn capsule_route_subtracts_the_actor_room() {
        let (room, excluded) = Broadcaster::capsule_route("cap-9", Some("admin-1"));
        assert_eq!(room, "capsule:cap-9");
        assert_eq!(excluded.as_deref(), Some("user:admin-1"));

        let (_, excluded) = Broadcaster::capsule_route("cap-9", None);
        assert!(excluded.is_none());
    }

    #[test]
    fn live_reaction_payload_relays_memory_and_position() {
        let event = DomainEvent::LiveReaction {
            capsule_id: "cap".into(),
            memory_id: Some("mem".into()),
            user_id: "u1".into(),
            emoji: "🎉".into(),
            position: Some(json!({ "x": 0.25, "y": 0.75 })),
        };
        let payload = event.payload();
        assert_eq!(payload["memoryId"], "mem");
        assert_eq!(payload["position"]["x"], 0.25);
        assert_eq!(payload["position"]["y"], 0.75);
    }
}
