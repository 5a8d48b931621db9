// Router configuration

use axum::{
    Router,
    http::Method,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{
        auth_handlers::*, capsule_handlers::*, health_handlers::*, memory_handlers::*,
        notification_handlers::*, user_handlers::*,
    },
    observability,
    state::AppState,
};

pub fn build_router(state: AppState) -> Router {
    let (socket_layer, socket_io) = crate::socket::build_socket_layer(state.runtime());
    let _ = state.socket_io.set(Arc::new(socket_io));

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let router = Router::new()
        // Health & Info
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/info", get(info_handler))
        // Authentication
        .route("/api/auth/admin", post(create_admin_user_handler))
        .route("/api/auth/preflight", post(preflight_handler))
        .route("/api/auth/sign-in", post(sign_in_handler))
        .route("/api/auth/session", get(get_session_handler))
        .route("/api/auth/user", get(current_user_handler))
        .route("/api/auth/sign-out", get(sign_out_handler))
        .route(
            "/api/auth/sessions",
            post(create_session_handler).delete(delete_session_handler),
        )
        .route("/api/auth/sessions/refresh", post(refresh_session_handler))
        // Users
        .route("/api/users", post(create_user_handler))
        .route(
            "/api/users/{id}",
            get(get_user_handler).patch(update_profile_handler),
        )
        // Capsules
        .route(
            "/api/capsules",
            post(create_capsule_handler).get(list_capsules_handler),
        )
        .route(
            "/api/capsules/{capsule_id}",
            get(get_capsule_handler)
                .patch(update_capsule_handler)
                .delete(delete_capsule_handler),
        )
        .route(
            "/api/capsules/{capsule_id}/contributors",
            get(list_contributors_handler).post(set_contributor_handler),
        )
        .route(
            "/api/capsules/{capsule_id}/contributors/{user_id}",
            delete(remove_contributor_handler),
        )
        // Memories
        .route(
            "/api/capsules/{capsule_id}/memories",
            post(create_memory_handler).get(list_memories_handler),
        )
        .route(
            "/api/capsules/{capsule_id}/memories/{memory_id}",
            axum::routing::patch(update_memory_handler).delete(delete_memory_handler),
        )
        .route(
            "/api/capsules/{capsule_id}/memories/{memory_id}/pin",
            put(set_pinned_handler),
        )
        .route(
            "/api/capsules/{capsule_id}/memories/{memory_id}/reactions",
            post(toggle_reaction_handler),
        )
        .route(
            "/api/capsules/{capsule_id}/memories/{memory_id}/comments",
            post(create_comment_handler).get(list_comments_handler),
        )
        // Notifications
        .route("/api/notifications", get(list_notifications_handler))
        .route("/api/notifications/read", put(mark_notifications_read_handler));

    router
        .layer(socket_layer)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(observability::http_make_span())
                .on_response(observability::response_logger()),
        )
        .layer(cors)
        .layer(observability::request_context_layer())
        .with_state(state)
}
