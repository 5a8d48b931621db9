use std::env;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use once_cell::sync::OnceCell;
use serde::Serialize;
use socketioxide::SocketIo;
use tokio::{
    spawn,
    time::{Duration, sleep},
};
use tracing::{info, warn};

use memoryscape_core::{
    capsule::CapsuleStore,
    config::AppConfig,
    db::Database,
    memory::MemoryStore,
    notification::NotificationStore,
    user::UserStore,
};

use crate::{
    ai::{Captioner, build_captioner},
    socket::{
        broadcast::{Broadcaster, DomainEvent},
        rooms::PresenceRegistry,
    },
    user::service::UserService,
};

#[derive(Clone)]
pub struct AppState {
    pub user_store: UserStore,
    pub capsule_store: CapsuleStore,
    pub memory_store: MemoryStore,
    pub notification_store: NotificationStore,
    pub user_service: Arc<UserService>,
    pub presence: Arc<PresenceRegistry>,
    pub broadcaster: Broadcaster,
    pub captioner: Arc<dyn Captioner>,
    pub metadata: ServerMetadata,
    pub socket_io: Arc<OnceCell<Arc<SocketIo>>>,
    pub socket_metrics: Arc<SocketMetrics>,
    pub socket_runtime: Arc<SocketRuntimeState>,
}

/// The slice of state socket handlers reach through `Extension`.
#[derive(Clone)]
pub struct SocketRuntimeState {
    pub user_service: Arc<UserService>,
    pub capsule_store: CapsuleStore,
    pub presence: Arc<PresenceRegistry>,
    pub broadcaster: Broadcaster,
    pub socket_io: Arc<OnceCell<Arc<SocketIo>>>,
    pub socket_metrics: Arc<SocketMetrics>,
}

impl AppState {
    pub fn runtime(&self) -> Arc<SocketRuntimeState> {
        self.socket_runtime.clone()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerMetadata {
    pub compatibility: String,
    pub message: String,
    #[serde(rename = "type")]
    pub deployment_type: String,
    pub flavor: String,
}

impl ServerMetadata {
    pub fn load() -> Self {
        let compatibility = env::var("MEMORYSCAPE_COMPATIBILITY")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string());

        let deployment_type = env::var("MEMORYSCAPE_DEPLOYMENT_TYPE")
            .unwrap_or_else(|_| "selfhosted".to_string());

        let flavor =
            env::var("MEMORYSCAPE_FLAVOR").unwrap_or_else(|_| "allinone".to_string());

        let message = env::var("MEMORYSCAPE_SERVER_MESSAGE")
            .unwrap_or_else(|_| format!("Memoryscape {compatibility} Server"));

        Self {
            compatibility,
            message,
            deployment_type,
            flavor,
        }
    }
}

#[derive(Default)]
pub struct SocketMetrics {
    connections: AtomicUsize,
    broadcasts: AtomicUsize,
}

impl SocketMetrics {
    pub fn inc_connections(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_connections(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn inc_broadcasts(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.load(Ordering::Relaxed)
    }
}

pub fn build_state(database: &Database, app_config: &AppConfig) -> AppState {
    let socket_io = Arc::new(OnceCell::new());
    let socket_metrics = Arc::new(SocketMetrics::default());
    let presence = Arc::new(PresenceRegistry::default());
    let broadcaster = Broadcaster::new(socket_io.clone(), presence.clone(), socket_metrics.clone());

    let user_store = UserStore::new(database);
    let capsule_store = CapsuleStore::new(database);
    let memory_store = MemoryStore::new(database);
    let notification_store = NotificationStore::new(database);
    let user_service = Arc::new(UserService::new(user_store.clone()));
    let captioner = build_captioner(app_config);

    let socket_runtime = Arc::new(SocketRuntimeState {
        user_service: user_service.clone(),
        capsule_store: capsule_store.clone(),
        presence: presence.clone(),
        broadcaster: broadcaster.clone(),
        socket_io: socket_io.clone(),
        socket_metrics: socket_metrics.clone(),
    });

    let state = AppState {
        user_store,
        capsule_store,
        memory_store,
        notification_store,
        user_service,
        presence,
        broadcaster,
        captioner,
        metadata: ServerMetadata::load(),
        socket_io,
        socket_metrics,
        socket_runtime,
    };

    spawn_background_tasks(&state);

    state
}

const PRESENCE_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
const PRESENCE_IDLE_AFTER_SECONDS: i64 = 3600;
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(3600);

fn spawn_background_tasks(state: &AppState) {
    start_presence_sweeper(
        state.presence.clone(),
        state.broadcaster.clone(),
        state.socket_io.clone(),
    );
    start_session_purger(state.user_store.clone());
}

fn start_presence_sweeper(
    presence: Arc<PresenceRegistry>,
    broadcaster: Broadcaster,
    socket_io: Arc<OnceCell<Arc<SocketIo>>>,
) {
    spawn(async move {
        presence_sweep_loop(presence, broadcaster, socket_io).await;
    });
}

fn start_session_purger(user_store: UserStore) {
    spawn(async move {
        session_purge_loop(user_store).await;
    });
}

/// Evicts identities that have gone quiet and announces their departure the
/// same way a disconnect would. The evicted socket itself is closed too, so
/// it cannot linger in its socket.io rooms after the registry forgot it.
async fn presence_sweep_loop(
    presence: Arc<PresenceRegistry>,
    broadcaster: Broadcaster,
    socket_io: Arc<OnceCell<Arc<SocketIo>>>,
) {
    loop {
        sleep(PRESENCE_SWEEP_INTERVAL).await;

        let now = chrono::Utc::now().timestamp();
        let evicted = presence.sweep_stale(now, PRESENCE_IDLE_AFTER_SECONDS);
        for (identity, departures) in evicted {
            let user_id = identity.user.id.clone();
            info!(user_id = %user_id, socket_id = %identity.socket_id, "evicting stale presence");

            if let Some(io) = socket_io.get() {
                crate::socket::events::disconnect_socket(io, &identity.socket_id);
            }

            for departure in departures {
                if departure.has_remaining_members {
                    broadcaster.to_capsule(
                        &departure.capsule_id,
                        DomainEvent::UserLeftCapsule {
                            capsule_id: departure.capsule_id.clone(),
                            user_id: user_id.clone(),
                        },
                        Some(&user_id),
                    );
                }
            }

            broadcaster.to_all(
                DomainEvent::UserOffline {
                    user_id: user_id.clone(),
                },
                Some(&user_id),
            );
        }
    }
}

async fn session_purge_loop(user_store: UserStore) {
    loop {
        sleep(SESSION_PURGE_INTERVAL).await;

        match user_store.purge_expired_sessions().await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "purged expired sessions"),
            Err(err) => warn!(error = %err, "session purge encountered an error"),
        }
    }
}
