use std::sync::Arc;

use socketioxide::{SocketIo, layer::SocketIoLayer};

use crate::state::SocketRuntimeState;

mod auth;
pub(crate) mod events;

pub mod broadcast;
pub mod rooms;
pub mod types;

/// Builds the socket.io layer, wires the authenticated namespace, and hands
/// back the `SocketIo` handle the broadcaster publishes through.
pub fn build_socket_layer(runtime: Arc<SocketRuntimeState>) -> (SocketIoLayer, SocketIo) {
    let (layer, io) = auth::build_socket(runtime.clone());
    events::register_namespace(&io, runtime);
    (layer, io)
}
