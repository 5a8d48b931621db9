// HTTP handlers module structure

pub mod auth_handlers;
pub(crate) mod capsule_handlers;
pub(crate) mod health_handlers;
pub(crate) mod memory_handlers;
pub(crate) mod notification_handlers;
pub(crate) mod user_handlers;
