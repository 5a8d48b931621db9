pub mod capsule;
pub mod config;
pub mod db;
pub mod ids;
pub mod membership;
pub mod memory;
pub mod notification;
pub mod user;
