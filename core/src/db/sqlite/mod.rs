pub mod capsule_repo;
pub mod connection;
pub mod memory_repo;
