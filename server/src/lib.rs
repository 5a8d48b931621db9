pub mod ai;
pub mod auth;
pub mod cookies;
pub mod error;
pub mod handlers;
pub mod http;
pub mod observability;
pub mod router;
pub mod socket;
pub mod state;
pub mod types;
pub mod user;

pub use error::AppError;
pub use state::{AppState, build_state};

#[cfg(test)]
pub mod test_support;
