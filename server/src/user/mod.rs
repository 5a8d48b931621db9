pub(crate) mod helpers;
pub mod service;
