#![allow(dead_code)]

use memoryscape_core::{config::AppConfig, db::Database};
use tempfile::TempDir;

use crate::{
    auth::generate_password_hash,
    state::{AppState, build_state},
};

pub(crate) async fn setup_state() -> (TempDir, Database, AppState) {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let mut config = AppConfig::default();
    let db_path = temp_dir.path().join("test.db");
    config.database_path = db_path.to_string_lossy().into_owned();

    let database = Database::connect(&config).await.expect("connect database");
    let state = build_state(&database, &config);

    (temp_dir, database, state)
}

pub(crate) async fn seed_capsule(state: &AppState) -> (String, String) {
    let password_hash = generate_password_hash("password").expect("hash password");
    let user = state
        .user_store
        .create("tester@example.com", &password_hash, None)
        .await
        .expect("create user");
    let capsule = state
        .capsule_store
        .create(&user.id, Some("Test Capsule"), None, None)
        .await
        .expect("create capsule");
    (capsule.id.into_inner(), user.id)
}
