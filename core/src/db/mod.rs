use std::{fs, fs::File, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};

use self::{
    capsule_repo::CapsuleRepositoryRef,
    memory_repo::MemoryRepositoryRef,
    sqlite::{
        capsule_repo::SqliteCapsuleRepository, connection as sqlite_connection,
        memory_repo::SqliteMemoryRepository,
    },
};
use crate::config::AppConfig;

pub mod capsule_repo;
pub mod memory_repo;
pub mod sqlite;

#[derive(Clone)]
pub struct RepositoryRegistry {
    capsule_repo: CapsuleRepositoryRef,
    memory_repo: MemoryRepositoryRef,
}

impl RepositoryRegistry {
    pub fn new(capsule_repo: CapsuleRepositoryRef, memory_repo: MemoryRepositoryRef) -> Self {
        Self {
            capsule_repo,
            memory_repo,
        }
    }

    pub fn capsule_repo(&self) -> CapsuleRepositoryRef {
        self.capsule_repo.clone()
    }

    pub fn memory_repo(&self) -> MemoryRepositoryRef {
        self.memory_repo.clone()
    }
}

#[derive(Clone)]
pub struct Database {
    pool: sqlite_connection::SqlitePool,
    path: PathBuf,
    repositories: Arc<RepositoryRegistry>,
}

impl Database {
    const SQLITE_FILE_NAME: &'static str = "memoryscape.db";

    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let (data_dir, db_file) = Self::resolve_database_paths(&config.database_path)?;
        fs::create_dir_all(&data_dir).with_context(|| {
            format!(
                "failed to create database directory: {}",
                data_dir.display()
            )
        })?;

        if !db_file.exists() {
            File::create(&db_file).with_context(|| {
                format!("failed to create database file: {}", db_file.display())
            })?;
        }

        let pool =
            sqlite_connection::create_pool(&db_file, config.database_max_connections).await?;
        sqlite_connection::run_migrations(&pool).await?;

        let capsule_repo =
            Arc::new(SqliteCapsuleRepository::new(pool.clone())) as CapsuleRepositoryRef;
        let memory_repo =
            Arc::new(SqliteMemoryRepository::new(pool.clone())) as MemoryRepositoryRef;
        let repositories = Arc::new(RepositoryRegistry::new(capsule_repo, memory_repo));

        Ok(Self {
            pool,
            path: data_dir,
            repositories,
        })
    }

    pub fn pool(&self) -> &sqlite_connection::SqlitePool {
        &self.pool
    }

    pub fn database_path(&self) -> &PathBuf {
        &self.path
    }

    pub fn repositories(&self) -> Arc<RepositoryRegistry> {
        self.repositories.clone()
    }

    fn resolve_database_paths(path: &str) -> Result<(PathBuf, PathBuf)> {
        let resolved = Self::resolve_db_path(path)?;
        if resolved
            .extension()
            .map(|ext| ext == "db" || ext == "sqlite")
            .unwrap_or(false)
        {
            let dir = if let Some(parent) = resolved.parent() {
                parent.to_path_buf()
            } else {
                std::env::current_dir().context("failed to obtain current directory")?
            };
            Ok((dir, resolved))
        } else {
            Ok((resolved.clone(), resolved.join(Self::SQLITE_FILE_NAME)))
        }
    }

    fn resolve_db_path(path: &str) -> Result<PathBuf> {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            Ok(path)
        } else {
            let cwd = std::env::current_dir().context("failed to obtain current directory")?;
            Ok(cwd.join(path))
        }
    }
}
