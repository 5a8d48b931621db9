// Memoryscape server entry point.
//
// This file contains only the application bootstrap logic, CLI commands,
// and initialization. All handlers, routes, and business logic are in
// separate modules.

pub use memoryscape_server::*;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::{Error as DotenvError, dotenv, from_filename};
use logfire::config::SendToLogfire;
use memoryscape_core::{config::AppConfig, db::Database, user::UserStore};
use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_appender::non_blocking;
use tracing_subscriber::EnvFilter;

static TRACING_FALLBACK_GUARD: OnceLock<non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(author, version, about = "Memoryscape server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Run database migrations
    Migrate,
    /// Create or update an administrator account
    CreateAdmin {
        /// Email for the administrator account
        email: String,
        /// Password for the administrator account
        password: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_status = load_env_file();
    let _observability_guard = init_observability();
    observability::log_sampling_summary();
    report_env_status(&env_status);

    let cli = Cli::parse();
    let config = AppConfig::load()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_serve(config).await,
        Command::Migrate => run_migrate(config).await,
        Command::CreateAdmin { email, password } => run_create_admin(config, email, password).await,
    }
}

async fn run_serve(config: AppConfig) -> anyhow::Result<()> {
    info!(
        database_path = %config.database_path,
        database_max_connections = config.database_max_connections,
        ai_captioning = config.ai_api_key.is_some(),
        "Starting server with database configuration"
    );
    let database = Database::connect(&config).await?;
    let state = build_state(&database, &config);
    info!(
        compatibility = %state.metadata.compatibility,
        deployment_type = %state.metadata.deployment_type,
        flavor = %state.metadata.flavor,
        "Loaded server metadata"
    );

    let app = router::build_router(state);

    let listener = TcpListener::bind(config.bind_address)
        .await
        .context("failed to bind socket")?;
    let actual_addr = listener
        .local_addr()
        .context("failed to read local address")?;

    info!("listening on {actual_addr}");

    if let Err(error) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(?error, "server terminated with error");
    }

    Ok(())
}

async fn run_migrate(config: AppConfig) -> anyhow::Result<()> {
    let _database = Database::connect(&config).await?;
    info!("migrations completed");
    Ok(())
}

async fn run_create_admin(
    config: AppConfig,
    email: String,
    password: String,
) -> anyhow::Result<()> {
    if email.trim().is_empty() {
        anyhow::bail!("email must not be empty");
    }

    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }

    let database = Database::connect(&config).await?;
    let user_store = UserStore::new(&database);
    let password_hash = auth::generate_password_hash(&password)?;

    let admin = match user_store.find_by_email(&email).await? {
        Some(existing) => {
            info!("administrator account {email} already exists");
            existing
        }
        None => {
            let record = user_store.create(&email, &password_hash, None).await?;
            info!("created admin user {email}");
            record
        }
    };

    user_store.add_admin(&admin.id).await?;
    info!("ensured administrator privileges for {email}");

    Ok(())
}

fn init_observability() -> Option<logfire::ShutdownGuard> {
    // When LOGFIRE_TOKEN is empty or missing, go straight to the fallback.
    match std::env::var("LOGFIRE_TOKEN") {
        Ok(token) if !token.trim().is_empty() => {}
        _ => {
            init_tracing_fallback();
            return None;
        }
    }

    let mut builder = logfire::configure()
        .send_to_logfire(SendToLogfire::IfTokenPresent)
        .with_service_name("memoryscape-server")
        .with_service_version(env!("CARGO_PKG_VERSION"));

    if let Ok(environment) =
        std::env::var("MEMORYSCAPE_ENVIRONMENT").or_else(|_| std::env::var("MEMORYSCAPE_ENV"))
    {
        builder = builder.with_environment(environment);
    }

    match builder.finish() {
        Ok(logfire) => Some(logfire.shutdown_guard()),
        Err(error) => {
            eprintln!(
                "failed to initialize logfire: {error:?}; falling back to tracing_subscriber"
            );
            init_tracing_fallback();
            tracing::error!(
                ?error,
                "failed to initialize logfire; using tracing_subscriber fallback"
            );
            None
        }
    }
}

fn init_tracing_fallback() {
    // Fallback logger: emit compact JSON to a rolling file, not stdout.
    // Use RUST_LOG to control the level.
    use std::fs;
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Optional override: when MEMORYSCAPE_LOG_TO_STDOUT is set (and not "0"),
    // send logs to stdout instead of a file. Useful for local debugging or
    // scripts that capture server logs via redirection.
    let log_to_stdout = std::env::var("MEMORYSCAPE_LOG_TO_STDOUT")
        .map(|v| !v.trim().is_empty() && v.trim() != "0")
        .unwrap_or(false);

    if log_to_stdout {
        if tracing_subscriber::fmt()
            .with_env_filter(env_filter.clone())
            .with_ansi(false)
            .json()
            .with_writer(std::io::stdout)
            .try_init()
            .is_ok()
        {
            return;
        }
    }

    let log_dir = std::env::var("MEMORYSCAPE_LOG_DIR").unwrap_or_else(|_| "logs".to_string());
    if let Err(err) = fs::create_dir_all(&log_dir) {
        eprintln!("failed to create log dir '{}': {err}", log_dir);
        std::process::exit(1);
    }
    let file_appender = tracing_appender::rolling::daily(&log_dir, "server.log");
    let (writer, guard) = non_blocking(file_appender);

    if tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .json()
        .with_writer(writer)
        .try_init()
        .is_ok()
    {
        let _ = TRACING_FALLBACK_GUARD.set(guard);
    }
}

enum EnvLoadStatus {
    Loaded(PathBuf),
    NotFound,
    Failed(DotenvError),
}

fn load_env_file() -> EnvLoadStatus {
    if let Ok(env_file) = std::env::var("MEMORYSCAPE_ENV_FILE") {
        let trimmed = env_file.trim();
        if !trimmed.is_empty() {
            let path = PathBuf::from(trimmed);
            return match from_filename(&path) {
                Ok(_) => {
                    let display_path = make_relative(&path).unwrap_or_else(|| path.clone());
                    EnvLoadStatus::Loaded(display_path)
                }
                Err(err) => EnvLoadStatus::Failed(err),
            };
        }
    }

    match dotenv() {
        Ok(path) => {
            let display_path = make_relative(&path).unwrap_or_else(|| path.clone());
            EnvLoadStatus::Loaded(display_path)
        }
        Err(DotenvError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            EnvLoadStatus::NotFound
        }
        Err(err) => EnvLoadStatus::Failed(err),
    }
}

fn report_env_status(status: &EnvLoadStatus) {
    match status {
        EnvLoadStatus::Loaded(path) => {
            info!("Loaded environment variables from {}", path.display());
        }
        EnvLoadStatus::NotFound => {
            info!("No .env file found; using process environment only");
        }
        EnvLoadStatus::Failed(err) => {
            warn!("Failed to load .env file: {err:?}");
        }
    }
}

fn make_relative(path: &Path) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    path.strip_prefix(&cwd).map(|p| p.to_path_buf()).ok()
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut int = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = term.recv() => {},
            _ = int.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
