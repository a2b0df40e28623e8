//! Accord scheduling & accountability core: wires config -> store/vault ->
//! scheduler, exposes a thin axum health/ready/metrics surface, and hosts
//! the operator install/uninstall CLI (§6).

mod commands;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use clap::{Parser, Subcommand};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use accord_config::AppConfig;
use accord_domain::{AccountabilityProfile, JobRegistry as _, SystemClock};
use accord_scheduler::{
    AccountabilityScheduler, HealthReport, LifeWeeksScheduler, LoggingDispatchPort,
    RetentionSweeper, RuntimeScheduler, SrsScheduler,
};
use accord_storage::{PgRetentionStore, PgStore, check_connection, create_pool, run_migrations};

use commands::Backend;

#[derive(Parser)]
#[command(name = "accord", about = "Scheduling & accountability core")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the long-lived scheduler process and health surface (default).
    Serve,
    /// Write an OS-level schedule config file for one of the global jobs.
    Install {
        job: String,
        #[arg(long, value_enum)]
        backend: Backend,
        #[arg(long, default_value = ".")]
        working_directory: String,
        #[arg(long, default_value = "/usr/local/bin/accord")]
        binary_path: String,
    },
    /// Remove a previously installed schedule config file.
    Uninstall {
        job: String,
        #[arg(long, value_enum)]
        backend: Backend,
        #[arg(long, default_value = ".")]
        working_directory: String,
    },
}

#[derive(Clone)]
struct AppState {
    health: Arc<accord_scheduler::HealthRegistry>,
    pool: sqlx::PgPool,
    admin_api_key: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Install {
            job,
            backend,
            working_directory,
            binary_path,
        } => {
            let code = commands::install(
                &job,
                backend,
                &working_directory,
                &binary_path,
                config.srs_morning_batch_time,
            );
            std::process::exit(code)
        }
        Command::Uninstall {
            job,
            backend,
            working_directory,
        } => {
            let code = commands::uninstall(&job, backend, &working_directory);
            std::process::exit(code)
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("starting accord scheduler...");

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    tracing::info!("database connection pool ready");

    let store = Arc::new(PgStore::new(pool.clone()));
    let job_registry = Arc::new(accord_storage::PgJobRegistry::new(pool.clone()));
    let retention_store = Arc::new(PgRetentionStore::new(pool.clone()));

    let clock = Arc::new(SystemClock);
    let dispatch = Arc::new(LoggingDispatchPort);
    let runtime = Arc::new(RuntimeScheduler::new(clock.clone()));

    let accountability = AccountabilityScheduler::new(
        runtime.clone(),
        store.clone(),
        dispatch.clone(),
        clock.clone(),
        config.quiet_hours_start,
        config.quiet_hours_end,
    );

    let srs_engine = Arc::new(accord_domain::srs::SrsEngine::new(
        PgStore::new(pool.clone()),
        accord_storage::FsVault::new(config.vault_root.clone()),
    ));
    let srs_scheduler = SrsScheduler::new(
        runtime.clone(),
        srs_engine,
        dispatch.clone(),
        clock.clone(),
        config.srs_morning_batch_time,
        config.srs_morning_batch_size,
        config.srs_morning_batch_max_size,
    );

    // Startup rehydration: re-install every user's jobs the way
    // `restore_all_schedules` does in the legacy accountability scheduler.
    // `JobRegistry` names which users currently have an active schedule;
    // `accountability_profiles` carries the preferences to schedule with.
    let scheduled_users = job_registry.all_scheduled_users().await?;
    let all_profiles = accord_domain::Store::accountability_profiles(store.as_ref()).await?;
    let profiles: Vec<AccountabilityProfile> = all_profiles
        .into_iter()
        .filter(|p| scheduled_users.iter().any(|(u, _)| u == &p.user_id))
        .collect();
    for profile in &profiles {
        accountability.schedule_user(profile).await?;
    }
    tracing::info!(count = profiles.len(), "rehydrated accountability jobs");

    let srs_users: Vec<String> = scheduled_users.iter().map(|(u, _)| u.clone()).collect();
    srs_scheduler.install(&srs_users).await?;

    if config.life_weeks_enabled {
        let life_weeks_settings = accord_domain::Store::life_weeks_settings_for_enabled_users(
            store.as_ref(),
        )
        .await?;
        let users: Vec<_> = life_weeks_settings
            .into_iter()
            .map(|s| (s.user_id.clone(), s))
            .collect();
        let life_weeks = LifeWeeksScheduler::new(
            runtime.clone(),
            dispatch.clone(),
            Arc::new(NullReplyRouter),
            clock.clone(),
        );
        let count = users.len();
        life_weeks.install(users).await?;
        tracing::info!(count, "installed life-weeks jobs");
    }

    let retention = RetentionSweeper::new(runtime.clone(), retention_store, clock.clone());
    retention.install().await?;

    runtime.start().await;
    tracing::info!("scheduler dispatch loop started");

    let state = AppState {
        health: runtime.health(),
        pool: pool.clone(),
        admin_api_key: config.admin_api_key.clone(),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("health surface listening on {}", config.bind_address);

    let shutdown_runtime = runtime.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown_runtime.stop().await;
        })
        .await?;

    Ok(())
}

/// A `ReplyRouter` for processes that don't have a live chat transport
/// attached (e.g. this standalone binary) — tracking a reply destination
/// is the transport's job; the core only calls the hook.
struct NullReplyRouter;

#[async_trait::async_trait]
impl accord_scheduler::life_weeks::ReplyRouter for NullReplyRouter {
    async fn track_reply_context(
        &self,
        _user_id: &str,
        _settings: &accord_domain::entities::LifeWeeksSettings,
    ) -> Result<(), accord_domain::DomainError> {
        Ok(())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn ready(State(state): State<AppState>) -> Json<serde_json::Value> {
    let db_status = match check_connection(&state.pool).await {
        Ok(()) => "connected",
        Err(_) => "disconnected",
    };
    Json(serde_json::json!({
        "status": if db_status == "connected" { "ok" } else { "degraded" },
        "database": db_status,
    }))
}

async fn metrics(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> Result<Json<HealthReport>, axum::http::StatusCode> {
    if !state.admin_api_key.is_empty() {
        let provided = headers
            .get("x-admin-api-key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != state.admin_api_key {
            return Err(axum::http::StatusCode::UNAUTHORIZED);
        }
    }
    Ok(Json(state.health.report()))
}
