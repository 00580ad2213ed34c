use anyhow::Result;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use survey_tool::{
    api::{create_router, AppState},
    config::{Config, LoggingConfig},
    database::Database,
    log_system_event,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let _guard = setup_logging(&config.logging)?;
    config.validate()?;

    log_system_event!(startup, component = "server", "Starting survey server");

    // Initialize database
    let db = Database::with_max_connections(&config.database.url, config.database.max_connections).await?;
    info!("Database initialized successfully");

    spawn_session_purge(db.clone(), config.survey.session_purge_interval_minutes);

    let state = AppState::new(db, &config.survey);

    let app = create_router(state).layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let addr = config.server.address();
    info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    log_system_event!(shutdown, component = "server", "Server stopped");
    Ok(())
}

/// Delete expired session rows now and then on every tick.
fn spawn_session_purge(db: Database, interval_minutes: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_minutes.saturating_mul(60)));
        loop {
            // The first tick completes immediately.
            ticker.tick().await;
            match db.delete_expired_sessions().await {
                Ok(removed) => info!(removed = removed, "Expired sessions purged"),
                Err(e) => warn!(error = %e, "Could not purge expired sessions"),
            }
        }
    });
}

fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    use std::fs;
    use tracing_subscriber::fmt;

    let env_filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = config.console_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(true)
    });

    let (file_layer, guard) = if config.file_enabled {
        fs::create_dir_all(&config.log_directory).unwrap_or_else(|e| {
            eprintln!("Warning: Could not create log directory: {}", e);
        });

        // Daily rotation, no ANSI colors in files
        let file_appender = tracing_appender::rolling::daily(&config.log_directory, "survey-tool.log");
        let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
        let layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(non_blocking_file);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(
        directory = %config.log_directory,
        file_enabled = config.file_enabled,
        "Logging initialized"
    );

    Ok(guard)
}
