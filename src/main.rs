use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    Router,
    http::{Method, header},
    routing::get,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod daemon;
mod db;
mod error;
mod models;
mod pipeline;
mod probes;
mod registry;
mod scheduler;

use api::AppState;
use daemon::ZapDaemon;
use db::PgStore;
use pipeline::Orchestrator;
use probes::{HttpProber, NiktoWebScanner, NmapPortScanner};
use registry::CancelRegistry;
use scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "vigil_api=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = config::Config::from_env()?;
    tracing::info!("Environment: {:?}", config.environment);

    // Database connection
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .connect(&config.database_url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("Database migrations completed");

    // Wire the pipeline
    let store: Arc<dyn db::Store> = Arc::new(PgStore::new(pool));
    let registry = Arc::new(CancelRegistry::new());
    let zap = Arc::new(ZapDaemon::new(
        config.scan_daemon_url.clone(),
        config.scan_daemon_api_key.clone(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        zap,
        Arc::new(HttpProber::new()),
        Arc::new(NmapPortScanner),
        Arc::new(NiktoWebScanner),
        registry.clone(),
    ));

    // Recurrence scheduler
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        orchestrator.clone(),
        registry.clone(),
        config.max_scheduled_scans,
    ));
    tokio::spawn(scheduler.run(Duration::from_secs(config.scheduler_tick_secs)));
    tracing::info!(
        "Recurrence scheduler started (tick {}s, cap {})",
        config.scheduler_tick_secs,
        config.max_scheduled_scans
    );

    let app_state = AppState::new(store, registry, orchestrator);

    // Configure CORS - allow dashboard origins
    // Supports comma-separated list of origins for multiple environments
    let frontend_url =
        std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".into());

    let origins: Vec<header::HeaderValue> = frontend_url
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    tracing::info!("CORS configured for origins: {}", frontend_url);

    // Build router
    let app = Router::new()
        .route("/ping", get(api::health::ping))
        .route("/health", get(api::health::health_check))
        .nest("/v1", api::routes::v1_routes())
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
