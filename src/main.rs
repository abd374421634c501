//! Crossline Counter - per-camera line-crossing counter
//!
//! Main entry point.

use crossline_counter::{
    camera_config::ConfigStore,
    cooldown_gate::CooldownGate,
    crossing_store::MySqlCrossingStore,
    engine_supervisor::EngineSupervisor,
    event_emitter::{CrossingCounters, EventEmitter},
    state::{AppConfig, AppState},
    tracker_client::HttpTracker,
    web_api,
};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crossline_counter=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Crossline Counter v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        config_dir = %config.config_dir.display(),
        data_dir = %config.data_dir.display(),
        tracker_url = %config.tracker_url,
        line_threshold = config.line_threshold,
        cooldown_sec = config.alert_cooldown.as_secs(),
        "Configuration loaded"
    );

    // Create database pool; acquiring a connection must not outlast an engine stop
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(config.engine_settings().call_timeout())
        .connect(&config.database_url)
        .await?;

    tracing::info!("Database connected");

    let store = Arc::new(MySqlCrossingStore::new(pool.clone()));
    store.ensure_schema().await?;

    let config_store = Arc::new(ConfigStore::new(config.config_dir.clone()).await?);
    let counters = Arc::new(CrossingCounters::new());
    let emitter = Arc::new(
        EventEmitter::new(config.data_dir.clone(), store.clone(), counters.clone()).await?,
    );
    let cooldown = Arc::new(CooldownGate::new(config.alert_cooldown));
    let supervisor = Arc::new(EngineSupervisor::new(
        cooldown.clone(),
        emitter,
        config.engine_settings(),
    ));
    let tracker_probe = Arc::new(HttpTracker::new(config.tracker_url.clone(), 0)?);

    let state = AppState {
        pool,
        config: config.clone(),
        config_store,
        store,
        supervisor: supervisor.clone(),
        counters,
        tracker_probe,
        started_at: Instant::now(),
    };

    // Start engines for every configured camera
    let started = state.autostart().await?;
    tracing::info!(started, "Camera engines started");

    // Drop expired cooldown entries
    let cooldown_cleanup = cooldown.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let pruned = cooldown_cleanup.prune(tokio::time::Instant::now()).await;
            if pruned > 0 {
                tracing::debug!(pruned, "Expired cooldown entries removed");
            }
        }
    });

    let app = web_api::create_router(state.clone())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    supervisor.stop_all().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
