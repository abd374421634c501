//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - Health and engine status
//! - Crossing statistics and recent events
//! - Deploy/stop trigger for a camera's engine

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let tracker_ok = state.tracker_probe.health_check().await;
    let db_ok = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();

    let response = HealthResponse {
        status: if db_ok { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        tracker_connected: tracker_ok,
        db_connected: db_ok,
        running_engines: state.supervisor.running_count().await,
    };

    Json(response)
}
