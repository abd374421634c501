//! API Routes

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use std::collections::BTreeMap;

use crate::camera_config::CameraId;
use crate::engine::EngineState;
use crate::engine_supervisor::EngineStatus;
use crate::crossing_store::CrossingEvent;
use crate::error::Result;
use crate::models::{ApiResponse, CameraStats, EventsQuery};
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Engines
        .route("/api/deployments/active", get(list_active))
        .route("/api/cameras/:id/deploy", post(deploy_camera))
        .route("/api/cameras/:id/engine", delete(stop_camera))
        // Crossings
        .route("/api/stats", get(crossing_stats))
        .route("/api/cameras/:id/events", get(camera_events))
        .with_state(state)
}

// ========================================
// Engines
// ========================================

async fn list_active(State(state): State<AppState>) -> Json<ApiResponse<Vec<EngineStatus>>> {
    Json(ApiResponse::success(state.supervisor.active().await))
}

async fn deploy_camera(
    State(state): State<AppState>,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<ApiResponse<EngineState>>> {
    state.deploy_camera(camera_id).await?;
    let engine_state = state.supervisor.state(camera_id).await;
    Ok(Json(ApiResponse::success(engine_state)))
}

async fn stop_camera(
    State(state): State<AppState>,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<ApiResponse<bool>>> {
    let stopped = state.supervisor.stop(camera_id).await?;
    if stopped {
        tracing::info!(camera_id, "Camera engine stopped via API");
    }
    Ok(Json(ApiResponse::success(stopped)))
}

// ========================================
// Crossings
// ========================================

fn empty_stats(camera_id: CameraId) -> CameraStats {
    CameraStats {
        camera_id,
        state: EngineState::Stopped,
        total_in: 0,
        total_out: 0,
        errors: 0,
        stored_in: 0,
        stored_out: 0,
    }
}

async fn crossing_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<CameraStats>>>> {
    let mut stats: BTreeMap<CameraId, CameraStats> = BTreeMap::new();

    for (camera_id, counters) in state.counters.snapshot().await {
        let entry = stats.entry(camera_id).or_insert_with(|| empty_stats(camera_id));
        entry.total_in = counters.total_in;
        entry.total_out = counters.total_out;
        entry.errors = counters.errors;
    }

    for totals in state.store.totals_by_camera().await? {
        let entry = stats
            .entry(totals.camera_id)
            .or_insert_with(|| empty_stats(totals.camera_id));
        entry.stored_in = totals.total_in;
        entry.stored_out = totals.total_out;
    }

    for status in state.supervisor.active().await {
        stats
            .entry(status.camera_id)
            .or_insert_with(|| empty_stats(status.camera_id))
            .state = status.state;
    }

    Ok(Json(ApiResponse::success(stats.into_values().collect())))
}

async fn camera_events(
    State(state): State<AppState>,
    Path(camera_id): Path<CameraId>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<ApiResponse<Vec<CrossingEvent>>>> {
    let limit = query.limit.clamp(1, 500);
    let events = state.store.recent_by_camera(camera_id, limit).await?;
    Ok(Json(ApiResponse::success(events)))
}
