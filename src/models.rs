//! Shared API models
//!
//! Types shared by the web API and the binary.

use crate::camera_config::CameraId;
use crate::engine::EngineState;
use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub tracker_connected: bool,
    pub db_connected: bool,
    pub running_engines: usize,
}

/// Per-camera line of `GET /api/stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraStats {
    pub camera_id: CameraId,
    pub state: EngineState,
    /// Since process start
    pub total_in: u64,
    pub total_out: u64,
    pub errors: u64,
    /// All time, from the crossing table
    pub stored_in: i64,
    pub stored_out: i64,
}

/// Query for event listing
#[derive(Debug, Clone, Deserialize)]
pub struct EventsQuery {
    #[serde(default = "default_events_limit")]
    pub limit: u32,
}

fn default_events_limit() -> u32 {
    50
}
