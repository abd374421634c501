//! Application state
//!
//! Holds all shared components and state

use crate::camera_config::{CameraId, ConfigStore};
use crate::crossing_store::MySqlCrossingStore;
use crate::engine::EngineSettings;
use crate::engine_supervisor::EngineSupervisor;
use crate::error::Result;
use crate::event_emitter::CrossingCounters;
use crate::frame_source::FfmpegFrameSource;
use crate::tracker_client::HttpTracker;
use sqlx::MySqlPool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database URL
    pub database_url: String,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Directory holding camera_{id}.json files
    pub config_dir: PathBuf,
    /// Root for snapshots, logs and portable configs
    pub data_dir: PathBuf,
    /// Detector/tracker service URL
    pub tracker_url: String,
    /// Side threshold in pixels
    pub line_threshold: f64,
    pub alert_cooldown: Duration,
    pub retry_backoff: Duration,
    pub stop_timeout: Duration,
    /// Decode size for camera streams
    pub frame_width: u32,
    pub frame_height: u32,
    /// Pause after each processed frame
    pub frame_interval: Duration,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "mysql://root@localhost/crossline".to_string()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 8080),
            config_dir: std::env::var("CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("configs")),
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            tracker_url: std::env::var("TRACKER_URL")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            line_threshold: env_or("LINE_THRESHOLD", 10.0),
            alert_cooldown: Duration::from_secs(env_or("ALERT_COOLDOWN_SEC", 3)),
            retry_backoff: Duration::from_secs(env_or("RETRY_BACKOFF_SEC", 5)),
            stop_timeout: Duration::from_millis(env_or("STOP_TIMEOUT_MS", 30_000)),
            frame_width: env_or("FRAME_WIDTH", 1280),
            frame_height: env_or("FRAME_HEIGHT", 720),
            frame_interval: Duration::from_millis(env_or("FRAME_INTERVAL_MS", 10)),
        }
    }
}

impl AppConfig {
    /// Per-run engine tunables
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            line_threshold: self.line_threshold,
            cooldown: self.alert_cooldown,
            retry_backoff: self.retry_backoff,
            frame_interval: self.frame_interval,
            stop_timeout: self.stop_timeout,
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database pool
    pub pool: MySqlPool,
    /// Application config
    pub config: AppConfig,
    /// Camera config files
    pub config_store: Arc<ConfigStore>,
    /// Durable crossing records
    pub store: Arc<MySqlCrossingStore>,
    /// Per-camera engines
    pub supervisor: Arc<EngineSupervisor<MySqlCrossingStore>>,
    /// Per-camera IN/OUT totals
    pub counters: Arc<CrossingCounters>,
    /// Tracker health probe
    pub tracker_probe: Arc<HttpTracker>,
    /// Process start
    pub started_at: Instant,
}

impl AppState {
    /// Load the camera's config file and (re)start its engine
    pub async fn deploy_camera(&self, camera_id: CameraId) -> Result<()> {
        let config = self.config_store.load(camera_id).await?;
        let source = FfmpegFrameSource::new(
            config.source.clone(),
            self.config.frame_width,
            self.config.frame_height,
        );
        let tracker = HttpTracker::with_timeout(
            self.config.tracker_url.clone(),
            camera_id,
            self.config.engine_settings().call_timeout(),
        )?;

        self.supervisor.start(config, source, tracker).await?;
        tracing::info!(camera_id, "Camera deployed");
        Ok(())
    }

    /// Start every camera found in the config dir; malformed files are skipped
    pub async fn autostart(&self) -> Result<usize> {
        let mut started = 0;
        for camera_id in self.config_store.list_camera_ids().await? {
            match self.deploy_camera(camera_id).await {
                Ok(()) => started += 1,
                Err(e) => {
                    tracing::error!(camera_id, error = %e, "Autostart skipped camera");
                }
            }
        }
        Ok(started)
    }
}
