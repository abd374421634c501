//! CameraConfig - Per-camera ROI/line configuration
//!
//! ## Responsibilities
//!
//! - Camera configuration types and validation
//! - File-backed config store (`camera_{id}.json`), read once per engine start
//! - Portable (pixel) configuration export for downstream consumers
//!
//! The config directory is the source of truth for what each engine runs
//! with. Engines never write back to it.

mod types;

pub use types::*;

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

const CONFIG_PREFIX: &str = "camera_";
const CONFIG_SUFFIX: &str = ".json";

/// File-backed camera configuration store
pub struct ConfigStore {
    config_dir: PathBuf,
}

impl ConfigStore {
    /// Create store, making sure the directory exists
    pub async fn new(config_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&config_dir).await?;
        Ok(Self { config_dir })
    }

    /// Path of a camera's config file
    pub fn config_path(&self, camera_id: CameraId) -> PathBuf {
        self.config_dir
            .join(format!("{}{}{}", CONFIG_PREFIX, camera_id, CONFIG_SUFFIX))
    }

    /// Load and validate a camera's configuration
    pub async fn load(&self, camera_id: CameraId) -> Result<CameraConfig> {
        let path = self.config_path(camera_id);
        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!(
                    "No active configuration found for camera {}",
                    camera_id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let file: CameraConfigFile = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("camera {}: malformed config file: {}", camera_id, e))
        })?;
        CameraConfig::from_file(camera_id, file)
    }

    /// Persist a camera's configuration
    pub async fn save(&self, config: &CameraConfig) -> Result<PathBuf> {
        config.validate()?;

        let path = self.config_path(config.camera_id);
        let json = serde_json::to_string_pretty(&config.to_file())?;
        fs::write(&path, json).await?;

        tracing::info!(
            camera_id = config.camera_id,
            path = %path.display(),
            "Camera config saved"
        );

        Ok(path)
    }

    /// Camera ids that have a config file, ascending
    pub async fn list_camera_ids(&self) -> Result<Vec<CameraId>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.config_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(id) = parse_camera_id(&name.to_string_lossy()) {
                ids.push(id);
            }
        }

        ids.sort_unstable();
        Ok(ids)
    }
}

/// `camera_12.json` -> `Some(12)`
fn parse_camera_id(file_name: &str) -> Option<CameraId> {
    file_name
        .strip_prefix(CONFIG_PREFIX)?
        .strip_suffix(CONFIG_SUFFIX)?
        .parse()
        .ok()
}

fn portable_path(logs_dir: &Path, camera_id: CameraId) -> PathBuf {
    logs_dir.join(format!("config_{}.json", camera_id))
}

/// Write the portable config snapshot to `{logs_dir}/config_{id}.json`
pub async fn export_portable(logs_dir: &Path, portable: &PortableConfig) -> Result<PathBuf> {
    fs::create_dir_all(logs_dir).await?;

    let path = portable_path(logs_dir, portable.camera_id);
    let json = serde_json::to_string_pretty(portable)?;
    fs::write(&path, json).await?;

    tracing::debug!(
        camera_id = portable.camera_id,
        path = %path.display(),
        "Portable config exported"
    );

    Ok(path)
}

/// Read back a camera's portable config; `None` until the first export
pub async fn load_portable(
    logs_dir: &Path,
    camera_id: CameraId,
) -> Result<Option<PortableConfig>> {
    let content = match fs::read_to_string(portable_path(logs_dir, camera_id)).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    Ok(Some(serde_json::from_str(&content)?))
}
