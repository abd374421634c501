//! EventEmitter - crossing event emission
//!
//! ## Responsibilities
//!
//! - Write the JPEG snapshot of the triggering frame
//! - Append the durable crossing record
//! - Append one line to the per-camera JSON log
//! - Maintain per-camera IN/OUT/error counters
//!
//! Every failure here is absorbed: the caller's loop keeps running and the
//! triggering frame is never reprocessed.
//!
//! The snapshot is written before the durable append. When the append fails
//! the JPEG stays under `camera_images/` with no record pointing at it; the
//! `store_failed` log line keeps `image` set so the file can be traced.

mod counters;

pub use counters::{CameraCounters, CrossingCounters};

use crate::camera_config::CameraId;
use crate::crossing_detector::{CrossingCandidate, Direction};
use crate::crossing_store::{CrossingEvent, CrossingStore};
use crate::error::{Error, Result};
use crate::frame_source::{Frame, DEFAULT_JPEG_QUALITY};
use crate::track_state::TrackId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Images subdirectory (relative to the data dir)
pub const IMAGES_DIR: &str = "camera_images";
/// Logs subdirectory (relative to the data dir)
pub const LOGS_DIR: &str = "logs";

/// How far an emission got
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitStatus {
    Success,
    /// Record stored without a snapshot
    ImageFailed,
    /// Durable append failed; dropped. Any snapshot already written is kept
    /// and named in the log line's `image`
    StoreFailed,
}

/// One line of `camera{id}_log.jsonl`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub timestamp: DateTime<Utc>,
    pub camera_id: String,
    pub event_type: Direction,
    pub count: u32,
    pub track_id: TrackId,
    pub image: Option<String>,
    pub status: EmitStatus,
}

impl EventLogEntry {
    fn new(event: &CrossingEvent, status: EmitStatus) -> Self {
        Self {
            timestamp: event.timestamp,
            camera_id: format!("camera{}", event.camera_id),
            event_type: event.direction,
            count: 1,
            track_id: event.track_id,
            image: event.snapshot_ref.clone(),
            status,
        }
    }
}

/// Result of one emission
#[derive(Debug, Clone)]
pub struct EmitOutcome {
    pub event: CrossingEvent,
    /// Storage id when the durable append succeeded
    pub event_id: Option<u64>,
    pub status: EmitStatus,
}

/// Snapshot file name: `camera{id}_{DIR}_{YYYYmmdd_HHMMSS_mmm}.jpg`
pub fn snapshot_file_name(camera_id: CameraId, direction: Direction, at: DateTime<Utc>) -> String {
    format!(
        "camera{}_{}_{}.jpg",
        camera_id,
        direction.as_str(),
        at.format("%Y%m%d_%H%M%S_%3f")
    )
}

/// Per-camera log file name
pub fn log_file_name(camera_id: CameraId) -> String {
    format!("camera{}_log.jsonl", camera_id)
}

/// Shared by all camera engines
pub struct EventEmitter<S> {
    data_dir: PathBuf,
    store: Arc<S>,
    counters: Arc<CrossingCounters>,
    jpeg_quality: u8,
}

impl<S: CrossingStore> EventEmitter<S> {
    /// Create emitter, making sure the image and log directories exist
    pub async fn new(
        data_dir: impl Into<PathBuf>,
        store: Arc<S>,
        counters: Arc<CrossingCounters>,
    ) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(data_dir.join(IMAGES_DIR)).await?;
        tokio::fs::create_dir_all(data_dir.join(LOGS_DIR)).await?;

        Ok(Self {
            data_dir,
            store,
            counters,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        })
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join(LOGS_DIR)
    }

    pub fn log_path(&self, camera_id: CameraId) -> PathBuf {
        self.logs_dir().join(log_file_name(camera_id))
    }

    pub fn counters(&self) -> &Arc<CrossingCounters> {
        &self.counters
    }

    /// Emit one crossing that already passed the cooldown gate
    pub async fn emit(
        &self,
        camera_id: CameraId,
        candidate: &CrossingCandidate,
        frame: &Frame,
    ) -> EmitOutcome {
        let timestamp = Utc::now();

        let snapshot_ref = match self
            .write_snapshot(camera_id, candidate.direction, frame, timestamp)
            .await
        {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(
                    camera_id,
                    track_id = candidate.track_id,
                    error = %e,
                    "Snapshot write failed, emitting without image"
                );
                None
            }
        };

        let event = CrossingEvent {
            camera_id,
            track_id: candidate.track_id,
            direction: candidate.direction,
            timestamp,
            snapshot_ref,
        };

        let (event_id, status) = match self.store.append(&event).await {
            Ok(id) => {
                self.counters.record(camera_id, event.direction).await;
                let status = if event.snapshot_ref.is_some() {
                    EmitStatus::Success
                } else {
                    EmitStatus::ImageFailed
                };
                (Some(id), status)
            }
            Err(e) => {
                self.counters.record_error(camera_id).await;
                tracing::error!(
                    camera_id,
                    track_id = event.track_id,
                    direction = %event.direction,
                    snapshot = ?event.snapshot_ref,
                    error = %e,
                    "Crossing record append failed, event dropped"
                );
                (None, EmitStatus::StoreFailed)
            }
        };

        if let Err(e) = self
            .append_log(camera_id, &EventLogEntry::new(&event, status))
            .await
        {
            tracing::error!(camera_id, error = %e, "Failed to append camera log");
        }

        tracing::info!(
            camera_id,
            track_id = event.track_id,
            direction = %event.direction,
            status = ?status,
            "{}",
            event.message()
        );

        EmitOutcome {
            event,
            event_id,
            status,
        }
    }

    /// Encode and write the frame; returns the data-dir-relative path
    async fn write_snapshot(
        &self,
        camera_id: CameraId,
        direction: Direction,
        frame: &Frame,
        at: DateTime<Utc>,
    ) -> Result<String> {
        let file_name = snapshot_file_name(camera_id, direction, at);
        let relative = format!("{}/{}", IMAGES_DIR, file_name);
        let path = self.data_dir.join(IMAGES_DIR).join(&file_name);

        let frame = frame.clone();
        let quality = self.jpeg_quality;
        let jpeg = tokio::task::spawn_blocking(move || frame.to_jpeg(quality))
            .await
            .map_err(|e| Error::Internal(format!("snapshot encoder task failed: {}", e)))??;

        tokio::fs::write(&path, jpeg).await?;
        Ok(relative)
    }

    async fn append_log(&self, camera_id: CameraId, entry: &EventLogEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let path = self.log_path(camera_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
