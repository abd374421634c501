//! TrackerClient - external detector/tracker adapter
//!
//! ## Responsibilities
//!
//! - `Detection`: one tracked person box with a stable track id
//! - `Tracker`: per-frame contract consumed by the engine
//! - `HttpTracker`: multipart upload of the frame to the tracker service
//!
//! Class/confidence filtering happens inside the tracker service. One
//! tracker instance is bound to one engine run so identities persist
//! across that camera's frames only.

use crate::camera_config::CameraId;
use crate::error::{Error, Result};
use crate::frame_source::{Frame, DEFAULT_JPEG_QUALITY};
use crate::geometry::BBox;
use crate::track_state::TrackId;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// One tracked object in a frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub track_id: TrackId,
    pub bbox: BBox,
}

/// Detector + tracker for one camera
pub trait Tracker: Send + 'static {
    /// Tracked detections for `frame`, in tracker order
    fn track(&mut self, frame: &Frame) -> impl Future<Output = Result<Vec<Detection>>> + Send;
}

/// Track entry as returned by the tracker service
#[derive(Debug, Clone, Deserialize)]
struct TrackEntry {
    track_id: TrackId,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

/// Tracker service response
#[derive(Debug, Clone, Deserialize)]
struct TrackResponse {
    #[serde(default)]
    tracks: Vec<TrackEntry>,
}

impl TrackResponse {
    fn into_detections(self) -> Vec<Detection> {
        self.tracks
            .into_iter()
            .map(|t| Detection {
                track_id: t.track_id,
                bbox: BBox::new(t.x1, t.y1, t.x2, t.y2),
            })
            .collect()
    }
}

/// HTTP client for the tracker service (`POST {base_url}/v1/track`)
pub struct HttpTracker {
    client: reqwest::Client,
    base_url: String,
    camera_id: CameraId,
}

impl HttpTracker {
    /// Create tracker client with the default 10s timeout
    pub fn new(base_url: impl Into<String>, camera_id: CameraId) -> Result<Self> {
        Self::with_timeout(base_url, camera_id, Duration::from_secs(10))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        camera_id: CameraId,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            camera_id,
        })
    }

    /// Check tracker health
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/healthz", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn request(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let url = format!("{}/v1/track", self.base_url);

        let jpeg = frame.to_jpeg(DEFAULT_JPEG_QUALITY)?;
        let form = Form::new()
            .part(
                "frame",
                Part::bytes(jpeg)
                    .file_name("frame.jpg")
                    .mime_str("image/jpeg")?,
            )
            // Session key: the service keeps one tracker state per camera
            .text("camera_id", self.camera_id.to_string())
            .text("sequence", frame.sequence.to_string());

        let resp = self.client.post(&url).multipart(form).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Tracker(format!(
                "tracker request failed: {} - {}",
                status, body
            )));
        }

        let parsed: TrackResponse = resp.json().await?;
        Ok(parsed.into_detections())
    }
}

impl Tracker for HttpTracker {
    async fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.request(frame).await
    }
}
