//! CrossingDetector - per-frame sign-reversal detection
//!
//! ## Responsibilities
//!
//! - ROI filtering of tracked detections
//! - Track side bookkeeping (via TrackStateStore)
//! - Crossing decision with a double threshold against jitter near the line
//! - Direction classification (IN / OUT)
//!
//! ## Algorithm (per detection, in supplied order)
//!
//! 1. Box center; skip entirely if outside the ROI
//! 2. Side = signed distance from the canonical line
//! 3. First sighting records the side and never fires
//! 4. Fires iff both |prev| and |side| exceed the threshold and the signs differ
//! 5. Stored side is always refreshed

use crate::camera_config::{CameraConfig, Resolution};
use crate::geometry::{
    canonicalize_line, denormalize_polygon, point_in_roi, CanonicalLine, NormalizedLine,
    NormalizedPoint, PixelPoint,
};
use crate::track_state::{TrackId, TrackStateStore};
use crate::tracker_client::Detection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default side threshold in pixels
pub const DEFAULT_LINE_THRESHOLD: f64 = 10.0;

/// Crossing direction
///
/// IN means the track ended up on the positive side of the canonical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// `side > 0` -> IN, otherwise OUT
    pub fn from_side(side: f64) -> Self {
        if side > 0.0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sign reversal with both samples clear of the line
pub fn is_crossing(prev_side: f64, side: f64, threshold: f64) -> bool {
    prev_side.abs() > threshold && side.abs() > threshold && prev_side * side < 0.0
}

/// Crossing found in one frame, before cooldown
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossingCandidate {
    pub track_id: TrackId,
    pub direction: Direction,
    pub side: f64,
}

/// Line and ROI resolved against a concrete frame size
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedGeometry {
    pub resolution: Resolution,
    pub line: CanonicalLine,
    pub polygon: Vec<PixelPoint>,
}

impl ResolvedGeometry {
    pub fn resolve(
        roi_polygon: &[NormalizedPoint],
        crossing_line: &NormalizedLine,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            resolution: Resolution { width, height },
            line: canonicalize_line(crossing_line, width, height),
            polygon: denormalize_polygon(roi_polygon, width, height),
        }
    }
}

/// Stateful detector for one camera and one engine run
pub struct CrossingDetector {
    roi_polygon: Vec<NormalizedPoint>,
    crossing_line: NormalizedLine,
    threshold: f64,
    tracks: TrackStateStore,
    geometry: Option<ResolvedGeometry>,
}

impl CrossingDetector {
    pub fn new(
        roi_polygon: Vec<NormalizedPoint>,
        crossing_line: NormalizedLine,
        threshold: f64,
    ) -> Self {
        Self {
            roi_polygon,
            crossing_line,
            threshold,
            tracks: TrackStateStore::new(),
            geometry: None,
        }
    }

    pub fn from_config(config: &CameraConfig, threshold: f64) -> Self {
        Self::new(config.roi_polygon.clone(), config.crossing_line, threshold)
    }

    pub fn geometry(&self) -> Option<&ResolvedGeometry> {
        self.geometry.as_ref()
    }

    pub fn tracks(&self) -> &TrackStateStore {
        &self.tracks
    }

    /// Resolve pixel geometry once per resolution
    fn refresh_geometry(&mut self, width: u32, height: u32) {
        let resolution = Resolution { width, height };
        if let Some(current) = &self.geometry {
            if current.resolution == resolution {
                return;
            }
            tracing::warn!(
                old_width = current.resolution.width,
                old_height = current.resolution.height,
                width,
                height,
                "Frame resolution changed, re-resolving crossing geometry"
            );
        }

        let geometry =
            ResolvedGeometry::resolve(&self.roi_polygon, &self.crossing_line, width, height);
        tracing::debug!(
            p1 = ?geometry.line.p1,
            p2 = ?geometry.line.p2,
            vertices = geometry.polygon.len(),
            "Crossing geometry resolved"
        );
        self.geometry = Some(geometry);
    }

    /// Process one frame of tracked detections
    ///
    /// Returns crossings in detection order.
    pub fn process_frame(
        &mut self,
        width: u32,
        height: u32,
        detections: &[Detection],
    ) -> Vec<CrossingCandidate> {
        self.refresh_geometry(width, height);
        let Some(geometry) = self.geometry.as_ref() else {
            return Vec::new();
        };

        let active_ids: HashSet<TrackId> = detections.iter().map(|d| d.track_id).collect();
        let dropped = self.tracks.retain_only(&active_ids);
        if dropped > 0 {
            tracing::debug!(dropped, "Stale tracks removed");
        }

        let mut crossings = Vec::new();

        for detection in detections {
            if !detection.bbox.is_finite() {
                tracing::warn!(
                    track_id = detection.track_id,
                    bbox = ?detection.bbox,
                    "Non-finite bounding box skipped"
                );
                continue;
            }

            let center = detection.bbox.center();
            if !point_in_roi(center, &geometry.polygon) {
                continue;
            }

            let side = geometry.line.side_of(center);

            let Some(prev_side) = self.tracks.get(detection.track_id) else {
                tracing::debug!(track_id = detection.track_id, side, "Track first sighting");
                self.tracks.set(detection.track_id, side);
                continue;
            };

            if is_crossing(prev_side, side, self.threshold) {
                crossings.push(CrossingCandidate {
                    track_id: detection.track_id,
                    direction: Direction::from_side(side),
                    side,
                });
            }

            self.tracks.set(detection.track_id, side);
        }

        crossings
    }
}
