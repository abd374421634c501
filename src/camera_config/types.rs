//! Camera configuration data types

use crate::error::{Error, Result};
use crate::geometry::{denormalize, NormalizedLine, NormalizedPoint};
use serde::{Deserialize, Serialize};

/// Camera identifier (matches the camera registry primary key)
pub type CameraId = u32;

/// Per-camera config file as written by configuration upload
///
/// Every field is optional so a partial upload still parses; completeness
/// is checked by [`CameraConfig::from_file`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraConfigFile {
    #[serde(default, alias = "url")]
    pub source: Option<String>,
    #[serde(default, alias = "polygon")]
    pub roi_polygon: Option<Vec<NormalizedPoint>>,
    #[serde(default, alias = "line")]
    pub crossing_line: Option<NormalizedLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_name: Option<String>,
}

/// Validated camera configuration (read-only to the engine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub camera_id: CameraId,
    pub camera_name: String,
    pub source: String,
    pub roi_polygon: Vec<NormalizedPoint>,
    pub crossing_line: NormalizedLine,
}

impl CameraConfig {
    /// Build from a parsed config file, rejecting incomplete configurations
    pub fn from_file(camera_id: CameraId, file: CameraConfigFile) -> Result<Self> {
        let source = file
            .source
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("camera {}: stream source missing", camera_id)))?;

        let roi_polygon = file
            .roi_polygon
            .ok_or_else(|| Error::Config(format!("camera {}: ROI polygon missing", camera_id)))?;

        let crossing_line = file
            .crossing_line
            .ok_or_else(|| Error::Config(format!("camera {}: crossing line missing", camera_id)))?;

        let config = Self {
            camera_id,
            camera_name: file
                .camera_name
                .unwrap_or_else(|| format!("camera_{}", camera_id)),
            source,
            roi_polygon,
            crossing_line,
        };
        config.validate()?;

        Ok(config)
    }

    /// Check polygon/line invariants
    pub fn validate(&self) -> Result<()> {
        if self.roi_polygon.len() < 3 {
            return Err(Error::Config(format!(
                "camera {}: ROI polygon needs at least 3 vertices, got {}",
                self.camera_id,
                self.roi_polygon.len()
            )));
        }

        let line = &self.crossing_line;
        let points = self
            .roi_polygon
            .iter()
            .copied()
            .chain([line.start(), line.end()]);
        for p in points {
            if !is_normalized(p) {
                return Err(Error::Config(format!(
                    "camera {}: coordinate ({}, {}) outside [0,1]",
                    self.camera_id, p.x, p.y
                )));
            }
        }

        if line.length() <= 0.0 {
            return Err(Error::Config(format!(
                "camera {}: crossing line has zero length",
                self.camera_id
            )));
        }

        Ok(())
    }

    /// Back to the on-disk shape
    pub fn to_file(&self) -> CameraConfigFile {
        CameraConfigFile {
            source: Some(self.source.clone()),
            roi_polygon: Some(self.roi_polygon.clone()),
            crossing_line: Some(self.crossing_line),
            camera_name: Some(self.camera_name.clone()),
        }
    }
}

fn is_normalized(p: NormalizedPoint) -> bool {
    (0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y)
}

/// Frame resolution in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Pixel line as exported in the portable snapshot (drawing order kept)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelLine {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

/// Fully denormalized configuration for downstream consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortableConfig {
    pub camera_id: CameraId,
    pub camera_name: String,
    pub url: String,
    pub resolution: Resolution,
    pub polygon: Vec<[i32; 2]>,
    pub line: PixelLine,
}

impl PortableConfig {
    /// Resolve a config against the actual stream resolution
    pub fn resolve(config: &CameraConfig, width: u32, height: u32) -> Self {
        let polygon = config
            .roi_polygon
            .iter()
            .map(|p| {
                let px = denormalize(*p, width, height);
                [px.x, px.y]
            })
            .collect();

        let start = denormalize(config.crossing_line.start(), width, height);
        let end = denormalize(config.crossing_line.end(), width, height);

        Self {
            camera_id: config.camera_id,
            camera_name: config.camera_name.clone(),
            url: config.source.clone(),
            resolution: Resolution { width, height },
            polygon,
            line: PixelLine {
                x1: start.x,
                y1: start.y,
                x2: end.x,
                y2: end.y,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_file() -> CameraConfigFile {
        serde_json::from_value(serde_json::json!({
            "url": "rtsp://cam/stream",
            "polygon": [{"x": 0.1, "y": 0.1}, {"x": 0.9, "y": 0.1}, {"x": 0.5, "y": 0.9}],
            "line": {"x1": 0.2, "y1": 0.5, "x2": 0.8, "y2": 0.5}
        }))
        .unwrap()
    }

    #[test]
    fn test_legacy_field_names_parse() {
        let config = CameraConfig::from_file(4, complete_file()).unwrap();
        assert_eq!(config.source, "rtsp://cam/stream");
        assert_eq!(config.roi_polygon.len(), 3);
        assert_eq!(config.camera_name, "camera_4");
    }

    #[test]
    fn test_missing_line_is_config_error() {
        let mut file = complete_file();
        file.crossing_line = None;
        assert!(matches!(CameraConfig::from_file(1, file), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_polygon_is_config_error() {
        let mut file = complete_file();
        file.roi_polygon = None;
        assert!(matches!(CameraConfig::from_file(1, file), Err(Error::Config(_))));
    }

    #[test]
    fn test_two_vertex_polygon_rejected() {
        let mut file = complete_file();
        file.roi_polygon = Some(vec![
            NormalizedPoint { x: 0.1, y: 0.1 },
            NormalizedPoint { x: 0.2, y: 0.2 },
        ]);
        assert!(matches!(CameraConfig::from_file(1, file), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_length_line_rejected() {
        let mut file = complete_file();
        file.crossing_line = Some(NormalizedLine { x1: 0.3, y1: 0.3, x2: 0.3, y2: 0.3 });
        assert!(matches!(CameraConfig::from_file(1, file), Err(Error::Config(_))));
    }

    #[test]
    fn test_pixel_coordinates_rejected() {
        let mut file = complete_file();
        file.crossing_line = Some(NormalizedLine { x1: 10.0, y1: 300.0, x2: 600.0, y2: 300.0 });
        assert!(matches!(CameraConfig::from_file(1, file), Err(Error::Config(_))));
    }

    #[test]
    fn test_portable_config_resolves_pixels() {
        let config = CameraConfig::from_file(2, complete_file()).unwrap();
        let portable = PortableConfig::resolve(&config, 1000, 500);

        assert_eq!(portable.resolution, Resolution { width: 1000, height: 500 });
        assert_eq!(portable.polygon[0], [100, 50]);
        assert_eq!(portable.line, PixelLine { x1: 200, y1: 250, x2: 800, y2: 250 });
        assert_eq!(portable.url, "rtsp://cam/stream");
    }
}
