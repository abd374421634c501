//! CrossingStore - durable crossing records
//!
//! ## Responsibilities
//!
//! - `CrossingEvent`: immutable record of one emitted crossing
//! - `CrossingStore`: append-only contract shared by all camera workers
//! - `MySqlCrossingStore`: sqlx-backed implementation
//!
//! The engine only ever appends. Records are never updated or deleted here.

mod repository;

pub use repository::{CameraTotals, MySqlCrossingStore};

use crate::camera_config::CameraId;
use crate::crossing_detector::Direction;
use crate::error::Result;
use crate::track_state::TrackId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// One emitted crossing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossingEvent {
    pub camera_id: CameraId,
    pub track_id: TrackId,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    /// Snapshot path relative to the data dir; `None` if the image write failed
    pub snapshot_ref: Option<String>,
}

impl CrossingEvent {
    /// Human-readable alert text ("Person IN")
    pub fn message(&self) -> String {
        format!("Person {}", self.direction)
    }
}

/// Durable, concurrently appendable event storage
pub trait CrossingStore: Send + Sync + 'static {
    /// Append one record; returns its storage id
    fn append(&self, event: &CrossingEvent) -> impl Future<Output = Result<u64>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_direction_uppercase() {
        let event = CrossingEvent {
            camera_id: 2,
            track_id: 41,
            direction: Direction::Out,
            timestamp: Utc::now(),
            snapshot_ref: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["direction"], "OUT");
        assert!(json["snapshot_ref"].is_null());
        assert_eq!(event.message(), "Person OUT");
    }
}
