//! Per-camera summary counters

use crate::camera_config::CameraId;
use crate::crossing_detector::Direction;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Totals for one camera since process start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CameraCounters {
    pub total_in: u64,
    pub total_out: u64,
    pub errors: u64,
}

/// Counters for all cameras
#[derive(Default)]
pub struct CrossingCounters {
    cameras: RwLock<HashMap<CameraId, CameraCounters>>,
}

impl CrossingCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a durably stored crossing
    pub async fn record(&self, camera_id: CameraId, direction: Direction) {
        let mut cameras = self.cameras.write().await;
        let entry = cameras.entry(camera_id).or_default();
        match direction {
            Direction::In => entry.total_in += 1,
            Direction::Out => entry.total_out += 1,
        }
    }

    /// Count a crossing lost to a storage failure
    pub async fn record_error(&self, camera_id: CameraId) {
        let mut cameras = self.cameras.write().await;
        cameras.entry(camera_id).or_default().errors += 1;
    }

    pub async fn get(&self, camera_id: CameraId) -> CameraCounters {
        self.cameras
            .read()
            .await
            .get(&camera_id)
            .copied()
            .unwrap_or_default()
    }

    /// All cameras, sorted by id
    pub async fn snapshot(&self) -> Vec<(CameraId, CameraCounters)> {
        let cameras = self.cameras.read().await;
        let mut all: Vec<_> = cameras.iter().map(|(id, c)| (*id, *c)).collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_snapshot() {
        let counters = CrossingCounters::new();
        counters.record(2, Direction::In).await;
        counters.record(2, Direction::In).await;
        counters.record(1, Direction::Out).await;
        counters.record_error(1).await;

        let snapshot = counters.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].0, 1);
        assert_eq!(
            snapshot[0].1,
            CameraCounters {
                total_in: 0,
                total_out: 1,
                errors: 1
            }
        );
        assert_eq!(snapshot[1].1.total_in, 2);
        assert_eq!(counters.get(9).await, CameraCounters::default());
    }
}
