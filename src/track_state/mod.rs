//! TrackStateStore - last known side per track
//!
//! Owned by exactly one camera's detector for one engine run. Never shared.
//! `retain_only` is the whole lifecycle: a track missing from a frame is
//! forgotten, and an id that comes back later starts over.

use std::collections::{HashMap, HashSet};

/// Track identity assigned by the external tracker
pub type TrackId = u32;

/// Per-camera track id -> last signed side value
#[derive(Debug, Default)]
pub struct TrackStateStore {
    sides: HashMap<TrackId, f64>,
}

impl TrackStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, track_id: TrackId) -> Option<f64> {
        self.sides.get(&track_id).copied()
    }

    pub fn set(&mut self, track_id: TrackId, side: f64) {
        self.sides.insert(track_id, side);
    }

    /// Drop every track not in `active_ids`; returns how many were dropped
    pub fn retain_only(&mut self, active_ids: &HashSet<TrackId>) -> usize {
        let before = self.sides.len();
        self.sides.retain(|id, _| active_ids.contains(id));
        before - self.sides.len()
    }

    pub fn len(&self) -> usize {
        self.sides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sides.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set() {
        let mut store = TrackStateStore::new();
        assert_eq!(store.get(1), None);

        store.set(1, 12.5);
        store.set(1, -3.0);
        assert_eq!(store.get(1), Some(-3.0));
    }

    #[test]
    fn test_retain_only_drops_absent_tracks() {
        let mut store = TrackStateStore::new();
        store.set(1, 20.0);
        store.set(2, -20.0);
        store.set(3, 5.0);

        let active: HashSet<TrackId> = [2, 9].into_iter().collect();
        assert_eq!(store.retain_only(&active), 2);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(1), None);
        assert_eq!(store.get(2), Some(-20.0));
    }

    #[test]
    fn test_retain_only_empty_frame_clears_all() {
        let mut store = TrackStateStore::new();
        store.set(4, 1.0);
        store.retain_only(&HashSet::new());
        assert!(store.is_empty());
    }
}
