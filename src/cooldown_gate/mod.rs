//! CooldownGate - per-track alert deduplication
//!
//! ## Responsibilities
//!
//! - Suppress repeat alerts for the same `(camera_id, track_id)` inside the window
//! - Shared by every camera worker (keys include the camera, so cameras never collide)
//! - Process-lifetime only, never persisted
//!
//! The key ignores direction: a track that reverses again inside the window
//! stays suppressed even though the direction differs.

use crate::camera_config::CameraId;
use crate::track_state::TrackId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Default cooldown window (3 seconds)
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3);

/// Shared cooldown table
pub struct CooldownGate {
    window: Duration,
    last_fire: Mutex<HashMap<(CameraId, TrackId), Instant>>,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fire: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide and record in one step
    ///
    /// Passes when there is no entry or strictly more than the window has
    /// elapsed; a pass stamps `now` as the new last fire time.
    pub async fn try_pass(&self, camera_id: CameraId, track_id: TrackId, now: Instant) -> bool {
        let mut last_fire = self.last_fire.lock().await;
        let key = (camera_id, track_id);

        let passes = match last_fire.get(&key) {
            None => true,
            Some(last) => now.saturating_duration_since(*last) > self.window,
        };

        if passes {
            last_fire.insert(key, now);
        } else {
            tracing::debug!(camera_id, track_id, "Crossing suppressed by cooldown");
        }

        passes
    }

    /// Forget a camera's entries (engine restart starts cold)
    pub async fn reset_camera(&self, camera_id: CameraId) -> usize {
        let mut last_fire = self.last_fire.lock().await;
        let before = last_fire.len();
        last_fire.retain(|(cam, _), _| *cam != camera_id);
        before - last_fire.len()
    }

    /// Drop entries whose window has already elapsed
    pub async fn prune(&self, now: Instant) -> usize {
        let mut last_fire = self.last_fire.lock().await;
        let before = last_fire.len();
        let window = self.window;
        last_fire.retain(|_, last| now.saturating_duration_since(*last) <= window);
        before - last_fire.len()
    }

    pub async fn len(&self) -> usize {
        self.last_fire.lock().await.len()
    }
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_event_passes() {
        let gate = CooldownGate::default();
        assert!(gate.try_pass(1, 10, Instant::now()).await);
    }

    #[tokio::test]
    async fn test_repeat_within_window_suppressed() {
        let gate = CooldownGate::default();
        let t0 = Instant::now();

        assert!(gate.try_pass(1, 10, t0).await);
        assert!(!gate.try_pass(1, 10, t0 + Duration::from_secs(1)).await);
        assert!(!gate.try_pass(1, 10, t0 + Duration::from_secs(3)).await);
        assert!(gate.try_pass(1, 10, t0 + Duration::from_millis(3001)).await);
    }

    #[tokio::test]
    async fn test_suppressed_attempt_does_not_extend_window() {
        let gate = CooldownGate::default();
        let t0 = Instant::now();

        assert!(gate.try_pass(1, 10, t0).await);
        assert!(!gate.try_pass(1, 10, t0 + Duration::from_secs(2)).await);
        assert!(gate.try_pass(1, 10, t0 + Duration::from_secs(4)).await);
    }

    #[tokio::test]
    async fn test_cameras_do_not_share_entries() {
        let gate = CooldownGate::default();
        let t0 = Instant::now();

        assert!(gate.try_pass(1, 10, t0).await);
        assert!(gate.try_pass(2, 10, t0).await);
        assert!(gate.try_pass(1, 11, t0).await);
    }

    #[tokio::test]
    async fn test_reset_camera() {
        let gate = CooldownGate::default();
        let t0 = Instant::now();
        gate.try_pass(1, 10, t0).await;
        gate.try_pass(2, 10, t0).await;

        assert_eq!(gate.reset_camera(1).await, 1);
        assert!(gate.try_pass(1, 10, t0).await);
        assert!(!gate.try_pass(2, 10, t0).await);
    }

    #[tokio::test]
    async fn test_prune_expired() {
        let gate = CooldownGate::default();
        let t0 = Instant::now();
        gate.try_pass(1, 1, t0).await;
        gate.try_pass(1, 2, t0 + Duration::from_secs(2)).await;

        assert_eq!(gate.prune(t0 + Duration::from_secs(4)).await, 1);
        assert_eq!(gate.len().await, 1);
    }
}
