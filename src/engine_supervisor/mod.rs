//! EngineSupervisor - per-camera engine registry
//!
//! ## Responsibilities
//!
//! - At most one RUNNING engine per camera
//! - Restart is stop-then-start, never concurrent start
//! - Bounded stop: cancel, wait, abort, wait again
//! - Cold restart: cooldown entries of the camera are dropped
//!
//! The registry lock is held for the whole stop-then-start sequence so two
//! concurrent `start` calls for one camera cannot both spawn.

use crate::camera_config::{load_portable, CameraConfig, CameraId, PortableConfig};
use crate::cooldown_gate::CooldownGate;
use crate::crossing_store::CrossingStore;
use crate::engine::{CrossingEngine, EngineRunStats, EngineSettings, EngineState};
use crate::error::{Error, Result};
use crate::event_emitter::EventEmitter;
use crate::frame_source::FrameSource;
use crate::tracker_client::Tracker;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Registered engine as reported by the status API
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub camera_id: CameraId,
    pub camera_name: String,
    pub source: String,
    pub state: EngineState,
    pub started_at: DateTime<Utc>,
    /// Exported pixel config (`config_{id}.json`); `None` before the first frame
    pub config: Option<PortableConfig>,
}

struct EngineHandle {
    config: CameraConfig,
    cancel: watch::Sender<bool>,
    join: JoinHandle<EngineRunStats>,
    state: Arc<RwLock<EngineState>>,
    started_at: DateTime<Utc>,
}

impl EngineHandle {
    async fn status(&self) -> EngineStatus {
        let state = if self.join.is_finished() {
            EngineState::Stopped
        } else {
            *self.state.read().await
        };

        EngineStatus {
            camera_id: self.config.camera_id,
            camera_name: self.config.camera_name.clone(),
            source: self.config.source.clone(),
            state,
            started_at: self.started_at,
            config: None,
        }
    }
}

/// EngineSupervisor instance
pub struct EngineSupervisor<S> {
    registry: Mutex<HashMap<CameraId, EngineHandle>>,
    cooldown: Arc<CooldownGate>,
    emitter: Arc<EventEmitter<S>>,
    settings: EngineSettings,
}

impl<S: CrossingStore> EngineSupervisor<S> {
    pub fn new(
        cooldown: Arc<CooldownGate>,
        emitter: Arc<EventEmitter<S>>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            cooldown,
            emitter,
            settings,
        }
    }

    pub fn cooldown(&self) -> &Arc<CooldownGate> {
        &self.cooldown
    }

    /// Start (or restart) the engine for `config.camera_id`
    ///
    /// An invalid config is rejected before the running engine is touched.
    /// If the previous engine cannot be stopped the new one is not started.
    pub async fn start<Src, Trk>(
        &self,
        config: CameraConfig,
        source: Src,
        tracker: Trk,
    ) -> Result<()>
    where
        Src: FrameSource,
        Trk: Tracker,
    {
        let camera_id = config.camera_id;
        if let Err(e) = config.validate() {
            tracing::error!(camera_id, error = %e, "Refusing to start engine");
            return Err(e);
        }

        let mut registry = self.registry.lock().await;

        if let Some(mut previous) = registry.remove(&camera_id) {
            tracing::info!(camera_id, "Restarting engine: stopping previous instance");
            if let Err(e) = self.shutdown(camera_id, &mut previous).await {
                registry.insert(camera_id, previous);
                return Err(e);
            }
        }

        let cleared = self.cooldown.reset_camera(camera_id).await;
        if cleared > 0 {
            tracing::debug!(camera_id, cleared, "Cooldown entries cleared");
        }

        let (cancel, cancel_rx) = watch::channel(false);
        let engine = CrossingEngine::new(
            config.clone(),
            source,
            tracker,
            self.cooldown.clone(),
            self.emitter.clone(),
            self.settings.clone(),
        );
        let state = engine.state_handle();
        *state.write().await = EngineState::Running;
        let join = tokio::spawn(engine.run(cancel_rx));

        registry.insert(
            camera_id,
            EngineHandle {
                config,
                cancel,
                join,
                state,
                started_at: Utc::now(),
            },
        );

        Ok(())
    }

    /// Stop the camera's engine; `Ok(false)` if none was registered
    pub async fn stop(&self, camera_id: CameraId) -> Result<bool> {
        let mut registry = self.registry.lock().await;

        let Some(mut handle) = registry.remove(&camera_id) else {
            return Ok(false);
        };

        if let Err(e) = self.shutdown(camera_id, &mut handle).await {
            registry.insert(camera_id, handle);
            return Err(e);
        }

        Ok(true)
    }

    /// Stop every engine, logging failures
    pub async fn stop_all(&self) {
        let camera_ids: Vec<CameraId> = self.registry.lock().await.keys().copied().collect();
        tracing::info!(count = camera_ids.len(), "Stopping all engines");

        for camera_id in camera_ids {
            if let Err(e) = self.stop(camera_id).await {
                tracing::error!(camera_id, error = %e, "Engine did not stop");
            }
        }
    }

    /// Registered engines with their exported portable config, sorted by camera id
    pub async fn active(&self) -> Vec<EngineStatus> {
        let mut statuses = Vec::new();
        {
            let registry = self.registry.lock().await;
            for handle in registry.values() {
                statuses.push(handle.status().await);
            }
        }
        statuses.sort_by_key(|s| s.camera_id);

        let logs_dir = self.emitter.logs_dir();
        for status in &mut statuses {
            match load_portable(&logs_dir, status.camera_id).await {
                Ok(config) => status.config = config,
                Err(e) => {
                    tracing::warn!(
                        camera_id = status.camera_id,
                        error = %e,
                        "Portable config unreadable"
                    );
                }
            }
        }

        statuses
    }

    pub async fn state(&self, camera_id: CameraId) -> EngineState {
        match self.registry.lock().await.get(&camera_id) {
            Some(handle) => handle.status().await.state,
            None => EngineState::Stopped,
        }
    }

    /// Number of engines currently RUNNING
    pub async fn running_count(&self) -> usize {
        let registry = self.registry.lock().await;
        let mut running = 0;
        for handle in registry.values() {
            if handle.status().await.state == EngineState::Running {
                running += 1;
            }
        }
        running
    }

    async fn shutdown(&self, camera_id: CameraId, handle: &mut EngineHandle) -> Result<()> {
        let timeout = self.settings.stop_timeout;

        if !handle.join.is_finished() {
            *handle.state.write().await = EngineState::Stopping;
        }
        if handle.cancel.send(true).is_err() {
            tracing::debug!(camera_id, "Engine task already gone");
        }

        match tokio::time::timeout(timeout, &mut handle.join).await {
            Ok(Ok(stats)) => {
                tracing::info!(
                    camera_id,
                    frames = stats.frames,
                    emitted = stats.emitted,
                    "Engine stopped"
                );
                return Ok(());
            }
            Ok(Err(e)) => {
                tracing::warn!(camera_id, error = %e, "Engine task ended abnormally");
                *handle.state.write().await = EngineState::Stopped;
                return Ok(());
            }
            Err(_) => {
                tracing::warn!(
                    camera_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Engine did not stop in time, aborting"
                );
                handle.join.abort();
            }
        }

        match tokio::time::timeout(timeout, &mut handle.join).await {
            Ok(_) => {
                *handle.state.write().await = EngineState::Stopped;
                tracing::warn!(camera_id, "Engine aborted");
                Ok(())
            }
            Err(_) => Err(Error::Conflict(format!(
                "engine for camera {} is still running after abort",
                camera_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crossing_store::CrossingEvent;
    use crate::event_emitter::CrossingCounters;
    use crate::frame_source::Frame;
    use crate::geometry::{NormalizedLine, NormalizedPoint};
    use crate::tracker_client::Detection;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct NullStore;

    impl CrossingStore for NullStore {
        async fn append(&self, _event: &CrossingEvent) -> Result<u64> {
            Ok(0)
        }
    }

    /// Produces blank frames and tracks how many sources are alive
    struct CountingSource {
        alive: Arc<AtomicUsize>,
    }

    impl CountingSource {
        fn new(alive: &Arc<AtomicUsize>) -> Self {
            alive.fetch_add(1, Ordering::SeqCst);
            Self {
                alive: alive.clone(),
            }
        }
    }

    impl Drop for CountingSource {
        fn drop(&mut self) {
            self.alive.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl FrameSource for CountingSource {
        async fn next_frame(&mut self) -> Result<Frame> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(Frame::new(8, 8, vec![0u8; 8 * 8 * 3], 0))
        }
    }

    /// Source whose reads never complete
    struct StalledSource;

    impl FrameSource for StalledSource {
        async fn next_frame(&mut self) -> Result<Frame> {
            std::future::pending().await
        }
    }

    struct EmptyTracker;

    impl Tracker for EmptyTracker {
        async fn track(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            Ok(Vec::new())
        }
    }

    fn config(camera_id: CameraId) -> CameraConfig {
        CameraConfig {
            camera_id,
            camera_name: format!("camera_{}", camera_id),
            source: format!("test://{}", camera_id),
            roi_polygon: vec![
                NormalizedPoint { x: 0.0, y: 0.0 },
                NormalizedPoint { x: 1.0, y: 0.0 },
                NormalizedPoint { x: 1.0, y: 1.0 },
            ],
            crossing_line: NormalizedLine {
                x1: 0.0,
                y1: 0.5,
                x2: 1.0,
                y2: 0.5,
            },
        }
    }

    async fn supervisor(dir: &std::path::Path) -> EngineSupervisor<NullStore> {
        let emitter = EventEmitter::new(dir, Arc::new(NullStore), Arc::new(CrossingCounters::new()))
            .await
            .unwrap();
        let settings = EngineSettings {
            stop_timeout: Duration::from_millis(500),
            frame_interval: Duration::from_millis(1),
            ..EngineSettings::default()
        };
        EngineSupervisor::new(Arc::new(CooldownGate::default()), Arc::new(emitter), settings)
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(dir.path()).await;
        let alive = Arc::new(AtomicUsize::new(0));

        supervisor
            .start(config(1), CountingSource::new(&alive), EmptyTracker)
            .await
            .unwrap();
        assert_eq!(supervisor.state(1).await, EngineState::Running);

        assert!(supervisor.stop(1).await.unwrap());
        assert_eq!(supervisor.state(1).await, EngineState::Stopped);
        assert_eq!(alive.load(Ordering::SeqCst), 0);
        assert!(!supervisor.stop(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_restart_keeps_single_engine() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(dir.path()).await;
        let alive = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            supervisor
                .start(config(1), CountingSource::new(&alive), EmptyTracker)
                .await
                .unwrap();
            assert_eq!(alive.load(Ordering::SeqCst), 1);
        }

        assert_eq!(supervisor.active().await.len(), 1);
        assert_eq!(supervisor.running_count().await, 1);
        supervisor.stop_all().await;
        assert_eq!(alive.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_leaves_running_engine() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(dir.path()).await;
        let alive = Arc::new(AtomicUsize::new(0));

        supervisor
            .start(config(1), CountingSource::new(&alive), EmptyTracker)
            .await
            .unwrap();

        let mut broken = config(1);
        broken.roi_polygon.truncate(2);
        let result = supervisor
            .start(broken, CountingSource::new(&alive), EmptyTracker)
            .await;

        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(supervisor.state(1).await, EngineState::Running);
        assert_eq!(alive.load(Ordering::SeqCst), 1);
        supervisor.stop_all().await;
    }

    #[tokio::test]
    async fn test_stalled_read_is_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(dir.path()).await;

        supervisor
            .start(config(4), StalledSource, EmptyTracker)
            .await
            .unwrap();
        tokio::task::yield_now().await;

        assert!(supervisor.stop(4).await.unwrap());
        assert!(supervisor.active().await.is_empty());
    }

    #[tokio::test]
    async fn test_restart_clears_camera_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(dir.path()).await;
        let alive = Arc::new(AtomicUsize::new(0));
        let now = tokio::time::Instant::now();

        supervisor.cooldown().try_pass(2, 9, now).await;
        supervisor.cooldown().try_pass(3, 9, now).await;

        supervisor
            .start(config(2), CountingSource::new(&alive), EmptyTracker)
            .await
            .unwrap();

        assert!(supervisor.cooldown().try_pass(2, 9, now).await);
        assert!(!supervisor.cooldown().try_pass(3, 9, now).await);
        supervisor.stop_all().await;
    }

    #[tokio::test]
    async fn test_cameras_run_independently() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(dir.path()).await;
        let alive = Arc::new(AtomicUsize::new(0));

        supervisor
            .start(config(1), CountingSource::new(&alive), EmptyTracker)
            .await
            .unwrap();
        supervisor
            .start(config(2), CountingSource::new(&alive), EmptyTracker)
            .await
            .unwrap();

        supervisor.stop(1).await.unwrap();
        let active = supervisor.active().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].camera_id, 2);
        assert_eq!(active[0].state, EngineState::Running);
        supervisor.stop_all().await;
    }

    #[tokio::test]
    async fn test_active_reports_portable_config() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = supervisor(dir.path()).await;
        let alive = Arc::new(AtomicUsize::new(0));

        supervisor
            .start(config(6), CountingSource::new(&alive), EmptyTracker)
            .await
            .unwrap();

        // Exported on the first frame
        let status = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let active = supervisor.active().await;
                if active[0].config.is_some() {
                    return active[0].clone();
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let portable = status.config.unwrap();
        assert_eq!(portable.camera_id, 6);
        assert_eq!(portable.resolution.width, 8);
        assert_eq!(portable.resolution.height, 8);
        assert_eq!(portable.polygon.len(), 3);

        let json = serde_json::to_value(supervisor.active().await).unwrap();
        assert_eq!(json[0]["config"]["camera_id"], 6);
        supervisor.stop_all().await;
    }
}
