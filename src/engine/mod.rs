//! CrossingEngine - per-camera detection loop
//!
//! ## Responsibilities
//!
//! - Read frames, delegate to the tracker, run the crossing detector
//! - Gate candidates through the shared cooldown table, emit the survivors
//! - Export the portable config once per run
//! - Back off on frame-source failures until cancelled
//!
//! ## State transitions
//!
//! STOPPED -> RUNNING (run starts) -> STOPPING (cancel observed) -> STOPPED
//! (source released). Cancellation is checked between frames only; a frame
//! that has started processing always finishes.

use crate::camera_config::{export_portable, CameraConfig, CameraId, PortableConfig};
use crate::cooldown_gate::{CooldownGate, DEFAULT_COOLDOWN};
use crate::crossing_detector::{CrossingDetector, DEFAULT_LINE_THRESHOLD};
use crate::crossing_store::CrossingStore;
use crate::event_emitter::{EmitOutcome, EventEmitter};
use crate::frame_source::{Frame, FrameSource};
use crate::tracker_client::Tracker;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;

/// Default delay before retrying a failed frame read
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);
/// Default pause after each processed frame
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(10);
/// Default bounded wait for an engine to stop
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound for a single tracker or storage call
pub const MAX_CALL_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_CALL_TIMEOUT: Duration = Duration::from_millis(100);

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    Stopped,
    Running,
    Stopping,
}

/// Tunables shared by every engine run
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub line_threshold: f64,
    pub cooldown: Duration,
    pub retry_backoff: Duration,
    pub frame_interval: Duration,
    pub stop_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            line_threshold: DEFAULT_LINE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

impl EngineSettings {
    /// Timeout for a single blocking call made while processing a frame
    ///
    /// A frame makes at most one tracker call and one storage call, so both
    /// together finish before `stop_timeout` runs out.
    pub fn call_timeout(&self) -> Duration {
        (self.stop_timeout / 3).clamp(MIN_CALL_TIMEOUT, MAX_CALL_TIMEOUT)
    }
}

/// Counters for one engine run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineRunStats {
    pub frames: u64,
    pub read_errors: u64,
    pub tracker_errors: u64,
    pub emitted: u64,
    pub suppressed: u64,
}

/// One camera's loop; owns its frame source, tracker and track state
pub struct CrossingEngine<Src, Trk, S> {
    config: CameraConfig,
    source: Option<Src>,
    tracker: Trk,
    detector: CrossingDetector,
    cooldown: Arc<CooldownGate>,
    emitter: Arc<EventEmitter<S>>,
    settings: EngineSettings,
    state: Arc<RwLock<EngineState>>,
    portable_exported: bool,
    stats: EngineRunStats,
}

impl<Src, Trk, S> CrossingEngine<Src, Trk, S>
where
    Src: FrameSource,
    Trk: Tracker,
    S: CrossingStore,
{
    pub fn new(
        config: CameraConfig,
        source: Src,
        tracker: Trk,
        cooldown: Arc<CooldownGate>,
        emitter: Arc<EventEmitter<S>>,
        settings: EngineSettings,
    ) -> Self {
        let detector = CrossingDetector::from_config(&config, settings.line_threshold);

        Self {
            config,
            source: Some(source),
            tracker,
            detector,
            cooldown,
            emitter,
            settings,
            state: Arc::new(RwLock::new(EngineState::Stopped)),
            portable_exported: false,
            stats: EngineRunStats::default(),
        }
    }

    pub fn camera_id(&self) -> CameraId {
        self.config.camera_id
    }

    /// Shared view of the lifecycle state
    pub fn state_handle(&self) -> Arc<RwLock<EngineState>> {
        self.state.clone()
    }

    pub fn stats(&self) -> EngineRunStats {
        self.stats
    }

    /// Run until `cancel` turns true (or its sender is dropped)
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> EngineRunStats {
        let camera_id = self.camera_id();
        *self.state.write().await = EngineState::Running;
        tracing::info!(
            camera_id,
            camera_name = %self.config.camera_name,
            source = %self.config.source,
            "Crossing engine started"
        );

        loop {
            if *cancel.borrow() {
                break;
            }

            let Some(source) = self.source.as_mut() else {
                break;
            };

            let read = tokio::select! {
                biased;
                _ = cancel.changed() => break,
                read = source.next_frame() => read,
            };

            match read {
                Ok(frame) => {
                    self.process_frame(&frame).await;

                    if !self.settings.frame_interval.is_zero() {
                        tokio::select! {
                            biased;
                            _ = cancel.changed() => break,
                            _ = tokio::time::sleep(self.settings.frame_interval) => {}
                        }
                    }
                }
                Err(e) => {
                    self.stats.read_errors += 1;
                    tracing::warn!(
                        camera_id,
                        error = %e,
                        retry_in_secs = self.settings.retry_backoff.as_secs_f64(),
                        "Frame read failed, retrying"
                    );

                    tokio::select! {
                        biased;
                        _ = cancel.changed() => break,
                        _ = tokio::time::sleep(self.settings.retry_backoff) => {}
                    }
                }
            }
        }

        *self.state.write().await = EngineState::Stopping;
        self.source = None;
        *self.state.write().await = EngineState::Stopped;

        tracing::info!(
            camera_id,
            frames = self.stats.frames,
            emitted = self.stats.emitted,
            suppressed = self.stats.suppressed,
            read_errors = self.stats.read_errors,
            "Crossing engine stopped"
        );

        self.stats
    }

    /// Process one frame end to end; returns the emitted events
    pub async fn process_frame(&mut self, frame: &Frame) -> Vec<EmitOutcome> {
        let camera_id = self.camera_id();
        self.stats.frames += 1;

        if !self.portable_exported {
            self.export_portable_config(frame).await;
        }

        let detections = match self.tracker.track(frame).await {
            Ok(detections) => detections,
            Err(e) => {
                self.stats.tracker_errors += 1;
                tracing::warn!(
                    camera_id,
                    sequence = frame.sequence,
                    error = %e,
                    "Tracker failed, frame skipped"
                );
                return Vec::new();
            }
        };

        let candidates = self
            .detector
            .process_frame(frame.width, frame.height, &detections);

        let mut outcomes = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !self
                .cooldown
                .try_pass(camera_id, candidate.track_id, Instant::now())
                .await
            {
                self.stats.suppressed += 1;
                continue;
            }

            outcomes.push(self.emitter.emit(camera_id, &candidate, frame).await);
            self.stats.emitted += 1;
        }

        outcomes
    }

    async fn export_portable_config(&mut self, frame: &Frame) {
        let portable = PortableConfig::resolve(&self.config, frame.width, frame.height);
        match export_portable(&self.emitter.logs_dir(), &portable).await {
            Ok(path) => {
                self.portable_exported = true;
                tracing::info!(
                    camera_id = self.config.camera_id,
                    path = %path.display(),
                    width = frame.width,
                    height = frame.height,
                    "Portable config exported"
                );
            }
            Err(e) => {
                tracing::warn!(
                    camera_id = self.config.camera_id,
                    error = %e,
                    "Portable config export failed, retrying on next frame"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crossing_detector::Direction;
    use crate::crossing_store::CrossingEvent;
    use crate::error::{Error, Result};
    use crate::event_emitter::CrossingCounters;
    use crate::geometry::{BBox, NormalizedLine, NormalizedPoint};
    use crate::tracker_client::Detection;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        events: Mutex<Vec<CrossingEvent>>,
    }

    impl CrossingStore for MemoryStore {
        async fn append(&self, event: &CrossingEvent) -> Result<u64> {
            let mut events = self.events.lock().await;
            events.push(event.clone());
            Ok(events.len() as u64)
        }
    }

    /// Yields queued results, then fails forever
    struct QueueSource {
        frames: VecDeque<Result<Frame>>,
    }

    impl FrameSource for QueueSource {
        async fn next_frame(&mut self) -> Result<Frame> {
            self.frames
                .pop_front()
                .unwrap_or_else(|| Err(Error::FrameSource("end of stream".to_string())))
        }
    }

    /// Returns one track at the given center per call
    struct QueueTracker {
        centers: VecDeque<Option<(f32, f32)>>,
    }

    impl Tracker for QueueTracker {
        async fn track(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            match self.centers.pop_front().flatten() {
                Some((x, y)) => Ok(vec![Detection {
                    track_id: 1,
                    bbox: BBox::new(x - 2.0, y - 2.0, x + 2.0, y + 2.0),
                }]),
                None => Err(Error::Tracker("no result".to_string())),
            }
        }
    }

    fn config() -> CameraConfig {
        CameraConfig {
            camera_id: 1,
            camera_name: "gate".to_string(),
            source: "test://gate".to_string(),
            roi_polygon: vec![
                NormalizedPoint { x: 0.0, y: 0.0 },
                NormalizedPoint { x: 1.0, y: 0.0 },
                NormalizedPoint { x: 1.0, y: 1.0 },
                NormalizedPoint { x: 0.0, y: 1.0 },
            ],
            crossing_line: NormalizedLine {
                x1: 0.0,
                y1: 0.5,
                x2: 1.0,
                y2: 0.5,
            },
        }
    }

    fn frame(sequence: u64) -> Frame {
        Frame::new(200, 200, vec![0u8; 200 * 200 * 3], sequence)
    }

    async fn engine(
        dir: &std::path::Path,
        frames: Vec<Result<Frame>>,
        centers: Vec<Option<(f32, f32)>>,
        settings: EngineSettings,
    ) -> CrossingEngine<QueueSource, QueueTracker, MemoryStore> {
        let emitter = EventEmitter::new(
            dir,
            Arc::new(MemoryStore::default()),
            Arc::new(CrossingCounters::new()),
        )
        .await
        .unwrap();

        CrossingEngine::new(
            config(),
            QueueSource {
                frames: frames.into(),
            },
            QueueTracker {
                centers: centers.into(),
            },
            Arc::new(CooldownGate::new(settings.cooldown)),
            Arc::new(emitter),
            settings,
        )
    }

    #[tokio::test]
    async fn test_process_frame_emits_crossing() {
        let dir = tempfile::tempdir().unwrap();
        // Line at y=100; image y grows downwards
        let mut engine = engine(
            dir.path(),
            Vec::new(),
            vec![Some((100.0, 40.0)), Some((100.0, 160.0))],
            EngineSettings::default(),
        )
        .await;

        assert!(engine.process_frame(&frame(1)).await.is_empty());
        let outcomes = engine.process_frame(&frame(2)).await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].event.track_id, 1);
        assert_eq!(outcomes[0].event.direction, Direction::In);
        assert!(dir.path().join("logs").join("config_1.json").exists());
        assert_eq!(engine.stats().emitted, 1);
    }

    #[tokio::test]
    async fn test_tracker_failure_keeps_track_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine(
            dir.path(),
            Vec::new(),
            vec![Some((100.0, 40.0)), None, Some((100.0, 160.0))],
            EngineSettings::default(),
        )
        .await;

        engine.process_frame(&frame(1)).await;
        assert!(engine.process_frame(&frame(2)).await.is_empty());
        assert_eq!(engine.process_frame(&frame(3)).await.len(), 1);
        assert_eq!(engine.stats().tracker_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_read_errors_until_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let settings = EngineSettings {
            retry_backoff: Duration::from_millis(100),
            ..EngineSettings::default()
        };
        let engine = engine(
            dir.path(),
            vec![
                Err(Error::FrameSource("connection reset".to_string())),
                Ok(frame(1)),
            ],
            vec![Some((100.0, 40.0))],
            settings,
        )
        .await;
        let state = engine.state_handle();

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(engine.run(cancel_rx));

        tokio::time::sleep(Duration::from_millis(550)).await;
        assert_eq!(*state.read().await, EngineState::Running);

        cancel_tx.send(true).unwrap();
        let stats = task.await.unwrap();

        assert_eq!(*state.read().await, EngineState::Stopped);
        assert_eq!(stats.frames, 1);
        assert!(stats.read_errors >= 1);
    }

    #[tokio::test]
    async fn test_cancel_before_start_reads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(
            dir.path(),
            vec![Ok(frame(1))],
            vec![Some((100.0, 40.0))],
            EngineSettings::default(),
        )
        .await;

        let (_cancel_tx, cancel_rx) = watch::channel(true);
        let stats = engine.run(cancel_rx).await;
        assert_eq!(stats.frames, 0);
    }

    #[test]
    fn test_call_timeout_fits_twice_in_stop_timeout() {
        let settings = EngineSettings::default();
        assert_eq!(settings.call_timeout(), MAX_CALL_TIMEOUT);
        assert!(settings.call_timeout() * 2 < settings.stop_timeout);

        let short = EngineSettings {
            stop_timeout: Duration::from_millis(1500),
            ..EngineSettings::default()
        };
        assert_eq!(short.call_timeout(), Duration::from_millis(500));
        assert!(short.call_timeout() * 2 < short.stop_timeout);

        let zero = EngineSettings {
            stop_timeout: Duration::ZERO,
            ..EngineSettings::default()
        };
        assert_eq!(zero.call_timeout(), MIN_CALL_TIMEOUT);
    }
}
