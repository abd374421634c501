//! Crossline Counter Library
//!
//! Counts people crossing a configured line inside a region of interest,
//! independently per camera.
//!
//! ## Architecture
//!
//! 1. Geometry - coordinate resolution, side of line, point in ROI
//! 2. CameraConfig - per-camera ROI/line files and portable export
//! 3. TrackState - last side per track id
//! 4. CrossingDetector - sign-reversal detection and direction
//! 5. CooldownGate - shared per-track alert suppression
//! 6. EventEmitter - snapshot, durable record, per-camera log, counters
//! 7. CrossingStore - durable record storage (MySQL)
//! 8. FrameSource / TrackerClient - external frame and tracking adapters
//! 9. Engine - per-camera frame loop
//! 10. EngineSupervisor - one running engine per camera
//! 11. WebAPI - status, stats and deploy endpoints
//!
//! ## Data flow
//!
//! frame source -> tracker -> crossing detector -> cooldown gate -> event emitter

pub mod camera_config;
pub mod cooldown_gate;
pub mod crossing_detector;
pub mod crossing_store;
pub mod engine;
pub mod engine_supervisor;
pub mod error;
pub mod event_emitter;
pub mod frame_source;
pub mod geometry;
pub mod models;
pub mod state;
pub mod track_state;
pub mod tracker_client;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
