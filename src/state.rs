//! Application state
//!
//! Holds all shared components and state

use crate::events::FrameEventSender;
use crate::occupancy::OccupancyTracker;
use crate::pipeline::FramePipeline;
use crate::plate_log::PlateLogService;
use crate::reducer::ReducerView;
use crate::vision::VisionClient;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database URL
    pub database_url: String,
    /// Vision sidecar URL
    pub vision_url: String,
    /// Camera snapshot URL; without one the pipeline waits for a manual start
    pub source_url: Option<String>,
    /// Server port
    pub port: u16,
    /// Server host
    pub host: String,
    /// Base directory for saved vehicle/plate crops
    pub crop_dir: PathBuf,
    /// Delay between camera snapshot fetches
    pub frame_interval_ms: u64,
    /// Minimum plate detection confidence
    pub plate_confidence_threshold: f32,
    /// Event queue drain interval
    pub drain_interval_ms: u64,
    /// How long departed vehicles linger in the history list
    pub history_grace_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://plates.db?mode=rwc".to_string()),
            vision_url: std::env::var("VISION_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9000".to_string()),
            source_url: std::env::var("SOURCE_URL").ok(),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            crop_dir: std::env::var("CROP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            frame_interval_ms: std::env::var("FRAME_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(200),
            plate_confidence_threshold: std::env::var("PLATE_CONFIDENCE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.25),
            drain_interval_ms: std::env::var("DRAIN_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(80),
            history_grace_ms: std::env::var("HISTORY_GRACE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database pool
    pub pool: SqlitePool,
    /// Application config
    pub config: AppConfig,
    /// VisionClient (tracking, detection, OCR sidecar)
    pub vision: Arc<VisionClient>,
    /// PlateLogService (deduplicated plate rows)
    pub plate_log: Arc<PlateLogService>,
    /// OccupancyTracker (live parking state)
    pub occupancy: Arc<OccupancyTracker>,
    /// FramePipeline (frame loop producer)
    pub pipeline: Arc<FramePipeline>,
    /// ReducerView (UI-facing view state)
    pub reducer_view: Arc<ReducerView>,
    /// Frame event queue sender, for the depth gauge
    pub events: FrameEventSender,
    /// Process start time, for uptime reporting
    pub started_at: DateTime<Utc>,
}
