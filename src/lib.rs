//! Plategate Library
//!
//! Parking gate camera server
//!
//! ## Architecture (9 Components)
//!
//! 1. FrameFeed - Frame acquisition from the gate camera
//! 2. VisionClient - Tracking/detection/OCR sidecar adapter
//! 3. PlateMatcher - Plate-to-vehicle association per frame
//! 4. FramePipeline - Frame loop producer
//! 5. CropStore - Vehicle/plate crop persistence
//! 6. PlateLogService - Deduplicated plate log rows
//! 7. OccupancyTracker - Live parking state with SQLite mirror
//! 8. UiStateReducer - Frame event consumer, view state
//! 9. WebAPI - REST API endpoints
//!
//! ## Design Principles
//!
//! - One producer, one consumer: the pipeline emits frame events, the
//!   reducer is the only writer of view state
//! - Frames never block on UI or storage: failures degrade a frame,
//!   never the loop
//! - One box type: every detector output is normalized at the wire
//!   boundary, geometry is handled in exactly one place

pub mod crop_store;
pub mod events;
pub mod frame_feed;
pub mod geometry;
pub mod occupancy;
pub mod pipeline;
pub mod plate_log;
pub mod plate_matcher;
pub mod reducer;
pub mod vision;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
