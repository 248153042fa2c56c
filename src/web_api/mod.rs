//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes
//! - Request validation
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let vision_ok = state.vision.health_check().await.unwrap_or(false);
    let db_ok = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
    let uptime_sec = (chrono::Utc::now() - state.started_at).num_seconds().max(0) as u64;

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec,
        vision_connected: vision_ok,
        db_connected: db_ok,
        pipeline_running: state.pipeline.is_running().await,
    };

    Json(response)
}

/// Status endpoint
pub async fn device_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "device_type": "plategate",
        "firmware_version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "pipeline": {
            "running": state.pipeline.is_running().await,
            "paused": state.pipeline.is_paused().await,
            "stats": state.pipeline.get_stats().await,
        },
        "queue_depth": state.events.depth(),
        "plate_log": state.plate_log.get_stats().await,
        "occupancy": state.occupancy.get_stats().await,
        "occupancy_count": state.occupancy.count().await,
    }))
}
