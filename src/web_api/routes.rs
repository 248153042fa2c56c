//! API Routes

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::frame_feed::HttpFrameSource;
use crate::models::ApiResponse;
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(super::device_status))
        // Live view state
        .route("/api/occupancy", get(get_occupancy))
        .route("/api/history", get(get_history))
        .route("/api/overlay", get(get_overlay))
        // Plate logs
        .route("/api/plate-logs", get(list_plate_logs))
        .route("/api/plate-logs/stats", get(plate_log_stats))
        // Pipeline control
        .route("/api/pipeline/status", get(pipeline_status))
        .route("/api/pipeline/start", post(start_pipeline))
        .route("/api/pipeline/stop", post(stop_pipeline))
        .route("/api/pipeline/pause", post(pause_pipeline))
        .route("/api/pipeline/resume", post(resume_pipeline))
        .with_state(state)
}

// ========================================
// View Handlers
// ========================================

async fn get_occupancy(State(state): State<AppState>) -> impl IntoResponse {
    let vehicles = state.occupancy.current().await;
    Json(ApiResponse::success(json!({
        "count": vehicles.len(),
        "vehicles": vehicles,
    })))
}

async fn get_history(State(state): State<AppState>) -> impl IntoResponse {
    let rows = state.reducer_view.history().await;
    Json(ApiResponse::success(rows))
}

async fn get_overlay(State(state): State<AppState>) -> impl IntoResponse {
    let boxes = state.reducer_view.overlay().await;
    Json(ApiResponse::success(boxes))
}

// ========================================
// Plate Log Handlers
// ========================================

/// Plate log query params
#[derive(Debug, Deserialize)]
struct PlateLogQuery {
    limit: Option<u32>,
}

async fn list_plate_logs(
    State(state): State<AppState>,
    Query(query): Query<PlateLogQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(50).min(500);
    match state.plate_log.latest(limit).await {
        Ok(entries) => Json(ApiResponse::success(entries)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn plate_log_stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.plate_log.get_stats().await;
    match state.plate_log.count().await {
        Ok(total) => Json(ApiResponse::success(json!({
            "total": total,
            "inserted": stats.inserted,
            "duplicates": stats.duplicates,
            "storage_errors": stats.storage_errors,
        })))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

// ========================================
// Pipeline Handlers
// ========================================

async fn pipeline_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(json!({
        "running": state.pipeline.is_running().await,
        "paused": state.pipeline.is_paused().await,
        "queue_depth": state.events.depth(),
        "stats": state.pipeline.get_stats().await,
        "reducer": state.reducer_view.get_stats().await,
    })))
}

async fn start_pipeline(State(state): State<AppState>) -> impl IntoResponse {
    let url = match &state.config.source_url {
        Some(url) => url.clone(),
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "No SOURCE_URL configured"})),
            )
                .into_response();
        }
    };

    if state.pipeline.is_running().await {
        return (
            StatusCode::CONFLICT,
            Json(json!({"error": "Pipeline already running"})),
        )
            .into_response();
    }

    let source = HttpFrameSource::new(
        url.clone(),
        Duration::from_millis(state.config.frame_interval_ms),
    );
    state.pipeline.start(Box::new(source)).await;

    Json(ApiResponse::success(json!({"started": true, "source_url": url}))).into_response()
}

async fn stop_pipeline(State(state): State<AppState>) -> impl IntoResponse {
    state.pipeline.stop().await;
    Json(ApiResponse::success(json!({"stopped": true})))
}

async fn pause_pipeline(State(state): State<AppState>) -> impl IntoResponse {
    state.pipeline.pause().await;
    Json(ApiResponse::success(json!({"paused": true})))
}

async fn resume_pipeline(State(state): State<AppState>) -> impl IntoResponse {
    state.pipeline.resume().await;
    Json(ApiResponse::success(json!({"resumed": true})))
}
