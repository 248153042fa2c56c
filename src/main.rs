//! Plategate - Parking Gate Camera Server
//!
//! Main entry point for the plategate application.

use plategate::{
    crop_store::FsCropStore,
    events::frame_queue,
    frame_feed::HttpFrameSource,
    occupancy::OccupancyTracker,
    pipeline::{FramePipeline, PipelineConfig},
    plate_log::PlateLogService,
    reducer::{ReducerConfig, UiStateReducer},
    state::{AppConfig, AppState},
    vision::VisionClient,
    web_api,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plategate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Plategate v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        database_url = %config.database_url,
        vision_url = %config.vision_url,
        source_url = ?config.source_url,
        crop_dir = %config.crop_dir.display(),
        "Configuration loaded"
    );

    // Create database pool
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await?;

    tracing::info!("Database connected");

    // Initialize components
    let plate_log = Arc::new(PlateLogService::new(pool.clone()));
    plate_log.ensure_schema().await?;
    tracing::info!("PlateLogService initialized");

    let occupancy = Arc::new(OccupancyTracker::new(pool.clone()));
    occupancy.ensure_schema().await?;
    occupancy.clear().await?;
    tracing::info!("OccupancyTracker initialized, parking state reset");

    let vision = Arc::new(VisionClient::new(config.vision_url.clone()));
    tracing::info!(vision_url = %config.vision_url, "VisionClient initialized");

    let crops = Arc::new(FsCropStore::new(config.crop_dir.clone()));

    // Frame event queue: pipeline produces, reducer consumes
    let (events_tx, events_rx) = frame_queue();

    let pipeline = Arc::new(FramePipeline::new(
        vision.clone(),
        vision.clone(),
        vision.clone(),
        crops,
        plate_log.clone(),
        events_tx.clone(),
        PipelineConfig {
            plate_confidence_threshold: config.plate_confidence_threshold,
        },
    ));
    tracing::info!("FramePipeline initialized");

    let reducer = UiStateReducer::new(
        events_rx,
        occupancy.clone(),
        ReducerConfig {
            drain_interval: Duration::from_millis(config.drain_interval_ms),
            history_grace: Duration::from_millis(config.history_grace_ms),
            ..Default::default()
        },
    );
    let reducer_view = reducer.view();
    let _reducer_task = reducer.spawn();

    // Create application state
    let state = AppState {
        pool,
        config,
        vision,
        plate_log,
        occupancy,
        pipeline: pipeline.clone(),
        reducer_view,
        events: events_tx,
        started_at: chrono::Utc::now(),
    };

    // Start the frame loop when a camera is configured
    if let Some(ref url) = state.config.source_url {
        let source = HttpFrameSource::new(
            url.clone(),
            Duration::from_millis(state.config.frame_interval_ms),
        );
        pipeline.start(Box::new(source)).await;
        tracing::info!(source_url = %url, "Frame pipeline started");
    } else {
        tracing::info!("SOURCE_URL not set, pipeline idle until started via API");
    }

    // Create router
    let app = web_api::create_router(state.clone())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
