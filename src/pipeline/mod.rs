//! FramePipeline - Frame Processing Producer
//!
//! ## Responsibilities
//!
//! - Drive the frame loop: track vehicles, detect plates, pair them,
//!   crop and OCR, persist crops and log rows
//! - Emit exactly one FrameEvent per processed frame
//! - Cooperative stop and pause control
//!
//! Bad detections, unreadable plates and storage failures never stop the
//! loop; they are logged, counted in the stats, and the frame still emits.
//! Only the frame source ending (or failing to read) ends a run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::crop_store::{CropKind, CropStorage};
use crate::events::{FrameEvent, FrameEventSender, OverlayBox, OverlayKind, PlateReading};
use crate::frame_feed::{Frame, FrameSource};
use crate::plate_log::{LogEntry, PlateLogService};
use crate::plate_matcher::{match_plates_to_tracks, PlateMatch};
use crate::vision::{PlateDetector, PlateReader, VehicleTracker};

/// Poll interval while paused.
const PAUSE_POLL_MS: u64 = 100;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum confidence for a plate detection to be considered.
    pub plate_confidence_threshold: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            plate_confidence_threshold: 0.25,
        }
    }
}

/// Pipeline statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub readings_emitted: u64,
    pub plates_logged: u64,
    pub vision_failures: u64,
    pub ocr_failures: u64,
    pub crop_failures: u64,
}

/// FramePipeline instance
pub struct FramePipeline {
    tracker: Arc<dyn VehicleTracker>,
    detector: Arc<dyn PlateDetector>,
    reader: Arc<dyn PlateReader>,
    crops: Arc<dyn CropStorage>,
    plate_log: Arc<PlateLogService>,
    events: FrameEventSender,
    config: PipelineConfig,
    running: Arc<RwLock<bool>>,
    paused: Arc<RwLock<bool>>,
    stats: Arc<RwLock<PipelineStats>>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl FramePipeline {
    /// Create new FramePipeline
    pub fn new(
        tracker: Arc<dyn VehicleTracker>,
        detector: Arc<dyn PlateDetector>,
        reader: Arc<dyn PlateReader>,
        crops: Arc<dyn CropStorage>,
        plate_log: Arc<PlateLogService>,
        events: FrameEventSender,
        config: PipelineConfig,
    ) -> Self {
        Self {
            tracker,
            detector,
            reader,
            crops,
            plate_log,
            events,
            config,
            running: Arc::new(RwLock::new(false)),
            paused: Arc::new(RwLock::new(false)),
            stats: Arc::new(RwLock::new(PipelineStats::default())),
            task: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the frame loop on the given source.
    ///
    /// A no-op while a run is active. Restarting after stop waits for the
    /// previous loop to unwind first, so there is never more than one
    /// producer feeding the event queue.
    pub async fn start(&self, source: Box<dyn FrameSource>) {
        let mut task = self.task.lock().await;

        if *self.running.read().await {
            tracing::warn!("Frame pipeline already running");
            return;
        }

        if let Some(handle) = task.take() {
            let _ = handle.await;
        }

        *self.running.write().await = true;
        *self.paused.write().await = false;

        tracing::info!("Starting frame pipeline");

        let tracker = self.tracker.clone();
        let detector = self.detector.clone();
        let reader = self.reader.clone();
        let crops = self.crops.clone();
        let plate_log = self.plate_log.clone();
        let events = self.events.clone();
        let config = self.config.clone();
        let running = self.running.clone();
        let paused = self.paused.clone();
        let stats = self.stats.clone();

        *task = Some(tokio::spawn(async move {
            let mut source = source;

            loop {
                // Check if still running
                {
                    let is_running = running.read().await;
                    if !*is_running {
                        break;
                    }
                }

                // Paused: keep the source open, process nothing
                if *paused.read().await {
                    tokio::time::sleep(Duration::from_millis(PAUSE_POLL_MS)).await;
                    continue;
                }

                match source.next_frame().await {
                    Ok(Some(frame)) => {
                        let event = Self::process_frame(
                            &frame, &*tracker, &*detector, &*reader, &*crops, &plate_log,
                            &config, &stats,
                        )
                        .await;

                        {
                            let mut stats = stats.write().await;
                            stats.frames_processed += 1;
                            stats.readings_emitted += event.readings.len() as u64;
                        }

                        if !events.push(event) {
                            tracing::warn!("Frame event receiver dropped, stopping pipeline");
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Frame source exhausted");
                        break;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Frame source read failed");
                        break;
                    }
                }
            }

            *running.write().await = false;
            tracing::info!("Frame pipeline stopped");
        }));
    }

    /// Request the loop to stop at its next iteration.
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        tracing::info!("Stopping frame pipeline");
    }

    /// Suspend frame processing without releasing the source.
    pub async fn pause(&self) {
        let mut paused = self.paused.write().await;
        *paused = true;
        tracing::info!("Frame pipeline paused");
    }

    pub async fn resume(&self) {
        let mut paused = self.paused.write().await;
        *paused = false;
        tracing::info!("Frame pipeline resumed");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub async fn is_paused(&self) -> bool {
        *self.paused.read().await
    }

    /// Get pipeline stats
    pub async fn get_stats(&self) -> PipelineStats {
        self.stats.read().await.clone()
    }

    /// Process a single frame into its event.
    async fn process_frame(
        frame: &Frame,
        tracker: &dyn VehicleTracker,
        detector: &dyn PlateDetector,
        reader: &dyn PlateReader,
        crops: &dyn CropStorage,
        plate_log: &PlateLogService,
        config: &PipelineConfig,
        stats: &RwLock<PipelineStats>,
    ) -> FrameEvent {
        let tracks = match tracker.track(frame).await {
            Ok(tracks) => tracks,
            Err(e) => {
                tracing::warn!(frame_seq = frame.seq, error = %e, "Vehicle tracking failed");
                stats.write().await.vision_failures += 1;
                Vec::new()
            }
        };
        let confirmed: Vec<_> = tracks.into_iter().filter(|t| t.confirmed).collect();

        let detections = match detector.detect(frame).await {
            Ok(detections) => detections,
            Err(e) => {
                tracing::warn!(frame_seq = frame.seq, error = %e, "Plate detection failed");
                stats.write().await.vision_failures += 1;
                Vec::new()
            }
        };
        let plates: Vec<_> = detections
            .into_iter()
            .filter(|d| d.confidence >= config.plate_confidence_threshold)
            .collect();

        let outcome = match_plates_to_tracks(&confirmed, &plates);

        let mut readings = Vec::new();
        let mut overlay = Vec::new();
        for m in &outcome.matches {
            match Self::process_match(frame, m, reader, crops, plate_log, stats).await {
                Some(reading) => {
                    overlay.push(OverlayBox {
                        bbox: m.vehicle_bbox,
                        label: reading
                            .plate_text
                            .clone()
                            .unwrap_or_else(|| format!("#{}", m.track_id)),
                        kind: OverlayKind::MatchedVehicle,
                    });
                    overlay.push(OverlayBox {
                        bbox: m.plate_bbox,
                        label: reading.plate_text.clone().unwrap_or_default(),
                        kind: OverlayKind::Plate,
                    });
                    readings.push(reading);
                }
                None => {
                    overlay.push(OverlayBox {
                        bbox: m.vehicle_bbox,
                        label: format!("#{}", m.track_id),
                        kind: OverlayKind::MatchedVehicle,
                    });
                }
            }
        }
        for track in &outcome.unmatched_tracks {
            overlay.push(OverlayBox {
                bbox: track.bbox,
                label: format!("#{}", track.track_id),
                kind: OverlayKind::UnmatchedVehicle,
            });
        }

        let tracked_ids: HashSet<i64> = confirmed.iter().map(|t| t.track_id).collect();

        FrameEvent {
            frame_seq: frame.seq,
            captured_at: frame.captured_at,
            readings,
            tracked_ids,
            overlay,
        }
    }

    /// Crop, OCR and log a single vehicle/plate pair.
    ///
    /// Returns nothing when the vehicle box collapses to an empty region
    /// after clipping to the frame; the pair is dropped without a reading.
    async fn process_match(
        frame: &Frame,
        m: &PlateMatch,
        reader: &dyn PlateReader,
        crops: &dyn CropStorage,
        plate_log: &PlateLogService,
        stats: &RwLock<PipelineStats>,
    ) -> Option<PlateReading> {
        let vehicle_rect = match m.vehicle_bbox.clip(frame.width(), frame.height()) {
            Some(rect) => rect,
            None => {
                tracing::debug!(
                    frame_seq = frame.seq,
                    track_id = m.track_id,
                    "Vehicle box empty after clipping, pair dropped"
                );
                return None;
            }
        };
        let plate_rect = m.plate_bbox.clip(frame.width(), frame.height());
        let captured_at = frame.captured_at;

        let mut plate_text = None;
        let mut plate_jpeg = None;
        if let Some(rect) = plate_rect {
            match frame.crop_jpeg(rect) {
                Ok(jpeg) => {
                    match reader.read(jpeg.clone()).await {
                        Ok(text) => plate_text = text,
                        Err(e) => {
                            tracing::warn!(
                                frame_seq = frame.seq,
                                track_id = m.track_id,
                                error = %e,
                                "Plate OCR failed"
                            );
                            stats.write().await.ocr_failures += 1;
                        }
                    }
                    plate_jpeg = Some(jpeg);
                }
                Err(e) => {
                    tracing::warn!(
                        frame_seq = frame.seq,
                        track_id = m.track_id,
                        error = %e,
                        "Plate crop failed"
                    );
                    stats.write().await.crop_failures += 1;
                }
            }
        }

        let mut car_path = None;
        match frame.crop_jpeg(vehicle_rect) {
            Ok(jpeg) => {
                match crops.store(CropKind::Car, m.track_id, captured_at, &jpeg).await {
                    Ok(path) => car_path = Some(path),
                    Err(e) => {
                        tracing::warn!(
                            track_id = m.track_id,
                            error = %e,
                            "Vehicle crop save failed"
                        );
                        stats.write().await.crop_failures += 1;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    frame_seq = frame.seq,
                    track_id = m.track_id,
                    error = %e,
                    "Vehicle crop failed"
                );
                stats.write().await.crop_failures += 1;
            }
        }

        let mut plate_path = None;
        if let Some(jpeg) = plate_jpeg {
            match crops.store(CropKind::Plate, m.track_id, captured_at, &jpeg).await {
                Ok(path) => plate_path = Some(path),
                Err(e) => {
                    tracing::warn!(
                        track_id = m.track_id,
                        error = %e,
                        "Plate crop save failed"
                    );
                    stats.write().await.crop_failures += 1;
                }
            }
        }

        if let Some(ref plate) = plate_text {
            let entry = LogEntry {
                id: None,
                track_id: m.track_id,
                plate: plate.clone(),
                car_path: car_path.clone(),
                plate_path: plate_path.clone(),
                face_path: None,
                logged_at: captured_at,
            };
            if plate_log.record_if_new(&entry).await {
                stats.write().await.plates_logged += 1;
                tracing::info!(
                    track_id = m.track_id,
                    plate = %plate,
                    "New plate logged"
                );
            }
        }

        Some(PlateReading {
            track_id: m.track_id,
            plate_text,
            captured_at,
            car_path,
            plate_path,
            face_path: None,
        })
    }
}
