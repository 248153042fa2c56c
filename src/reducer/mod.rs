//! UiStateReducer - Frame Event Consumer
//!
//! ## Responsibilities
//!
//! - Drain the frame event queue on a timer and fold events into the
//!   UI-facing view state (history list, overlay boxes, stats)
//! - Forward per-frame observations into the occupancy tracker
//! - Prune departed history rows after a grace window
//!
//! All mutation of view state happens here, on the consumer side. The
//! history list deliberately lags reality: a departed vehicle stays visible
//! for the grace window, while occupancy drops it on the first frame it is
//! missing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::interval;

use crate::events::{FrameEvent, FrameEventReceiver, OverlayBox};
use crate::occupancy::OccupancyTracker;

/// Reducer configuration
#[derive(Debug, Clone)]
pub struct ReducerConfig {
    /// How often the event queue is drained.
    pub drain_interval: Duration,
    /// How long a departed vehicle stays in the history list.
    pub history_grace: Duration,
    /// How often departed rows are checked against the grace window.
    pub prune_interval: Duration,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            drain_interval: Duration::from_millis(80),
            history_grace: Duration::from_millis(3000),
            prune_interval: Duration::from_millis(500),
        }
    }
}

/// One row of the history list.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub track_id: i64,
    pub plate: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// True until the event after the one that introduced this row.
    pub newly_seen: bool,
    /// Set while the vehicle is out of view and awaiting pruning.
    pub departed_at: Option<DateTime<Utc>>,
}

/// Reducer statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReducerStats {
    pub events_applied: u64,
    pub last_frame_seq: Option<u64>,
    pub last_event_at: Option<DateTime<Utc>>,
}

/// Read side of the reducer: what the HTTP handlers snapshot from.
pub struct ReducerView {
    history: RwLock<HashMap<i64, HistoryEntry>>,
    overlay: RwLock<Vec<OverlayBox>>,
    stats: RwLock<ReducerStats>,
}

impl ReducerView {
    fn new() -> Self {
        Self {
            history: RwLock::new(HashMap::new()),
            overlay: RwLock::new(Vec::new()),
            stats: RwLock::new(ReducerStats::default()),
        }
    }

    /// History rows, most recently seen first.
    pub async fn history(&self) -> Vec<HistoryEntry> {
        let history = self.history.read().await;
        let mut rows: Vec<HistoryEntry> = history.values().cloned().collect();
        rows.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then(a.track_id.cmp(&b.track_id)));
        rows
    }

    /// Overlay boxes from the latest applied frame.
    pub async fn overlay(&self) -> Vec<OverlayBox> {
        self.overlay.read().await.clone()
    }

    /// Get reducer stats
    pub async fn get_stats(&self) -> ReducerStats {
        self.stats.read().await.clone()
    }
}

/// UiStateReducer instance
pub struct UiStateReducer {
    rx: FrameEventReceiver,
    occupancy: Arc<OccupancyTracker>,
    view: Arc<ReducerView>,
    config: ReducerConfig,
    grace: chrono::Duration,
}

impl UiStateReducer {
    /// Create new UiStateReducer
    pub fn new(
        rx: FrameEventReceiver,
        occupancy: Arc<OccupancyTracker>,
        config: ReducerConfig,
    ) -> Self {
        let grace = chrono::Duration::from_std(config.history_grace)
            .unwrap_or_else(|_| chrono::Duration::seconds(3));

        Self {
            rx,
            occupancy,
            view: Arc::new(ReducerView::new()),
            config,
            grace,
        }
    }

    /// Handle to the view state, for the HTTP handlers.
    pub fn view(&self) -> Arc<ReducerView> {
        self.view.clone()
    }

    /// Run the drain and prune timers until the process exits.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tracing::info!(
            drain_ms = self.config.drain_interval.as_millis() as u64,
            grace_ms = self.config.history_grace.as_millis() as u64,
            "Starting UI state reducer"
        );

        tokio::spawn(async move {
            let mut drain_tick = interval(self.config.drain_interval);
            let mut prune_tick = interval(self.config.prune_interval);

            loop {
                tokio::select! {
                    _ = drain_tick.tick() => {
                        self.drain_pending().await;
                    }
                    _ = prune_tick.tick() => {
                        self.prune_history(Utc::now()).await;
                    }
                }
            }
        })
    }

    /// Apply every queued event, oldest first.
    async fn drain_pending(&mut self) {
        for event in self.rx.drain() {
            self.apply_event(event).await;
        }
    }

    async fn apply_event(&self, event: FrameEvent) {
        {
            let mut history = self.view.history.write().await;

            for &track_id in &event.tracked_ids {
                match history.entry(track_id) {
                    std::collections::hash_map::Entry::Occupied(mut occupied) => {
                        let row = occupied.get_mut();
                        row.last_seen = event.captured_at;
                        row.newly_seen = false;
                        row.departed_at = None;
                    }
                    std::collections::hash_map::Entry::Vacant(vacant) => {
                        vacant.insert(HistoryEntry {
                            track_id,
                            plate: None,
                            first_seen: event.captured_at,
                            last_seen: event.captured_at,
                            newly_seen: true,
                            departed_at: None,
                        });
                    }
                }
            }

            for reading in &event.readings {
                if reading.plate_text.is_some() {
                    if let Some(row) = history.get_mut(&reading.track_id) {
                        row.plate = reading.plate_text.clone();
                    }
                }
            }

            for (track_id, row) in history.iter_mut() {
                if !event.tracked_ids.contains(track_id) && row.departed_at.is_none() {
                    row.departed_at = Some(event.captured_at);
                }
            }
        }

        self.occupancy
            .apply_frame(&event.tracked_ids, &event.readings)
            .await;

        *self.view.overlay.write().await = event.overlay;

        let mut stats = self.view.stats.write().await;
        stats.events_applied += 1;
        stats.last_frame_seq = Some(event.frame_seq);
        stats.last_event_at = Some(Utc::now());
    }

    /// Drop departed rows whose grace window has elapsed.
    async fn prune_history(&self, now: DateTime<Utc>) {
        let mut history = self.view.history.write().await;
        history.retain(|_, row| match row.departed_at {
            None => true,
            Some(at) => now - at < self.grace,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{frame_queue, FrameEventSender, PlateReading};
    use sqlx::sqlite::SqlitePoolOptions;
    use std::collections::HashSet;

    async fn test_reducer() -> (FrameEventSender, UiStateReducer) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let occupancy = OccupancyTracker::new(pool);
        occupancy.ensure_schema().await.unwrap();

        let (tx, rx) = frame_queue();
        let reducer = UiStateReducer::new(rx, Arc::new(occupancy), ReducerConfig::default());
        (tx, reducer)
    }

    fn event(seq: u64, ids: &[i64], readings: Vec<PlateReading>) -> FrameEvent {
        FrameEvent {
            frame_seq: seq,
            captured_at: Utc::now(),
            readings,
            tracked_ids: ids.iter().copied().collect::<HashSet<i64>>(),
            overlay: Vec::new(),
        }
    }

    fn reading(track_id: i64, plate: Option<&str>) -> PlateReading {
        PlateReading {
            track_id,
            plate_text: plate.map(String::from),
            captured_at: Utc::now(),
            car_path: None,
            plate_path: None,
            face_path: None,
        }
    }

    #[tokio::test]
    async fn test_tracked_vehicle_enters_history() {
        let (_tx, reducer) = test_reducer().await;

        reducer.apply_event(event(1, &[7], vec![])).await;
        let rows = reducer.view.history().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].track_id, 7);
        assert!(rows[0].newly_seen);
        assert!(rows[0].plate.is_none());
        let first_seen = rows[0].first_seen;

        reducer.apply_event(event(2, &[7], vec![])).await;
        let rows = reducer.view.history().await;
        assert!(!rows[0].newly_seen);
        assert_eq!(rows[0].first_seen, first_seen);
        assert!(rows[0].last_seen >= first_seen);
    }

    #[tokio::test]
    async fn test_reading_attaches_plate_to_history() {
        let (_tx, reducer) = test_reducer().await;

        reducer.apply_event(event(1, &[7], vec![])).await;
        reducer
            .apply_event(event(2, &[7], vec![reading(7, Some("AB123"))]))
            .await;

        let rows = reducer.view.history().await;
        assert_eq!(rows[0].plate.as_deref(), Some("AB123"));

        // A later frame with no reading keeps the plate.
        reducer.apply_event(event(3, &[7], vec![])).await;
        let rows = reducer.view.history().await;
        assert_eq!(rows[0].plate.as_deref(), Some("AB123"));
    }

    #[tokio::test]
    async fn test_reapplying_same_event_leaves_occupancy_unchanged() {
        let (_tx, reducer) = test_reducer().await;

        let e = event(1, &[7, 9], vec![reading(7, Some("AB123"))]);
        reducer.apply_event(e.clone()).await;
        reducer.apply_event(e).await;

        assert_eq!(reducer.occupancy.count().await, 2);
        let current = reducer.occupancy.current().await;
        let entry7 = current.iter().find(|r| r.track_id == 7).unwrap();
        assert_eq!(entry7.plate.as_deref(), Some("AB123"));
        assert_eq!(reducer.occupancy.get_stats().await.entered, 2);

        let rows = reducer.view.history().await;
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_departure_evicts_occupancy_but_keeps_history() {
        let (_tx, reducer) = test_reducer().await;

        reducer
            .apply_event(event(1, &[7], vec![reading(7, Some("AB123"))]))
            .await;
        assert_eq!(reducer.occupancy.count().await, 1);

        reducer.apply_event(event(2, &[], vec![])).await;

        // Occupancy drops on the first missing frame.
        assert_eq!(reducer.occupancy.count().await, 0);
        // History holds the row, stamped with when it left.
        let rows = reducer.view.history().await;
        assert_eq!(rows.len(), 1);
        assert!(rows[0].departed_at.is_some());
    }

    #[tokio::test]
    async fn test_prune_removes_rows_after_grace() {
        let (_tx, reducer) = test_reducer().await;

        reducer.apply_event(event(1, &[7], vec![])).await;
        reducer.apply_event(event(2, &[], vec![])).await;

        // Inside the grace window the row survives.
        reducer.prune_history(Utc::now()).await;
        assert_eq!(reducer.view.history().await.len(), 1);

        // Past the window it goes.
        reducer
            .prune_history(Utc::now() + chrono::Duration::seconds(4))
            .await;
        assert!(reducer.view.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_prune_never_touches_present_vehicles() {
        let (_tx, reducer) = test_reducer().await;

        reducer.apply_event(event(1, &[7], vec![])).await;
        reducer
            .prune_history(Utc::now() + chrono::Duration::seconds(60))
            .await;
        assert_eq!(reducer.view.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reappearance_clears_departure() {
        let (_tx, reducer) = test_reducer().await;

        reducer.apply_event(event(1, &[7], vec![])).await;
        reducer.apply_event(event(2, &[], vec![])).await;
        reducer.apply_event(event(3, &[7], vec![])).await;

        let rows = reducer.view.history().await;
        assert_eq!(rows.len(), 1);
        assert!(rows[0].departed_at.is_none());
        assert!(!rows[0].newly_seen);

        // Even a long time later the row is immune to pruning again.
        reducer
            .prune_history(Utc::now() + chrono::Duration::seconds(60))
            .await;
        assert_eq!(reducer.view.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_overlay_is_replaced_each_event() {
        let (_tx, reducer) = test_reducer().await;

        let mut first = event(1, &[7], vec![]);
        first.overlay.push(OverlayBox {
            bbox: crate::geometry::BBox::from_corners(0.0, 0.0, 10.0, 10.0).unwrap(),
            label: "#7".to_string(),
            kind: crate::events::OverlayKind::UnmatchedVehicle,
        });
        reducer.apply_event(first).await;
        assert_eq!(reducer.view.overlay().await.len(), 1);

        reducer.apply_event(event(2, &[], vec![])).await;
        assert!(reducer.view.overlay().await.is_empty());
    }

    #[tokio::test]
    async fn test_drain_applies_queued_events_in_order() {
        let (tx, mut reducer) = test_reducer().await;

        assert!(tx.push(event(1, &[7], vec![])));
        assert!(tx.push(event(2, &[7, 9], vec![])));
        assert!(tx.push(event(3, &[9], vec![])));

        reducer.drain_pending().await;

        let stats = reducer.view.get_stats().await;
        assert_eq!(stats.events_applied, 3);
        assert_eq!(stats.last_frame_seq, Some(3));

        // End state reflects the last event: 7 gone, 9 present.
        assert!(!reducer.occupancy.contains(7).await);
        assert!(reducer.occupancy.contains(9).await);
        assert_eq!(tx.depth(), 0);
    }
}
