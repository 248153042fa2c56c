//! OccupancyTracker - Live Parking State
//!
//! ## Responsibilities
//!
//! - Track which vehicles are currently in view, keyed by track id
//! - Report enter/depart transitions per frame
//! - Mirror the in-memory state to the parking_status table
//!
//! Memory is the source of truth. The table is a mirror for external
//! readers: a failed upsert or delete is logged and counted, and the
//! in-memory state still advances.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::events::PlateReading;

/// One vehicle currently in view.
#[derive(Debug, Clone, Serialize)]
pub struct OccupancyRecord {
    pub track_id: i64,
    /// Plate text, once one has been read for this vehicle.
    pub plate: Option<String>,
    pub entered_at: DateTime<Utc>,
}

/// State transition produced by one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OccupancyTransition {
    Entered { track_id: i64 },
    Departed { track_id: i64 },
}

/// Service statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct OccupancyStats {
    pub entered: u64,
    pub departed: u64,
    pub mirror_errors: u64,
}

/// OccupancyTracker instance
pub struct OccupancyTracker {
    records: RwLock<HashMap<i64, OccupancyRecord>>,
    pool: SqlitePool,
    stats: Arc<RwLock<OccupancyStats>>,
}

impl OccupancyTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            pool,
            stats: Arc::new(RwLock::new(OccupancyStats::default())),
        }
    }

    /// Create the parking_status table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS parking_status (
                track_id INTEGER PRIMARY KEY,
                plate TEXT,
                entered_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Empty both memory and the mirror table.
    ///
    /// Called at startup: track ids are recycled between runs, so rows left
    /// by a previous run describe vehicles that are no longer there.
    pub async fn clear(&self) -> Result<()> {
        self.records.write().await.clear();
        sqlx::query("DELETE FROM parking_status")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Apply one frame's observations.
    ///
    /// `tracked_ids` is the complete set of confirmed vehicles in the frame:
    /// any id not in it is gone as of this frame. A vehicle that entered
    /// with an unread plate picks the text up later from the first reading
    /// that carries one.
    pub async fn apply_frame(
        &self,
        tracked_ids: &HashSet<i64>,
        readings: &[PlateReading],
    ) -> Vec<OccupancyTransition> {
        let by_id: HashMap<i64, &PlateReading> =
            readings.iter().map(|r| (r.track_id, r)).collect();

        let mut transitions = Vec::new();
        let mut records = self.records.write().await;

        let mut arrivals: Vec<i64> = tracked_ids
            .iter()
            .copied()
            .filter(|id| !records.contains_key(id))
            .collect();
        arrivals.sort_unstable();

        for track_id in arrivals {
            let reading = by_id.get(&track_id);
            let record = OccupancyRecord {
                track_id,
                plate: reading.and_then(|r| r.plate_text.clone()),
                entered_at: reading.map(|r| r.captured_at).unwrap_or_else(Utc::now),
            };

            tracing::info!(
                track_id = track_id,
                plate = ?record.plate,
                "Vehicle entered"
            );
            self.mirror_upsert(&record).await;
            records.insert(track_id, record);

            transitions.push(OccupancyTransition::Entered { track_id });
            self.stats.write().await.entered += 1;
        }

        // Late plate fill-in for vehicles that entered before their plate
        // could be read.
        for (&track_id, reading) in &by_id {
            if let Some(record) = records.get_mut(&track_id) {
                if record.plate.is_none() && reading.plate_text.is_some() {
                    record.plate = reading.plate_text.clone();
                    let snapshot = record.clone();
                    tracing::info!(
                        track_id = track_id,
                        plate = ?snapshot.plate,
                        "Plate attached to parked vehicle"
                    );
                    self.mirror_upsert(&snapshot).await;
                }
            }
        }

        let mut departures: Vec<i64> = records
            .keys()
            .copied()
            .filter(|id| !tracked_ids.contains(id))
            .collect();
        departures.sort_unstable();

        for track_id in departures {
            records.remove(&track_id);
            tracing::info!(track_id = track_id, "Vehicle departed");
            self.mirror_delete(track_id).await;

            transitions.push(OccupancyTransition::Departed { track_id });
            self.stats.write().await.departed += 1;
        }

        transitions
    }

    async fn mirror_upsert(&self, record: &OccupancyRecord) {
        let result = sqlx::query(
            r#"
            INSERT OR REPLACE INTO parking_status (track_id, plate, entered_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(record.track_id)
        .bind(&record.plate)
        .bind(record.entered_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(
                track_id = record.track_id,
                error = %e,
                "Parking status upsert failed"
            );
            self.stats.write().await.mirror_errors += 1;
        }
    }

    async fn mirror_delete(&self, track_id: i64) {
        let result = sqlx::query("DELETE FROM parking_status WHERE track_id = ?")
            .bind(track_id)
            .execute(&self.pool)
            .await;

        if let Err(e) = result {
            tracing::warn!(
                track_id = track_id,
                error = %e,
                "Parking status delete failed"
            );
            self.stats.write().await.mirror_errors += 1;
        }
    }

    /// Vehicles currently in view, most recent arrival first.
    pub async fn current(&self) -> Vec<OccupancyRecord> {
        let records = self.records.read().await;
        let mut list: Vec<OccupancyRecord> = records.values().cloned().collect();
        list.sort_by(|a, b| b.entered_at.cmp(&a.entered_at).then(a.track_id.cmp(&b.track_id)));
        list
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn contains(&self, track_id: i64) -> bool {
        self.records.read().await.contains_key(&track_id)
    }

    /// Get service stats
    pub async fn get_stats(&self) -> OccupancyStats {
        self.stats.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::Row;

    async fn test_tracker() -> OccupancyTracker {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let tracker = OccupancyTracker::new(pool);
        tracker.ensure_schema().await.unwrap();
        tracker
    }

    fn ids(list: &[i64]) -> HashSet<i64> {
        list.iter().copied().collect()
    }

    fn reading(track_id: i64, plate: Option<&str>, captured_at: DateTime<Utc>) -> PlateReading {
        PlateReading {
            track_id,
            plate_text: plate.map(String::from),
            captured_at,
            car_path: None,
            plate_path: None,
            face_path: None,
        }
    }

    #[tokio::test]
    async fn test_vehicle_enters_and_departs() {
        let tracker = test_tracker().await;

        let transitions = tracker.apply_frame(&ids(&[7]), &[]).await;
        assert_eq!(transitions, vec![OccupancyTransition::Entered { track_id: 7 }]);
        assert!(tracker.contains(7).await);

        let transitions = tracker.apply_frame(&ids(&[]), &[]).await;
        assert_eq!(transitions, vec![OccupancyTransition::Departed { track_id: 7 }]);
        assert_eq!(tracker.count().await, 0);
    }

    #[tokio::test]
    async fn test_reapplying_same_frame_is_idempotent() {
        let tracker = test_tracker().await;

        tracker.apply_frame(&ids(&[7, 9]), &[]).await;
        let transitions = tracker.apply_frame(&ids(&[7, 9]), &[]).await;
        assert!(transitions.is_empty());
        assert_eq!(tracker.count().await, 2);
    }

    #[tokio::test]
    async fn test_one_missing_frame_evicts() {
        let tracker = test_tracker().await;

        tracker.apply_frame(&ids(&[7, 9]), &[]).await;
        let transitions = tracker.apply_frame(&ids(&[9]), &[]).await;
        assert_eq!(transitions, vec![OccupancyTransition::Departed { track_id: 7 }]);
        assert!(!tracker.contains(7).await);
        assert!(tracker.contains(9).await);
    }

    #[tokio::test]
    async fn test_entered_at_comes_from_reading() {
        let tracker = test_tracker().await;
        let captured = Utc::now() - chrono::Duration::seconds(30);

        tracker
            .apply_frame(&ids(&[4]), &[reading(4, Some("AB123"), captured)])
            .await;

        let current = tracker.current().await;
        assert_eq!(current[0].entered_at, captured);
        assert_eq!(current[0].plate.as_deref(), Some("AB123"));
    }

    #[tokio::test]
    async fn test_entered_at_falls_back_to_wall_clock() {
        let tracker = test_tracker().await;

        let before = Utc::now();
        tracker.apply_frame(&ids(&[4]), &[]).await;
        let after = Utc::now();

        let current = tracker.current().await;
        assert!(current[0].entered_at >= before && current[0].entered_at <= after);
        assert!(current[0].plate.is_none());
    }

    #[tokio::test]
    async fn test_plate_fills_in_after_entry() {
        let tracker = test_tracker().await;
        let captured = Utc::now();

        tracker.apply_frame(&ids(&[4]), &[]).await;
        tracker
            .apply_frame(&ids(&[4]), &[reading(4, Some("XY777"), captured)])
            .await;

        let current = tracker.current().await;
        assert_eq!(current[0].plate.as_deref(), Some("XY777"));

        // A later frame with no reading does not erase the filled-in plate.
        tracker.apply_frame(&ids(&[4]), &[]).await;
        let current = tracker.current().await;
        assert_eq!(current[0].plate.as_deref(), Some("XY777"));
    }

    #[tokio::test]
    async fn test_mirror_rows_track_memory() {
        let tracker = test_tracker().await;

        tracker
            .apply_frame(&ids(&[1, 2]), &[reading(1, Some("AA111"), Utc::now())])
            .await;
        tracker.apply_frame(&ids(&[2]), &[]).await;

        let rows = sqlx::query("SELECT track_id, plate FROM parking_status")
            .fetch_all(&tracker.pool)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let track_id: i64 = rows[0].get("track_id");
        assert_eq!(track_id, 2);
    }

    #[tokio::test]
    async fn test_memory_advances_when_mirror_fails() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        // No ensure_schema: every mirror write hits a missing table.
        let tracker = OccupancyTracker::new(pool);

        let transitions = tracker.apply_frame(&ids(&[5]), &[]).await;
        assert_eq!(transitions, vec![OccupancyTransition::Entered { track_id: 5 }]);
        assert!(tracker.contains(5).await);

        let stats = tracker.get_stats().await;
        assert!(stats.mirror_errors >= 1);
    }

    #[tokio::test]
    async fn test_clear_empties_memory_and_mirror() {
        let tracker = test_tracker().await;

        tracker.apply_frame(&ids(&[1, 2, 3]), &[]).await;
        tracker.clear().await.unwrap();

        assert_eq!(tracker.count().await, 0);
        let rows = sqlx::query("SELECT track_id FROM parking_status")
            .fetch_all(&tracker.pool)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
