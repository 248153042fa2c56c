//! PlateLogService - Deduplicated Plate Log Persistence
//!
//! ## Responsibilities
//!
//! - Persist at most one row per plate text, across the whole lifetime of
//!   the database (record_if_new)
//! - Provide the query interface behind the plate log API
//! - Count inserts, duplicates and storage errors
//!
//! Dedup is keyed on the plate text alone. Track ids are recycled by the
//! tracker between runs, so they carry no identity across time; the text is
//! the only stable key.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use tokio::sync::RwLock;

use crate::error::Result;

/// Plate log record (matches plate_logs table)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LogEntry {
    pub id: Option<i64>,
    /// Track id at the moment the plate was first read.
    pub track_id: i64,
    pub plate: String,
    pub car_path: Option<String>,
    pub plate_path: Option<String>,
    pub face_path: Option<String>,
    pub logged_at: DateTime<Utc>,
}

/// Service statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlateLogStats {
    pub inserted: u64,
    pub duplicates: u64,
    pub storage_errors: u64,
}

/// PlateLogService instance
pub struct PlateLogService {
    pool: SqlitePool,
    stats: Arc<RwLock<PlateLogStats>>,
}

impl PlateLogService {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            stats: Arc::new(RwLock::new(PlateLogStats::default())),
        }
    }

    /// Create the plate_logs table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS plate_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                track_id INTEGER NOT NULL,
                plate TEXT NOT NULL,
                car_path TEXT,
                plate_path TEXT,
                face_path TEXT,
                logged_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert the entry unless its plate text was ever logged before.
    ///
    /// Returns `true` only when a new row was written. A storage failure is
    /// logged, counted, and reported as `false`; it never propagates into
    /// the frame loop. There is no retry here: if the same plate is read
    /// again on a later frame, that read attempts the insert afresh.
    pub async fn record_if_new(&self, entry: &LogEntry) -> bool {
        match self.try_record(entry).await {
            Ok(true) => {
                let mut stats = self.stats.write().await;
                stats.inserted += 1;
                true
            }
            Ok(false) => {
                let mut stats = self.stats.write().await;
                stats.duplicates += 1;
                false
            }
            Err(e) => {
                tracing::warn!(
                    plate = %entry.plate,
                    track_id = entry.track_id,
                    error = %e,
                    "Plate log insert failed"
                );
                let mut stats = self.stats.write().await;
                stats.storage_errors += 1;
                false
            }
        }
    }

    async fn try_record(&self, entry: &LogEntry) -> Result<bool> {
        let existing = sqlx::query("SELECT id FROM plate_logs WHERE plate = ? LIMIT 1")
            .bind(&entry.plate)
            .fetch_optional(&self.pool)
            .await?;

        if existing.is_some() {
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO plate_logs (track_id, plate, car_path, plate_path, face_path, logged_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.track_id)
        .bind(&entry.plate)
        .bind(&entry.car_path)
        .bind(&entry.plate_path)
        .bind(&entry.face_path)
        .bind(entry.logged_at)
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    /// Latest log entries, newest first.
    pub async fn latest(&self, limit: u32) -> Result<Vec<LogEntry>> {
        let entries = sqlx::query_as::<_, LogEntry>(
            r#"
            SELECT id, track_id, plate, car_path, plate_path, face_path, logged_at
            FROM plate_logs
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Total number of logged plates.
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM plate_logs")
            .fetch_one(&self.pool)
            .await?;

        Ok(row.0)
    }

    /// Get service stats
    pub async fn get_stats(&self) -> PlateLogStats {
        self.stats.read().await.clone()
    }
}
