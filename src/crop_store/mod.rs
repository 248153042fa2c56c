//! Crop persistence
//!
//! Saves cropped vehicle and plate JPEGs under category directories and
//! returns the relative path that goes into the log row.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// Category of a saved crop. Each category gets its own directory and
/// filename prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropKind {
    Car,
    Plate,
    Face,
}

impl CropKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            CropKind::Car => "saved_cars",
            CropKind::Plate => "saved_plates",
            CropKind::Face => "saved_faces",
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            CropKind::Car => "car",
            CropKind::Plate => "plate",
            CropKind::Face => "face",
        }
    }
}

/// Filename for a crop: `{prefix}_{track_id}_{timestamp}.jpg`.
pub fn crop_filename(kind: CropKind, track_id: i64, captured_at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.jpg",
        kind.prefix(),
        track_id,
        captured_at.format("%Y%m%d_%H%M%S")
    )
}

/// Crop persistence capability.
#[async_trait]
pub trait CropStorage: Send + Sync {
    /// Store one JPEG and return the path it was written to.
    async fn store(
        &self,
        kind: CropKind,
        track_id: i64,
        captured_at: DateTime<Utc>,
        jpeg: &[u8],
    ) -> Result<String>;
}

/// Filesystem-backed crop storage.
pub struct FsCropStore {
    base_dir: PathBuf,
}

impl FsCropStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }
}

#[async_trait]
impl CropStorage for FsCropStore {
    async fn store(
        &self,
        kind: CropKind,
        track_id: i64,
        captured_at: DateTime<Utc>,
        jpeg: &[u8],
    ) -> Result<String> {
        let dir = self.base_dir.join(kind.dir_name());
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(crop_filename(kind, track_id, captured_at));
        tokio::fs::write(&path, jpeg).await?;

        Ok(path.to_string_lossy().to_string())
    }
}
