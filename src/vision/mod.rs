//! VisionClient - Inference Sidecar Adapter
//!
//! ## Responsibilities
//!
//! - VehicleTracker / PlateDetector / PlateReader contracts consumed by the
//!   frame pipeline
//! - HTTP implementation of all three against the vision sidecar
//! - OCR result normalization
//!
//! Requests deliberately carry no timeout: the frame loop waits for the
//! sidecar however long inference takes.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::frame_feed::Frame;
use crate::geometry::BBox;

/// One tracked vehicle reported for the current frame. Rebuilt every frame;
/// nothing holds these beyond the frame that produced them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleTrack {
    /// Stable handle issued by the tracker for one physical vehicle.
    pub track_id: i64,
    pub bbox: BBox,
    /// Whether the tracker considers this track stable enough to report.
    pub confirmed: bool,
}

/// One plate detection for the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateDetection {
    pub bbox: BBox,
    pub confidence: f32,
}

/// Vehicle tracking capability.
#[async_trait]
pub trait VehicleTracker: Send + Sync {
    /// Current tracks for this frame, confirmed and tentative alike.
    async fn track(&self, frame: &Frame) -> Result<Vec<VehicleTrack>>;
}

/// Plate detection capability.
#[async_trait]
pub trait PlateDetector: Send + Sync {
    async fn detect(&self, frame: &Frame) -> Result<Vec<PlateDetection>>;
}

/// Plate OCR capability.
#[async_trait]
pub trait PlateReader: Send + Sync {
    /// `Ok(None)` means the model could not read the crop.
    async fn read(&self, plate_jpeg: Vec<u8>) -> Result<Option<String>>;
}

/// Track entry as the sidecar reports it.
#[derive(Debug, Clone, Deserialize)]
struct WireTrack {
    track_id: i64,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    #[serde(default)]
    confirmed: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct TrackResponse {
    #[serde(default)]
    tracks: Vec<WireTrack>,
}

/// Plate detection entry as the sidecar reports it.
#[derive(Debug, Clone, Deserialize)]
struct WireDetection {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    #[serde(default)]
    confidence: f32,
}

#[derive(Debug, Clone, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<WireDetection>,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    characters: Option<Vec<String>>,
}

/// Collapse the sidecar's OCR result into one plate string.
///
/// A character sequence takes precedence and is concatenated; otherwise the
/// plain text field is used. Whitespace is trimmed; an empty result is a
/// recognition failure and maps to `None`.
pub fn normalize_ocr_text(
    text: Option<String>,
    characters: Option<Vec<String>>,
) -> Option<String> {
    let joined = match characters {
        Some(chars) if !chars.is_empty() => chars.concat(),
        _ => text.unwrap_or_default(),
    };
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// HTTP client for the vision sidecar.
pub struct VisionClient {
    client: reqwest::Client,
    base_url: String,
}

impl VisionClient {
    /// Create a new client. No request timeout is configured.
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Check sidecar health. Unreachable maps to `Ok(false)`.
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_jpeg(
        &self,
        path: &str,
        field: &'static str,
        jpeg: Vec<u8>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let form = Form::new().part(
            field,
            Part::bytes(jpeg)
                .file_name("frame.jpg")
                .mime_str("image/jpeg")?,
        );

        let resp = self.client.post(&url).multipart(form).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Vision(format!(
                "{} failed: {}",
                path,
                resp.status()
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl VehicleTracker for VisionClient {
    async fn track(&self, frame: &Frame) -> Result<Vec<VehicleTrack>> {
        let jpeg = frame.encoded_jpeg()?;
        let resp = self.post_jpeg("/v1/track", "frame", jpeg).await?;
        let body: TrackResponse = resp.json().await?;

        Ok(body
            .tracks
            .into_iter()
            .filter_map(|t| {
                let bbox = BBox::from_corners(t.x1, t.y1, t.x2, t.y2)?;
                Some(VehicleTrack {
                    track_id: t.track_id,
                    bbox,
                    confirmed: t.confirmed,
                })
            })
            .collect())
    }
}

#[async_trait]
impl PlateDetector for VisionClient {
    async fn detect(&self, frame: &Frame) -> Result<Vec<PlateDetection>> {
        let jpeg = frame.encoded_jpeg()?;
        let resp = self.post_jpeg("/v1/plates", "frame", jpeg).await?;
        let body: DetectResponse = resp.json().await?;

        Ok(body
            .detections
            .into_iter()
            .filter_map(|d| {
                let bbox = BBox::from_corners(d.x1, d.y1, d.x2, d.y2)?;
                Some(PlateDetection {
                    bbox,
                    confidence: d.confidence,
                })
            })
            .collect())
    }
}

#[async_trait]
impl PlateReader for VisionClient {
    async fn read(&self, plate_jpeg: Vec<u8>) -> Result<Option<String>> {
        let resp = self.post_jpeg("/v1/ocr", "plate", plate_jpeg).await?;
        let body: OcrResponse = resp.json().await?;
        Ok(normalize_ocr_text(body.text, body.characters))
    }
}
