//! Frame acquisition
//!
//! A `FrameSource` yields decoded frames one at a time until the stream ends.
//! The HTTP implementation polls a snapshot endpoint at a fixed interval,
//! which is how the gate cameras expose their feed.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::{imageops, ImageFormat, RgbImage};

use crate::error::{Error, Result};
use crate::geometry::PixelRect;

/// One decoded video frame.
pub struct Frame {
    /// Monotonic sequence number assigned by the source.
    pub seq: u64,
    /// Capture timestamp, taken when the source produced the frame.
    pub captured_at: DateTime<Utc>,
    pub image: RgbImage,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Encode the whole frame as JPEG.
    pub fn encoded_jpeg(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.image.write_to(&mut buf, ImageFormat::Jpeg)?;
        Ok(buf.into_inner())
    }

    /// Encode a sub-region as JPEG. The rect must already be clipped to the
    /// frame bounds.
    pub fn crop_jpeg(&self, rect: PixelRect) -> Result<Vec<u8>> {
        let crop =
            imageops::crop_imm(&self.image, rect.x, rect.y, rect.width, rect.height).to_image();
        let mut buf = Cursor::new(Vec::new());
        crop.write_to(&mut buf, ImageFormat::Jpeg)?;
        Ok(buf.into_inner())
    }
}

/// Sequential frame producer.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `Ok(None)` when the stream is exhausted.
    async fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Polls a camera snapshot URL at a fixed interval.
pub struct HttpFrameSource {
    client: reqwest::Client,
    snapshot_url: String,
    frame_interval: Duration,
    seq: u64,
}

impl HttpFrameSource {
    pub fn new(snapshot_url: String, frame_interval: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            snapshot_url,
            frame_interval,
            seq: 0,
        }
    }
}

#[async_trait]
impl FrameSource for HttpFrameSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.seq > 0 {
            tokio::time::sleep(self.frame_interval).await;
        }

        let resp = self.client.get(&self.snapshot_url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::FrameSource(format!(
                "snapshot fetch failed: {}",
                resp.status()
            )));
        }

        let captured_at = Utc::now();
        let bytes = resp.bytes().await?;
        let image = image::load_from_memory(&bytes)?.to_rgb8();

        self.seq += 1;
        Ok(Some(Frame {
            seq: self.seq,
            captured_at,
            image,
        }))
    }
}
