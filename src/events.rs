//! Frame events and the producer/consumer queue
//!
//! One [`FrameEvent`] per processed frame flows from the pipeline task to the
//! UI state reducer over an unbounded channel: the producer never blocks on a
//! slow consumer, the consumer drains everything queued on its own tick.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::geometry::BBox;

/// One recognized (or attempted) plate for one vehicle in one frame.
/// Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateReading {
    pub track_id: i64,
    pub plate_text: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub car_path: Option<String>,
    pub plate_path: Option<String>,
    pub face_path: Option<String>,
}

/// Display-only box annotation carried alongside the frame's readings.
/// Overlays never feed back into occupancy or logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayBox {
    pub bbox: BBox,
    pub label: String,
    pub kind: OverlayKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    MatchedVehicle,
    UnmatchedVehicle,
    Plate,
}

/// Everything one frame produced, handed to the consumer as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameEvent {
    pub frame_seq: u64,
    pub captured_at: DateTime<Utc>,
    pub readings: Vec<PlateReading>,
    /// Complete set of confirmed track identities seen this frame.
    pub tracked_ids: HashSet<i64>,
    pub overlay: Vec<OverlayBox>,
}

/// Create connected queue endpoints. Single producer, single consumer.
pub fn frame_queue() -> (FrameEventSender, FrameEventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicU64::new(0));
    (
        FrameEventSender {
            tx,
            depth: depth.clone(),
        },
        FrameEventReceiver { rx, depth },
    )
}

/// Producer endpoint. Cloneable so the app state can read the depth gauge.
#[derive(Clone)]
pub struct FrameEventSender {
    tx: mpsc::UnboundedSender<FrameEvent>,
    depth: Arc<AtomicU64>,
}

impl FrameEventSender {
    /// Non-blocking push. Returns false when the consumer end is gone.
    pub fn push(&self, event: FrameEvent) -> bool {
        self.depth.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(event).is_ok() {
            true
        } else {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            false
        }
    }

    /// Events pushed but not yet drained.
    pub fn depth(&self) -> u64 {
        self.depth.load(Ordering::Relaxed)
    }
}

/// Consumer endpoint, owned exclusively by the reducer task.
pub struct FrameEventReceiver {
    rx: mpsc::UnboundedReceiver<FrameEvent>,
    depth: Arc<AtomicU64>,
}

impl FrameEventReceiver {
    /// Drain everything currently queued, in FIFO order.
    pub fn drain(&mut self) -> Vec<FrameEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(seq: u64) -> FrameEvent {
        FrameEvent {
            frame_seq: seq,
            captured_at: Utc::now(),
            readings: Vec::new(),
            tracked_ids: HashSet::new(),
            overlay: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_drain_preserves_fifo_order() {
        let (tx, mut rx) = frame_queue();
        assert!(tx.push(event(1)));
        assert!(tx.push(event(2)));
        assert!(tx.push(event(3)));

        let drained = rx.drain();
        let seqs: Vec<u64> = drained.iter().map(|e| e.frame_seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_depth_tracks_pending_events() {
        let (tx, mut rx) = frame_queue();
        assert_eq!(tx.depth(), 0);
        tx.push(event(1));
        tx.push(event(2));
        assert_eq!(tx.depth(), 2);

        rx.drain();
        assert_eq!(tx.depth(), 0);
    }

    #[tokio::test]
    async fn test_drain_on_empty_queue_returns_nothing() {
        let (_tx, mut rx) = frame_queue();
        assert!(rx.drain().is_empty());
    }

    #[tokio::test]
    async fn test_push_after_receiver_dropped_returns_false() {
        let (tx, rx) = frame_queue();
        drop(rx);
        assert!(!tx.push(event(1)));
        assert_eq!(tx.depth(), 0);
    }
}
