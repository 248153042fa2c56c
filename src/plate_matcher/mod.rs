//! Plate-to-vehicle association
//!
//! Pairs plate detections with tracked vehicles inside a single frame.
//! A plate belongs to a vehicle when its centroid falls inside the vehicle
//! box. Ties between overlapping vehicles go to the lowest track id, and
//! each vehicle and each plate participates in at most one pair per frame.

use crate::geometry::BBox;
use crate::vision::{PlateDetection, VehicleTrack};

/// One vehicle/plate pair produced for a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateMatch {
    pub track_id: i64,
    pub vehicle_bbox: BBox,
    pub plate_bbox: BBox,
}

/// Result of matching one frame's detections.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub matches: Vec<PlateMatch>,
    /// Tracks that no plate landed in this frame.
    pub unmatched_tracks: Vec<VehicleTrack>,
}

/// Match plates against vehicle tracks for one frame.
///
/// Tracks are scanned in ascending id order; the first track containing the
/// plate centroid claims the plate and is removed from further matching.
pub fn match_plates_to_tracks(
    tracks: &[VehicleTrack],
    plates: &[PlateDetection],
) -> MatchOutcome {
    let mut remaining: Vec<VehicleTrack> = tracks.to_vec();
    remaining.sort_by_key(|t| t.track_id);

    let mut matches = Vec::new();
    for plate in plates {
        let (cx, cy) = plate.bbox.centroid();
        if let Some(pos) = remaining.iter().position(|t| t.bbox.contains(cx, cy)) {
            let track = remaining.remove(pos);
            matches.push(PlateMatch {
                track_id: track.track_id,
                vehicle_bbox: track.bbox,
                plate_bbox: plate.bbox,
            });
        }
    }

    MatchOutcome {
        matches,
        unmatched_tracks: remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: i64, x1: f32, y1: f32, x2: f32, y2: f32) -> VehicleTrack {
        VehicleTrack {
            track_id: id,
            bbox: BBox::from_corners(x1, y1, x2, y2).unwrap(),
            confirmed: true,
        }
    }

    fn plate(x1: f32, y1: f32, x2: f32, y2: f32) -> PlateDetection {
        PlateDetection {
            bbox: BBox::from_corners(x1, y1, x2, y2).unwrap(),
            confidence: 0.9,
        }
    }

    #[test]
    fn test_plate_inside_vehicle_matches() {
        let tracks = vec![track(7, 0.0, 0.0, 100.0, 100.0)];
        let plates = vec![plate(40.0, 60.0, 60.0, 80.0)];

        let outcome = match_plates_to_tracks(&tracks, &plates);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].track_id, 7);
        assert!(outcome.unmatched_tracks.is_empty());
    }

    #[test]
    fn test_centroid_outside_does_not_match() {
        let tracks = vec![track(7, 0.0, 0.0, 50.0, 50.0)];
        // Overlaps the vehicle box but its centroid (60, 60) is outside.
        let plates = vec![plate(40.0, 40.0, 80.0, 80.0)];

        let outcome = match_plates_to_tracks(&tracks, &plates);
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.unmatched_tracks.len(), 1);
    }

    #[test]
    fn test_overlapping_vehicles_lowest_id_wins() {
        // Both boxes contain the plate centroid; declared high id first to
        // prove the scan order is by id, not input order.
        let tracks = vec![
            track(9, 0.0, 0.0, 100.0, 100.0),
            track(3, 10.0, 10.0, 90.0, 90.0),
        ];
        let plates = vec![plate(45.0, 45.0, 55.0, 55.0)];

        let outcome = match_plates_to_tracks(&tracks, &plates);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].track_id, 3);
        assert_eq!(outcome.unmatched_tracks.len(), 1);
        assert_eq!(outcome.unmatched_tracks[0].track_id, 9);
    }

    #[test]
    fn test_vehicle_claims_at_most_one_plate() {
        let tracks = vec![track(4, 0.0, 0.0, 100.0, 100.0)];
        let plates = vec![
            plate(10.0, 10.0, 30.0, 20.0),
            plate(60.0, 60.0, 80.0, 70.0),
        ];

        let outcome = match_plates_to_tracks(&tracks, &plates);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].plate_bbox, plates[0].bbox);
    }

    #[test]
    fn test_disjoint_vehicles_pair_independently() {
        let tracks = vec![
            track(1, 0.0, 0.0, 100.0, 100.0),
            track(2, 200.0, 0.0, 300.0, 100.0),
        ];
        let plates = vec![
            plate(240.0, 40.0, 260.0, 60.0),
            plate(40.0, 40.0, 60.0, 60.0),
        ];

        let outcome = match_plates_to_tracks(&tracks, &plates);
        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.matches[0].track_id, 2);
        assert_eq!(outcome.matches[1].track_id, 1);
        assert!(outcome.unmatched_tracks.is_empty());
    }

    #[test]
    fn test_centroid_on_edge_is_inside() {
        let tracks = vec![track(5, 0.0, 0.0, 50.0, 50.0)];
        // Centroid lands exactly on the right edge at (50, 25).
        let plates = vec![plate(40.0, 20.0, 60.0, 30.0)];

        let outcome = match_plates_to_tracks(&tracks, &plates);
        assert_eq!(outcome.matches.len(), 1);
    }

    #[test]
    fn test_empty_inputs() {
        let outcome = match_plates_to_tracks(&[], &[]);
        assert!(outcome.matches.is_empty());
        assert!(outcome.unmatched_tracks.is_empty());

        let tracks = vec![track(1, 0.0, 0.0, 10.0, 10.0)];
        let outcome = match_plates_to_tracks(&tracks, &[]);
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.unmatched_tracks.len(), 1);
    }
}
