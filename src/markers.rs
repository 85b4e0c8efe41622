//! Latest-wins marker detection snapshot.
//!
//! Marker detection runs inline on the capture thread but is consumed
//! on an unrelated cadence, so results live in their own locked
//! snapshot instead of in frame slots. Each detection pass replaces
//! the snapshot wholesale.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::device::{CameraIntrinsics, Image, MarkerDetect};

/// Predefined marker dictionaries, mirroring the detector's catalog.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MarkerDictionary {
    Dict4X4_50,
    Dict5X5_100,
    Dict6X6_250,
    Dict7X7_1000,
}

/// One detected fiducial marker with its estimated pose. Rotation is
/// axis-angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedMarker {
    pub id: i32,
    pub position: [f32; 3],
    pub rotation: [f32; 3],
}

#[derive(Debug)]
struct MarkerState {
    enabled: bool,
    dictionary: MarkerDictionary,
    marker_size: f32,
    detected: HashMap<i32, DetectedMarker>,
}

/// Shared snapshot of the most recent detection pass, guarded by one
/// lock that is independent of every frame-slot state.
pub struct MarkerTracker {
    state: Mutex<MarkerState>,
}

impl Default for MarkerTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MarkerState {
                enabled: false,
                dictionary: MarkerDictionary::Dict6X6_250,
                marker_size: 0.0,
                detected: HashMap::new(),
            }),
        }
    }

    /// Enable detection, discarding any markers from a previous run.
    pub fn start(&self, dictionary: MarkerDictionary, marker_size: f32) {
        let mut state = self.state.lock().unwrap();
        state.detected.clear();
        state.dictionary = dictionary;
        state.marker_size = marker_size;
        state.enabled = true;
    }

    pub fn stop(&self) {
        self.state.lock().unwrap().enabled = false;
    }

    pub fn count(&self) -> usize {
        self.state.lock().unwrap().detected.len()
    }

    /// Up to `max` markers from the latest pass, in unspecified order.
    pub fn latest(&self, max: usize) -> Vec<DetectedMarker> {
        let state = self.state.lock().unwrap();
        if !state.enabled {
            return Vec::new();
        }
        state.detected.values().take(max).copied().collect()
    }

    /// Run one detection pass on the capture thread. Replaces the
    /// snapshot wholesale; duplicate ids from the detector are
    /// last-wins.
    pub(crate) fn update(
        &self,
        detector: &dyn MarkerDetect,
        color: &Image,
        intrinsics: &CameraIntrinsics,
    ) {
        let mut state = self.state.lock().unwrap();
        if !state.enabled {
            return;
        }

        let found = detector.detect(color, intrinsics, state.dictionary, state.marker_size);
        state.detected.clear();
        for marker in found {
            state.detected.insert(marker.id, marker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDetect(Vec<DetectedMarker>);

    impl MarkerDetect for FixedDetect {
        fn detect(
            &self,
            _color: &Image,
            _intrinsics: &CameraIntrinsics,
            _dictionary: MarkerDictionary,
            _marker_size: f32,
        ) -> Vec<DetectedMarker> {
            self.0.clone()
        }
    }

    fn marker(id: i32, x: f32) -> DetectedMarker {
        DetectedMarker {
            id,
            position: [x, 0.0, 1.0],
            rotation: [0.0, x, 0.0],
        }
    }

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics {
            focal_length: [600.0, 600.0],
            principal_point: [320.0, 240.0],
            radial_distortion: [0.0; 6],
            tangential_distortion: [0.0; 2],
            width: 640,
            height: 480,
        }
    }

    fn color() -> Image {
        Image::from_vec(vec![0u8; 64], 4, 4, 16)
    }

    #[test]
    fn round_trip_two_markers() {
        let tracker = MarkerTracker::new();
        tracker.start(MarkerDictionary::Dict6X6_250, 0.05);
        let detector = FixedDetect(vec![marker(3, 0.1), marker(7, 0.2)]);

        tracker.update(&detector, &color(), &intrinsics());

        assert_eq!(tracker.count(), 2);
        let mut latest = tracker.latest(16);
        latest.sort_by_key(|m| m.id);
        assert_eq!(latest[0], marker(3, 0.1));
        assert_eq!(latest[1], marker(7, 0.2));
    }

    #[test]
    fn disabled_tracker_ignores_updates() {
        let tracker = MarkerTracker::new();
        let detector = FixedDetect(vec![marker(1, 0.0)]);
        tracker.update(&detector, &color(), &intrinsics());
        assert_eq!(tracker.count(), 0);
        assert!(tracker.latest(4).is_empty());
    }

    #[test]
    fn pass_replaces_snapshot_wholesale() {
        let tracker = MarkerTracker::new();
        tracker.start(MarkerDictionary::Dict4X4_50, 0.03);

        tracker.update(&FixedDetect(vec![marker(3, 0.1), marker(7, 0.2)]), &color(), &intrinsics());
        tracker.update(&FixedDetect(vec![marker(7, 0.9)]), &color(), &intrinsics());

        let latest = tracker.latest(16);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0], marker(7, 0.9));
    }

    #[test]
    fn duplicate_ids_are_last_wins() {
        let tracker = MarkerTracker::new();
        tracker.start(MarkerDictionary::Dict4X4_50, 0.03);
        tracker.update(
            &FixedDetect(vec![marker(5, 0.1), marker(5, 0.7)]),
            &color(),
            &intrinsics(),
        );
        let latest = tracker.latest(16);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0], marker(5, 0.7));
    }

    #[test]
    fn start_resets_previous_run() {
        let tracker = MarkerTracker::new();
        tracker.start(MarkerDictionary::Dict4X4_50, 0.03);
        tracker.update(&FixedDetect(vec![marker(2, 0.4)]), &color(), &intrinsics());
        tracker.stop();
        tracker.start(MarkerDictionary::Dict5X5_100, 0.05);
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn latest_respects_max() {
        let tracker = MarkerTracker::new();
        tracker.start(MarkerDictionary::Dict7X7_1000, 0.1);
        tracker.update(
            &FixedDetect(vec![marker(1, 0.1), marker(2, 0.2), marker(3, 0.3)]),
            &color(),
            &intrinsics(),
        );
        assert_eq!(tracker.latest(2).len(), 2);
    }
}
