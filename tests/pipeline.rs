//! End-to-end pipeline tests against the synthetic collaborators.

use std::sync::Arc;
use std::time::{Duration, Instant};

use artemis::device::synthetic::{NullMarkerDetect, SyntheticBodyTracker, SyntheticCamera};
use artemis::device::{CameraIntrinsics, Image, MarkerDetect};
use artemis::{CameraPipeline, Config, DetectedMarker, MarkerDictionary};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

fn test_config(body_mask: bool) -> Config {
    let mut config = Config::default();
    config.capture.width = WIDTH;
    config.capture.height = HEIGHT;
    config.capture.fps = 120;
    config.capture.capture_depth = true;
    config.capture.capture_body_mask = body_mask;
    config.pipeline.ring_capacity = 8;
    config
}

fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

fn u16_at(buf: &[u8], pixel: usize) -> u16 {
    u16::from_le_bytes([buf[2 * pixel], buf[2 * pixel + 1]])
}

#[test]
fn color_and_depth_frames_reach_the_consumer() {
    let config = test_config(false);
    let pipeline = CameraPipeline::start(
        Arc::new(SyntheticCamera::new()),
        None,
        Arc::new(NullMarkerDetect),
        &config,
    )
    .expect("pipeline start");

    assert!(wait_until(Duration::from_secs(5), || {
        pipeline.current_frame_index() >= 3
    }));

    let mut color = vec![0u8; (WIDTH * HEIGHT * 4) as usize];
    let mut depth = vec![0u8; (WIDTH * HEIGHT * 2) as usize];

    let updated = wait_until(Duration::from_secs(5), || {
        let index = pipeline.current_frame_index().saturating_sub(1);
        pipeline.update_views(index, Some(&mut color), Some(&mut depth), None)
    });
    assert!(updated);

    // Synthetic color frames are a solid fill; a torn copy would mix
    // two fill values.
    assert!(color.windows(2).all(|w| w[0] == w[1]));

    // Depth is a left-to-right ramp remapped into color space.
    let left = u16_at(&depth, 2);
    let right = u16_at(&depth, (WIDTH - 2) as usize);
    assert!(left >= 500);
    assert!(right > left);
}

#[test]
fn body_mask_is_binary_and_tracks_depth() {
    let config = test_config(true);
    let pipeline = CameraPipeline::start(
        Arc::new(SyntheticCamera::new()),
        Some(Arc::new(SyntheticBodyTracker::new(8))),
        Arc::new(NullMarkerDetect),
        &config,
    )
    .expect("pipeline start");

    // Body-mask counter only moves once segmentation results land.
    assert!(wait_until(Duration::from_secs(5), || {
        pipeline.current_frame_index() >= 3
    }));

    let mut mask = vec![0u8; (WIDTH * HEIGHT * 2) as usize];
    let updated = wait_until(Duration::from_secs(5), || {
        let index = pipeline.current_frame_index().saturating_sub(1);
        pipeline.update_views(index, None, None, Some(&mut mask))
    });
    assert!(updated);

    // Every mask pixel is 0 or 1 after binarization.
    for pixel in 0..(WIDTH * HEIGHT) as usize {
        assert!(u16_at(&mask, pixel) <= 1, "pixel {pixel} not binary");
    }

    // The synthetic depth ramp puts the body in the left third of the
    // row and background on the right edge.
    let row = (HEIGHT / 2) as usize * WIDTH as usize;
    assert_eq!(u16_at(&mask, row + 4), 1);
    assert_eq!(u16_at(&mask, row + (WIDTH - 4) as usize), 0);
}

#[test]
fn consumed_frame_is_not_readable_twice() {
    let config = test_config(false);
    let pipeline = CameraPipeline::start(
        Arc::new(SyntheticCamera::new()),
        None,
        Arc::new(NullMarkerDetect),
        &config,
    )
    .expect("pipeline start");

    assert!(wait_until(Duration::from_secs(5), || {
        pipeline.current_frame_index() >= 2
    }));

    let mut color = vec![0u8; (WIDTH * HEIGHT * 4) as usize];
    let mut read_index = 0;
    assert!(wait_until(Duration::from_secs(5), || {
        read_index = pipeline.current_frame_index().saturating_sub(1);
        pipeline.update_views(read_index, Some(&mut color), None, None)
    }));

    // The slot went back to Unused (or on to a new write); a second
    // read of the same index reports "not updated" and leaves the
    // destination alone.
    let sentinel = vec![0xA5u8; (WIDTH * HEIGHT * 4) as usize];
    let mut dest = sentinel.clone();
    if !pipeline.update_views(read_index, Some(&mut dest), None, None) {
        assert_eq!(dest, sentinel);
    }
}

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

#[test]
fn marker_detection_round_trip() {
    let markers = vec![
        DetectedMarker {
            id: 3,
            position: [0.1, 0.2, 1.0],
            rotation: [0.0, 0.5, 0.0],
        },
        DetectedMarker {
            id: 7,
            position: [-0.3, 0.0, 2.0],
            rotation: [1.0, 0.0, 0.0],
        },
    ];

    let config = test_config(false);
    let pipeline = CameraPipeline::start(
        Arc::new(SyntheticCamera::new()),
        None,
        Arc::new(FixedDetect(markers.clone())),
        &config,
    )
    .expect("pipeline start");

    // Nothing reported until detection is started.
    assert!(pipeline.latest_markers(8).is_empty());

    pipeline.start_marker_detection(MarkerDictionary::Dict6X6_250, 0.05);
    assert!(wait_until(Duration::from_secs(5), || pipeline.marker_count() == 2));

    let mut latest = pipeline.latest_markers(8);
    latest.sort_by_key(|m| m.id);
    assert_eq!(latest, markers);

    pipeline.stop_marker_detection();
    assert!(pipeline.latest_markers(8).is_empty());
}

#[test]
fn stop_joins_workers_and_releases_the_camera() {
    let config = test_config(true);
    let camera = Arc::new(SyntheticCamera::new());
    let mut pipeline = CameraPipeline::start(
        Arc::clone(&camera) as Arc<dyn artemis::device::DepthCamera>,
        Some(Arc::new(SyntheticBodyTracker::new(8))),
        Arc::new(NullMarkerDetect),
        &config,
    )
    .expect("pipeline start");

    assert!(wait_until(Duration::from_secs(5), || {
        pipeline.current_frame_index() >= 1
    }));

    pipeline.stop();
    let stalled = pipeline.current_frame_index();
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(pipeline.current_frame_index(), stalled);
}
