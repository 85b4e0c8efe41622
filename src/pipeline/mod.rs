//! Pipeline owner: wires the camera, the segmentation tracker, and the
//! marker detector onto the frame ring, and exposes the non-blocking
//! consumer API.

mod capture;
mod segmentation;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::device::{BodyTracker, CameraCalibration, DepthCamera, MarkerDetect};
use crate::error::PipelineError;
use crate::frame::{FrameRing, ImageKind};
use crate::markers::{DetectedMarker, MarkerDictionary, MarkerTracker};
use crate::Config;

const COLOR_BYTES_PER_PIXEL: usize = 4; // BGRA8
const DEPTH_BYTES_PER_PIXEL: usize = 2; // depth16

/// State shared between the workers and the consumer-facing API.
pub(crate) struct PipelineShared {
    pub(crate) ring: FrameRing,
    pub(crate) markers: MarkerTracker,
    pub(crate) calibration: CameraCalibration,
    pub(crate) stop: AtomicBool,
    pub(crate) capture_depth: bool,
    pub(crate) capture_body_mask: bool,
    pub(crate) capture_timeout: Option<Duration>,
    pub(crate) saturation_backoff: Duration,
    pub(crate) segmentation_poll: Duration,
}

/// The staging pipeline. Construction starts the camera and the worker
/// threads; drop (or [`stop`](Self::stop)) joins the workers before the
/// camera handle is released.
///
/// All consumer-side methods are non-blocking and safe to call from an
/// external render tick.
pub struct CameraPipeline {
    shared: Arc<PipelineShared>,
    camera: Arc<dyn DepthCamera>,
    capture_thread: Option<JoinHandle<()>>,
    segmentation_thread: Option<JoinHandle<()>>,
    camera_stopped: bool,
}

impl CameraPipeline {
    /// Start the camera and spawn the capture (and, when body masks are
    /// requested, segmentation) workers.
    ///
    /// Device open/start/calibration failures are the only errors a
    /// running pipeline ever propagates; after this returns `Ok`, worker
    /// failures surface as a stalled frame index.
    pub fn start(
        camera: Arc<dyn DepthCamera>,
        tracker: Option<Arc<dyn BodyTracker>>,
        detector: Arc<dyn MarkerDetect>,
        config: &Config,
    ) -> Result<Self, PipelineError> {
        let calibration = camera.start(&config.capture)?;

        let capture_depth = config.capture.capture_depth;
        let mut capture_body_mask = config.capture.capture_body_mask;
        if capture_body_mask && (!capture_depth || tracker.is_none()) {
            warn!("body mask capture requires depth capture and a body tracker, disabling");
            capture_body_mask = false;
        }

        // Depth and body mask are staged post-remap, so both planes are
        // sized for color-camera space.
        let color_pixels = calibration.color.width as usize * calibration.color.height as usize;
        let ring = FrameRing::new(
            config.pipeline.ring_capacity,
            color_pixels * COLOR_BYTES_PER_PIXEL,
            color_pixels * DEPTH_BYTES_PER_PIXEL,
        );

        let shared = Arc::new(PipelineShared {
            ring,
            markers: MarkerTracker::new(),
            calibration,
            stop: AtomicBool::new(false),
            capture_depth,
            capture_body_mask,
            capture_timeout: config.capture.capture_timeout_ms.map(Duration::from_millis),
            saturation_backoff: Duration::from_millis(config.pipeline.saturation_backoff_ms),
            segmentation_poll: Duration::from_millis(config.pipeline.segmentation_poll_ms),
        });

        info!(
            width = calibration.color.width,
            height = calibration.color.height,
            ring_capacity = shared.ring.capacity(),
            capture_depth,
            capture_body_mask,
            "starting camera pipeline"
        );

        let capture_thread = {
            let shared = Arc::clone(&shared);
            let camera = Arc::clone(&camera);
            let tracker = tracker.clone().filter(|_| capture_body_mask);
            thread::Builder::new()
                .name("artemis-capture".into())
                .spawn(move || capture::run_capture_loop(shared, camera, tracker, detector))
                .map_err(|source| PipelineError::Spawn {
                    name: "capture",
                    source,
                })?
        };

        let segmentation_thread = if let (true, Some(tracker)) = (capture_body_mask, tracker) {
            let shared_seg = Arc::clone(&shared);
            let camera_seg = Arc::clone(&camera);
            match thread::Builder::new()
                .name("artemis-bodymask".into())
                .spawn(move || segmentation::run_segmentation_loop(shared_seg, camera_seg, tracker))
            {
                Ok(handle) => Some(handle),
                Err(source) => {
                    shared.stop.store(true, Ordering::Release);
                    let _ = capture_thread.join();
                    camera.stop();
                    return Err(PipelineError::Spawn {
                        name: "segmentation",
                        source,
                    });
                }
            }
        } else {
            None
        };

        Ok(Self {
            shared,
            camera,
            capture_thread: Some(capture_thread),
            segmentation_thread,
            camera_stopped: false,
        })
    }

    /// Monotonic count of frames staged so far; the newest completed
    /// frame is one behind this value. Tracks the segmentation counter
    /// when body masks are produced, so a frame is never advertised
    /// before its mask exists.
    pub fn current_frame_index(&self) -> u64 {
        self.shared
            .ring
            .current_frame_index(self.shared.capture_body_mask)
    }

    pub fn calibration(&self) -> &CameraCalibration {
        &self.shared.calibration
    }

    /// Copy the requested planes of `frame_index` into the caller's
    /// destinations. Returns false (leaving every destination untouched)
    /// if the slot is not currently readable; that is expected on ticks
    /// where the producer has not finished, and the caller keeps its
    /// previous output.
    pub fn update_views(
        &self,
        frame_index: u64,
        color: Option<&mut [u8]>,
        depth: Option<&mut [u8]>,
        body_mask: Option<&mut [u8]>,
    ) -> bool {
        let slot = self.shared.ring.slot(frame_index);
        if !slot.try_begin_reading() {
            return false;
        }

        if let Some(dest) = color {
            slot.copy_image(ImageKind::Color, dest);
        }
        if let Some(dest) = depth {
            slot.copy_image(ImageKind::Depth, dest);
        }
        if let Some(dest) = body_mask {
            slot.copy_image(ImageKind::BodyMask, dest);
        }

        slot.end_reading();
        true
    }

    pub fn start_marker_detection(&self, dictionary: MarkerDictionary, marker_size: f32) {
        self.shared.markers.start(dictionary, marker_size);
    }

    pub fn stop_marker_detection(&self) {
        self.shared.markers.stop();
    }

    pub fn marker_count(&self) -> usize {
        self.shared.markers.count()
    }

    pub fn latest_markers(&self, max: usize) -> Vec<DetectedMarker> {
        self.shared.markers.latest(max)
    }

    /// Stop both workers and release the camera. Idempotent; also runs
    /// on drop. Workers are joined before the camera handle is released
    /// so no worker can touch a closed device.
    pub fn stop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.segmentation_thread.take() {
            let _ = handle.join();
        }
        if !self.camera_stopped {
            self.camera.stop();
            self.camera_stopped = true;
            info!("camera pipeline stopped");
        }
    }
}

impl Drop for CameraPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
