//! Collaborator interfaces for the capture pipeline: the depth camera,
//! the body tracker, and the marker detector. The pipeline core treats
//! all three as opaque sources/sinks of image buffers.

pub mod synthetic;

use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::error::{CameraError, SegmentationError};
use crate::markers::{DetectedMarker, MarkerDictionary};
use crate::CaptureConfig;

/// Body-index value marking a pixel that belongs to no tracked body.
pub const BODY_INDEX_BACKGROUND: u8 = 255;

/// A single image plane handed across a collaborator boundary.
///
/// `data` is reference-counted, so cloning an `Image` never copies
/// pixels. Depth and body-index images carry 16-bit or 8-bit pixels
/// respectively; `stride` is always in bytes.
#[derive(Debug, Clone)]
pub struct Image {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

impl Image {
    pub fn from_vec(data: Vec<u8>, width: u32, height: u32, stride: u32) -> Self {
        Self {
            data: Bytes::from(data),
            width,
            height,
            stride,
        }
    }

    /// Bytes actually occupied by pixel rows.
    pub fn size_bytes(&self) -> usize {
        self.height as usize * self.stride as usize
    }
}

/// One raw capture from the camera: a color image and, when depth
/// capture is enabled, the matching depth image in depth-camera space.
#[derive(Debug, Clone)]
pub struct Capture {
    pub color: Image,
    pub depth: Option<Image>,
    pub timestamp: Instant,
}

/// Color-camera intrinsics, reported once at start and immutable for
/// the lifetime of the capture session. Distortion coefficients follow
/// the 6-radial + 2-tangential Brown-Conrady layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub focal_length: [f32; 2],
    pub principal_point: [f32; 2],
    pub radial_distortion: [f32; 6],
    pub tangential_distortion: [f32; 2],
    pub width: u32,
    pub height: u32,
}

/// Calibration blob handed back by [`DepthCamera::start`].
#[derive(Debug, Clone, Copy)]
pub struct CameraCalibration {
    pub color: CameraIntrinsics,
    /// Dimensions of the raw depth image, before remapping into color
    /// space.
    pub depth_width: u32,
    pub depth_height: u32,
}

/// Depth-camera operating mode, mirroring the device's native modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DepthMode {
    Off,
    NarrowViewBinned,
    NarrowViewUnbinned,
    WideViewBinned,
    WideViewUnbinned,
    PassiveInfrared,
}

/// The physical depth camera. Implementations own the device handle;
/// construction plays the role of `open()`.
///
/// `next_capture` is called from the capture worker thread only.
/// `remap_depth_to_color` is shared between the capture worker (depth)
/// and the segmentation worker (body mask), so implementations must
/// tolerate concurrent remap calls.
pub trait DepthCamera: Send + Sync {
    /// Start streaming and return the session calibration.
    fn start(&self, config: &CaptureConfig) -> Result<CameraCalibration, CameraError>;

    /// Block until the next capture is available. `None` waits forever.
    fn next_capture(&self, timeout: Option<Duration>) -> Result<Capture, CameraError>;

    /// Geometrically remap a depth16 image from depth-camera space into
    /// color-camera space.
    fn remap_depth_to_color(&self, depth: &Image) -> Result<Image, CameraError>;

    /// Stop streaming. Called after all worker threads have joined.
    fn stop(&self);
}

/// The body-segmentation accelerator. Captures go in on the capture
/// thread; per-pixel body-index maps come out on the segmentation
/// thread, in enqueue order, possibly several frames later.
///
/// The returned image carries one `u8` body id per depth pixel, with
/// [`BODY_INDEX_BACKGROUND`] marking background.
pub trait BodyTracker: Send + Sync {
    fn enqueue(&self, capture: &Capture) -> Result<(), SegmentationError>;

    fn pop_result(&self, timeout: Duration) -> Option<Image>;
}

/// Marker detection over a raw color buffer. Stateless from the
/// pipeline's point of view; results land in the latest-markers
/// snapshot, not in frame slots.
pub trait MarkerDetect: Send + Sync {
    fn detect(
        &self,
        color: &Image,
        intrinsics: &CameraIntrinsics,
        dictionary: MarkerDictionary,
        marker_size: f32,
    ) -> Vec<DetectedMarker>;
}
