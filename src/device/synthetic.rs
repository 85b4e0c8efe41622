//! Synthetic collaborators for the demo binary and integration tests:
//! a paced pattern camera, a channel-backed body tracker, and a no-op
//! marker detector.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::device::{
    BodyTracker, CameraCalibration, CameraIntrinsics, Capture, DepthCamera, Image, MarkerDetect,
    BODY_INDEX_BACKGROUND,
};
use crate::error::{CameraError, SegmentationError};
use crate::markers::{DetectedMarker, MarkerDictionary};
use crate::CaptureConfig;

/// Raw depth-space dimensions for the synthetic depth image.
const DEPTH_WIDTH: u32 = 320;
const DEPTH_HEIGHT: u32 = 288;

/// Depth values at or below this (millimeters) classify as body.
const BODY_DEPTH_CUTOFF_MM: u16 = 1500;

struct SyntheticState {
    started: bool,
    sequence: u64,
    width: u32,
    height: u32,
    frame_interval: Duration,
    emit_depth: bool,
}

/// A deterministic stand-in for the physical depth camera. Produces a
/// solid color frame whose byte value tracks the sequence number, and a
/// left-to-right depth ramp in a reduced depth space, paced at the
/// configured frame rate.
pub struct SyntheticCamera {
    state: Mutex<SyntheticState>,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SyntheticState {
                started: false,
                sequence: 0,
                width: 0,
                height: 0,
                frame_interval: Duration::ZERO,
                emit_depth: false,
            }),
        }
    }

    pub fn calibration_for(width: u32, height: u32) -> CameraCalibration {
        CameraCalibration {
            color: CameraIntrinsics {
                focal_length: [0.6 * width as f32, 0.6 * width as f32],
                principal_point: [width as f32 / 2.0, height as f32 / 2.0],
                radial_distortion: [0.0; 6],
                tangential_distortion: [0.0; 2],
                width,
                height,
            },
            depth_width: DEPTH_WIDTH,
            depth_height: DEPTH_HEIGHT,
        }
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthCamera for SyntheticCamera {
    fn start(&self, config: &CaptureConfig) -> Result<CameraCalibration, CameraError> {
        let mut state = self.state.lock().unwrap();
        if config.fps == 0 {
            return Err(CameraError::Start("fps must be nonzero".into()));
        }
        state.started = true;
        state.sequence = 0;
        state.width = config.width;
        state.height = config.height;
        state.frame_interval = Duration::from_secs(1) / config.fps;
        state.emit_depth = config.capture_depth;
        debug!(width = config.width, height = config.height, fps = config.fps, "synthetic camera started");
        Ok(Self::calibration_for(config.width, config.height))
    }

    fn next_capture(&self, _timeout: Option<Duration>) -> Result<Capture, CameraError> {
        let (sequence, width, height, interval, emit_depth) = {
            let mut state = self.state.lock().unwrap();
            if !state.started {
                return Err(CameraError::NotStarted);
            }
            state.sequence += 1;
            (
                state.sequence,
                state.width,
                state.height,
                state.frame_interval,
                state.emit_depth,
            )
        };

        // Pace the producer like a real sensor would.
        std::thread::sleep(interval);

        let fill = (sequence % 251) as u8;
        let color = Image::from_vec(
            vec![fill; (width * height * 4) as usize],
            width,
            height,
            width * 4,
        );

        let depth = emit_depth.then(|| {
            let mut data = Vec::with_capacity((DEPTH_WIDTH * DEPTH_HEIGHT * 2) as usize);
            for _y in 0..DEPTH_HEIGHT {
                for x in 0..DEPTH_WIDTH {
                    // Ramp from 500mm to ~3700mm across the row; the left
                    // third falls under the body cutoff.
                    let mm = 500u16 + (x * 10) as u16;
                    data.extend_from_slice(&mm.to_le_bytes());
                }
            }
            Image::from_vec(data, DEPTH_WIDTH, DEPTH_HEIGHT, DEPTH_WIDTH * 2)
        });

        Ok(Capture {
            color,
            depth,
            timestamp: Instant::now(),
        })
    }

    fn remap_depth_to_color(&self, depth: &Image) -> Result<Image, CameraError> {
        let (width, height, started) = {
            let state = self.state.lock().unwrap();
            (state.width, state.height, state.started)
        };
        if !started {
            return Err(CameraError::NotStarted);
        }

        // Nearest-neighbor upscale stands in for the geometric remap.
        let mut out = vec![0u8; (width * height * 2) as usize];
        for y in 0..height {
            let sy = (y as u64 * depth.height as u64 / height as u64) as u32;
            for x in 0..width {
                let sx = (x as u64 * depth.width as u64 / width as u64) as u32;
                let src = (sy * depth.stride + sx * 2) as usize;
                let dst = ((y * width + x) * 2) as usize;
                out[dst] = depth.data[src];
                out[dst + 1] = depth.data[src + 1];
            }
        }
        Ok(Image::from_vec(out, width, height, width * 2))
    }

    fn stop(&self) {
        self.state.lock().unwrap().started = false;
        debug!("synthetic camera stopped");
    }
}

/// Body tracker backed by a bounded channel. Depth images ride the
/// channel; classification happens at pop time on the segmentation
/// thread, mimicking an accelerator that answers a few frames late.
pub struct SyntheticBodyTracker {
    tx: flume::Sender<Image>,
    rx: flume::Receiver<Image>,
}

impl SyntheticBodyTracker {
    pub fn new(queue_depth: usize) -> Self {
        let (tx, rx) = flume::bounded(queue_depth);
        Self { tx, rx }
    }
}

impl BodyTracker for SyntheticBodyTracker {
    fn enqueue(&self, capture: &Capture) -> Result<(), SegmentationError> {
        let depth = capture.depth.clone().ok_or(SegmentationError::Stopped)?;
        self.tx
            .try_send(depth)
            .map_err(|err| match err {
                flume::TrySendError::Full(_) => SegmentationError::QueueFull,
                flume::TrySendError::Disconnected(_) => SegmentationError::Stopped,
            })
    }

    fn pop_result(&self, timeout: Duration) -> Option<Image> {
        let depth = self.rx.recv_timeout(timeout).ok()?;

        let width = depth.width as usize;
        let height = depth.height as usize;
        let stride = depth.stride as usize;
        let mut out = vec![BODY_INDEX_BACKGROUND; width * height];
        for y in 0..height {
            for x in 0..width {
                let offset = y * stride + x * 2;
                let mm = u16::from_le_bytes([depth.data[offset], depth.data[offset + 1]]);
                if mm > 0 && mm <= BODY_DEPTH_CUTOFF_MM {
                    out[y * width + x] = 0;
                }
            }
        }
        Some(Image::from_vec(out, depth.width, depth.height, depth.width))
    }
}

/// Marker detector that never finds anything. Used when detection is
/// wired but no real detector backend is available.
pub struct NullMarkerDetect;

impl MarkerDetect for NullMarkerDetect {
    fn detect(
        &self,
        _color: &Image,
        _intrinsics: &CameraIntrinsics,
        _dictionary: MarkerDictionary,
        _marker_size: f32,
    ) -> Vec<DetectedMarker> {
        Vec::new()
    }
}
