//! Frame staging pipeline for a depth camera.
//!
//! Two producers, one slow and one fast, converge on a fixed ring of
//! reusable frame slots: the capture thread stages color and depth,
//! the segmentation thread finalizes body masks later, and a consumer
//! reads the newest completed frame without ever blocking either
//! producer. See [`pipeline::CameraPipeline`] for the entry point.

pub mod device;
pub mod error;
pub mod frame;
pub mod markers;
pub mod pipeline;

use serde::{Deserialize, Serialize};

use crate::device::DepthMode;

pub use crate::error::{CameraError, PipelineError, SegmentationError};
pub use crate::markers::{DetectedMarker, MarkerDictionary};
pub use crate::pipeline::CameraPipeline;

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Color image dimensions requested from the device.
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub depth_mode: DepthMode,
    pub capture_depth: bool,
    /// Requires `capture_depth` and a body tracker; disabled with a
    /// warning otherwise.
    pub capture_body_mask: bool,
    /// Wait bound for each capture; `None` waits forever.
    pub capture_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Slots in the staging ring. Must cover the worst-case slack
    /// between capture, segmentation, and the consumer.
    pub ring_capacity: usize,
    /// Sleep before retrying a saturated ring slot. Zero busy-yields.
    pub saturation_backoff_ms: u64,
    /// Wait bound for each body-tracker result poll.
    pub segmentation_poll_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                width: 1920,
                height: 1080,
                fps: 30,
                depth_mode: DepthMode::NarrowViewUnbinned,
                capture_depth: true,
                capture_body_mask: false,
                capture_timeout_ms: None,
            },
            pipeline: PipelineConfig {
                ring_capacity: 20,
                saturation_backoff_ms: 1,
                segmentation_poll_ms: 20,
            },
        }
    }
}
