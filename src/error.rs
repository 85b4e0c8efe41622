//! Error types for the capture pipeline

use thiserror::Error;

/// Errors reported by a [`DepthCamera`](crate::device::DepthCamera)
/// collaborator.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("failed to open device: {0}")]
    Open(String),

    #[error("failed to start cameras: {0}")]
    Start(String),

    #[error("failed to read camera calibration: {0}")]
    Calibration(String),

    /// The camera did not produce a capture within the configured wait.
    /// Fatal for the capture loop.
    #[error("timed out waiting for capture")]
    Timeout,

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("depth-to-color remap failed: {0}")]
    Remap(String),

    #[error("camera is not started")]
    NotStarted,
}

/// Errors reported by a [`BodyTracker`](crate::device::BodyTracker)
/// collaborator. All of these are recoverable: the affected frame is
/// staged without a body mask.
#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("tracker queue is full")]
    QueueFull,

    #[error("tracker has shut down")]
    Stopped,
}

/// Errors surfaced by pipeline construction. Once the pipeline is
/// running, worker-side failures are logged and observed as a stalled
/// frame index rather than propagated to the consumer.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("failed to spawn {name} thread")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}
