//! Capture worker: the fast producer feeding color and depth into the
//! ring.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, warn};

use crate::device::{BodyTracker, DepthCamera, MarkerDetect};
use crate::frame::ImageKind;
use crate::pipeline::PipelineShared;

/// Runs until stop is requested or the camera fails.
///
/// A camera timeout or failure is fatal: the loop exits and the
/// pipeline stalls with its last staged frames still readable. The
/// consumer observes this as a frame index that stops advancing.
pub(crate) fn run_capture_loop(
    shared: Arc<PipelineShared>,
    camera: Arc<dyn DepthCamera>,
    tracker: Option<Arc<dyn BodyTracker>>,
    detector: Arc<dyn MarkerDetect>,
) {
    debug!("capture loop starting");

    while !shared.stop.load(Ordering::Acquire) {
        let frame_index = shared.ring.capture_index();
        let slot = shared.ring.slot(frame_index);

        if !slot.try_begin_writing_color_and_depth() {
            // Either the reader is holding this slot or its body mask
            // is still pending a full lap later. Stall on the same
            // index rather than overwrite or skip.
            warn!(frame_index, "frame ring saturated, retrying");
            if shared.saturation_backoff.is_zero() {
                thread::yield_now();
            } else {
                thread::sleep(shared.saturation_backoff);
            }
            continue;
        }

        let capture = match camera.next_capture(shared.capture_timeout) {
            Ok(capture) => capture,
            Err(err) => {
                error!(%err, "camera capture failed, stopping capture loop");
                return;
            }
        };

        slot.stage_image(ImageKind::Color, &capture.color);
        shared
            .markers
            .update(detector.as_ref(), &capture.color, &shared.calibration.color);

        if shared.capture_depth {
            if let Some(depth) = capture.depth.as_ref() {
                match camera.remap_depth_to_color(depth) {
                    Ok(remapped) => {
                        slot.stage_image(ImageKind::Depth, &remapped);

                        if shared.capture_body_mask {
                            if let Some(tracker) = tracker.as_deref() {
                                // Park the slot before the hand-off so it
                                // cannot become visible without its mask.
                                slot.begin_writing_body_mask();
                                if let Err(err) = tracker.enqueue(&capture) {
                                    warn!(
                                        %err,
                                        frame_index,
                                        "body tracker enqueue failed, staging without a mask"
                                    );
                                    slot.end_writing_body_mask();
                                }
                            }
                        }
                    }
                    Err(err) => {
                        warn!(%err, frame_index, "depth remap failed, staging without depth");
                    }
                }
            }
        }

        // No-op if the slot already advanced to WritingBodyMask; the
        // segmentation thread will stage it.
        slot.end_writing_color_and_depth();
        shared.ring.advance_capture();
    }

    debug!("capture loop stopped");
}
