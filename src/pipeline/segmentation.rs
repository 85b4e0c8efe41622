//! Segmentation worker: the slow producer finalizing body masks.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::device::{BodyTracker, DepthCamera, Image, BODY_INDEX_BACKGROUND};
use crate::frame::ImageKind;
use crate::pipeline::PipelineShared;

/// Foreground value written into the pre-remap mask. Large enough that
/// the depth-to-color remap's interpolation cannot round it to zero.
pub(crate) const BODY_MASK_SENTINEL: u16 = 1000;

/// Runs until stop is requested. Each popped body-index map finalizes
/// the slot at the body-mask counter; a pop timeout retries without
/// advancing anything.
pub(crate) fn run_segmentation_loop(
    shared: Arc<PipelineShared>,
    camera: Arc<dyn DepthCamera>,
    tracker: Arc<dyn BodyTracker>,
) {
    debug!("segmentation loop starting");

    while !shared.stop.load(Ordering::Acquire) {
        let Some(body_index) = tracker.pop_result(shared.segmentation_poll) else {
            continue;
        };

        let frame_index = shared.ring.body_mask_index();
        let slot = shared.ring.slot(frame_index);

        let mask = build_body_mask(&body_index);
        match camera.remap_depth_to_color(&mask) {
            Ok(remapped) => {
                slot.stage_image(ImageKind::BodyMask, &binarize_mask(&remapped));
            }
            Err(err) => {
                // The frame goes out mask-less; never leave the slot
                // parked in WritingBodyMask.
                warn!(%err, frame_index, "body mask remap failed, staging without a mask");
            }
        }

        slot.end_writing_body_mask();
        shared.ring.advance_body_mask();
    }

    debug!("segmentation loop stopped");
}

/// Expand a u8 body-index map into a depth16 mask in depth-camera
/// space: sentinel where any body was recognized, zero elsewhere.
/// Output rows are packed (stride = width * 2).
fn build_body_mask(body_index: &Image) -> Image {
    let width = body_index.width as usize;
    let height = body_index.height as usize;
    let stride = body_index.stride as usize;

    let mut out = vec![0u8; width * height * 2];
    for y in 0..height {
        let row = &body_index.data[y * stride..y * stride + width];
        for (x, &id) in row.iter().enumerate() {
            if id != BODY_INDEX_BACKGROUND {
                let [lo, hi] = BODY_MASK_SENTINEL.to_le_bytes();
                let offset = (y * width + x) * 2;
                out[offset] = lo;
                out[offset + 1] = hi;
            }
        }
    }

    Image::from_vec(out, body_index.width, body_index.height, body_index.width * 2)
}

/// Collapse the remapped depth16 mask to 0/1 per pixel: interpolation
/// at body edges leaves arbitrary nonzero values behind.
fn binarize_mask(mask: &Image) -> Image {
    let mut out = mask.data.to_vec();
    for px in out.chunks_exact_mut(2) {
        if px[0] != 0 || px[1] != 0 {
            px[0] = 1;
            px[1] = 0;
        }
    }
    Image::from_vec(out, mask.width, mask.height, mask.stride)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_mask_marks_foreground_with_sentinel() {
        // 3x2 body-index map with stride padding; body ids 0 and 2.
        let data = vec![
            0, BODY_INDEX_BACKGROUND, 2, 0xEE, // row 0 + pad byte
            BODY_INDEX_BACKGROUND, BODY_INDEX_BACKGROUND, 0, 0xEE, // row 1 + pad
        ];
        let body_index = Image::from_vec(data, 3, 2, 4);

        let mask = build_body_mask(&body_index);
        assert_eq!(mask.stride, 6);

        let px = |i: usize| u16::from_le_bytes([mask.data[2 * i], mask.data[2 * i + 1]]);
        assert_eq!(px(0), BODY_MASK_SENTINEL);
        assert_eq!(px(1), 0);
        assert_eq!(px(2), BODY_MASK_SENTINEL);
        assert_eq!(px(3), 0);
        assert_eq!(px(4), 0);
        assert_eq!(px(5), BODY_MASK_SENTINEL);
    }

    #[test]
    fn binarize_collapses_interpolated_values() {
        let mut data = Vec::new();
        for value in [0u16, 1, 499, 1000] {
            data.extend_from_slice(&value.to_le_bytes());
        }
        let mask = Image::from_vec(data, 4, 1, 8);

        let binary = binarize_mask(&mask);
        let px = |i: usize| u16::from_le_bytes([binary.data[2 * i], binary.data[2 * i + 1]]);
        assert_eq!(px(0), 0);
        assert_eq!(px(1), 1);
        assert_eq!(px(2), 1);
        assert_eq!(px(3), 1);
    }
}
