//! Fixed-capacity ring of frame slots indexed by monotonic frame
//! counters.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::utils::CachePadded;

use crate::frame::slot::FrameSlot;

/// The staging ring. Slots are allocated once, up front, and addressed
/// as `frame_index % capacity`; backpressure comes from the slot state
/// machine refusing a write, never from reallocation or overwriting.
///
/// Two counters because segmentation completion lags capture: the
/// capture counter tracks the slot being written next, the body-mask
/// counter tracks the slot the segmentation thread will finalize next.
pub struct FrameRing {
    slots: Box<[FrameSlot]>,
    capture_index: CachePadded<AtomicU64>,
    body_mask_index: CachePadded<AtomicU64>,
}

impl FrameRing {
    pub fn new(capacity: usize, color_capacity: usize, depth_capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be nonzero");
        let slots = (0..capacity)
            .map(|_| FrameSlot::new(color_capacity, depth_capacity))
            .collect();
        Self {
            slots,
            capture_index: CachePadded::new(AtomicU64::new(0)),
            body_mask_index: CachePadded::new(AtomicU64::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, frame_index: u64) -> &FrameSlot {
        &self.slots[(frame_index % self.slots.len() as u64) as usize]
    }

    pub fn capture_index(&self) -> u64 {
        self.capture_index.load(Ordering::Acquire)
    }

    pub fn body_mask_index(&self) -> u64 {
        self.body_mask_index.load(Ordering::Acquire)
    }

    pub fn advance_capture(&self) {
        self.capture_index.fetch_add(1, Ordering::AcqRel);
    }

    pub fn advance_body_mask(&self) {
        self.body_mask_index.fetch_add(1, Ordering::AcqRel);
    }

    /// Frame index the consumer should ask for. When body masks are
    /// produced this is the segmentation counter, so the consumer is
    /// never pointed at a frame whose mask does not exist yet.
    pub fn current_frame_index(&self, body_mask_enabled: bool) -> u64 {
        if body_mask_enabled {
            self.body_mask_index()
        } else {
            self.capture_index()
        }
    }
}
