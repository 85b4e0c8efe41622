//! Per-slot frame buffers and the state machine that hands them
//! between the capture thread, the segmentation thread, and the
//! consumer without blocking any of them.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::device::Image;

/// Image planes held by every slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// BGRA8 color image.
    Color = 0,
    /// Depth16, remapped into color-camera space.
    Depth = 1,
    /// Binary body mask (depth16 layout), remapped into color-camera space.
    BodyMask = 2,
}

pub const IMAGE_KIND_COUNT: usize = 3;

/// Where a slot currently is in its write/read lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameState {
    /// Ready to be written by the capture thread.
    Unused = 0,
    /// Color and depth are being captured and staged.
    WritingColorAndDepth = 1,
    /// Color and depth are staged; the body mask is still pending on
    /// the segmentation thread.
    WritingBodyMask = 2,
    /// Fully staged and readable. Staged slots may be overwritten on
    /// the next ring lap if the consumer never picks them up (e.g. a
    /// paused renderer while the camera keeps producing).
    Staged = 3,
    /// Being read by the consumer; released back to `Unused` afterwards.
    Reading = 4,
}

impl FrameState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => FrameState::Unused,
            1 => FrameState::WritingColorAndDepth,
            2 => FrameState::WritingBodyMask,
            3 => FrameState::Staged,
            4 => FrameState::Reading,
            _ => unreachable!("invalid frame state {raw}"),
        }
    }
}

struct ImagePlane {
    bytes: Box<[u8]>,
    stride: usize,
    /// Bytes staged on the most recent write; zero until first staged.
    len: usize,
}

/// One reusable frame: color + depth + body-mask planes plus the state
/// machine deciding who may touch them.
///
/// The state field is the only concurrently shared data; every
/// transition is a single compare-and-swap, so no transition ever
/// blocks and no lock is held across a pixel copy. Plane contents are
/// exclusively owned by whichever thread currently holds a writing or
/// reading state, and ownership moves with the Acquire/Release CAS.
///
/// `stage_image` and `copy_image` may therefore only be called by the
/// thread that performed the corresponding `begin` transition (or, for
/// the body mask, the segmentation thread the capture was handed to).
pub struct FrameSlot {
    state: AtomicU8,
    planes: [UnsafeCell<ImagePlane>; IMAGE_KIND_COUNT],
}

// Plane access is mediated by the state machine; see the type docs.
unsafe impl Sync for FrameSlot {}

impl FrameSlot {
    /// Allocate a slot with fixed plane capacities. Planes are reused
    /// for the lifetime of the ring and never reallocated per frame.
    pub fn new(color_capacity: usize, depth_capacity: usize) -> Self {
        let plane = |capacity: usize| {
            UnsafeCell::new(ImagePlane {
                bytes: vec![0u8; capacity].into_boxed_slice(),
                stride: 0,
                len: 0,
            })
        };
        Self {
            state: AtomicU8::new(FrameState::Unused as u8),
            // Body mask shares the depth16 layout in color space.
            planes: [plane(color_capacity), plane(depth_capacity), plane(depth_capacity)],
        }
    }

    pub fn state(&self) -> FrameState {
        FrameState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Claim the slot for color/depth writing. Idempotent when already
    /// claimed; valid from `Unused` and from `Staged` (an unread frame
    /// is overwritten by the next lap). Returns false while the slot is
    /// still waiting on its body mask or mid-read, which is the ring's
    /// "full" signal.
    pub fn try_begin_writing_color_and_depth(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            match FrameState::from_u8(current) {
                FrameState::WritingColorAndDepth => return true,
                FrameState::Unused | FrameState::Staged => {
                    match self.state.compare_exchange_weak(
                        current,
                        FrameState::WritingColorAndDepth as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    ) {
                        Ok(_) => return true,
                        Err(actual) => current = actual,
                    }
                }
                FrameState::WritingBodyMask | FrameState::Reading => return false,
            }
        }
    }

    /// Finish the color/depth phase. No-op if the slot already advanced
    /// to `WritingBodyMask`; the segmentation thread will stage it.
    pub fn end_writing_color_and_depth(&self) {
        let _ = self.state.compare_exchange(
            FrameState::WritingColorAndDepth as u8,
            FrameState::Staged as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Park the slot in `WritingBodyMask` so it cannot reach `Staged`
    /// until the mask arrives. Must be called before handing the
    /// capture to the segmentation stage.
    pub fn begin_writing_body_mask(&self) {
        let _ = self.state.compare_exchange(
            FrameState::WritingColorAndDepth as u8,
            FrameState::WritingBodyMask as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Stage the slot once the body mask is written (or known absent).
    pub fn end_writing_body_mask(&self) {
        let _ = self.state.compare_exchange(
            FrameState::WritingBodyMask as u8,
            FrameState::Staged as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Claim the slot for reading. Fails (without blocking or changing
    /// state) while the slot is being written or already being read;
    /// the consumer keeps its previous output for this tick.
    pub fn try_begin_reading(&self) -> bool {
        self.state
            .compare_exchange(
                FrameState::Staged as u8,
                FrameState::Reading as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Release a slot claimed by [`try_begin_reading`](Self::try_begin_reading).
    pub fn end_reading(&self) {
        let _ = self.state.compare_exchange(
            FrameState::Reading as u8,
            FrameState::Unused as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Copy an image into the slot's plane. Only legal for the current
    /// write owner; ignored (with a log) in any non-writing state so a
    /// late writer cannot corrupt a staged or in-read slot.
    pub fn stage_image(&self, kind: ImageKind, image: &Image) {
        match self.state() {
            FrameState::WritingColorAndDepth | FrameState::WritingBodyMask => {}
            state => {
                tracing::warn!(?kind, ?state, "dropping stage_image on non-writing slot");
                return;
            }
        }

        // Owner check passed: the state machine guarantees no other
        // thread is touching this plane.
        let plane = unsafe { &mut *self.planes[kind as usize].get() };
        let len = image.size_bytes().min(image.data.len()).min(plane.bytes.len());
        plane.bytes[..len].copy_from_slice(&image.data[..len]);
        plane.stride = image.stride as usize;
        plane.len = len;
    }

    /// Copy a staged plane into `dest`, returning `(bytes_copied,
    /// stride)`. Only legal while holding the `Reading` state.
    pub fn copy_image(&self, kind: ImageKind, dest: &mut [u8]) -> (usize, usize) {
        if self.state() != FrameState::Reading {
            tracing::warn!(?kind, "copy_image called outside the Reading state");
            return (0, 0);
        }

        let plane = unsafe { &*self.planes[kind as usize].get() };
        let len = plane.len.min(dest.len());
        dest[..len].copy_from_slice(&plane.bytes[..len]);
        (len, plane.stride)
    }
}
