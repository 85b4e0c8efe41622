pub mod ring;
pub mod slot;

pub use ring::FrameRing;
pub use slot::{FrameSlot, FrameState, ImageKind};
