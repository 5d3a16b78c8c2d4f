//! Frame timing.
//!
//! One [`FrameClock`] per window; the runtime ticks it once per acquired frame.

mod frame_clock;

pub use frame_clock::{FrameClock, FrameTime};
