//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and Window, and wires them to the graphics
//! manager. The window is the manager's [`TargetSurface`](crate::gfx::TargetSurface).

mod runtime;
mod target;

pub use runtime::{Runtime, RuntimeConfig};
