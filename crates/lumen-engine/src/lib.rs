//! Lumen engine crate.
//!
//! A 2D graphics manager over wgpu: device lifecycle and reset, the
//! device-tied resource pool, and the blend/opacity state machine in
//! [`gfx`], backed by the wgpu implementation in [`device`] and driven by the
//! winit loop in [`window`].

pub mod coords;
pub mod core;
pub mod device;
pub mod gfx;
pub mod logging;
pub mod render;
pub mod time;
pub mod window;
