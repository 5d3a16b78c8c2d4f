//! Small value types shared by the graphics manager and its backends.
//!
//! Conventions:
//! - sizes are physical pixels (`u32`)
//! - draw rectangles are pixels in the bound target, origin top-left, +Y down

mod color;
mod rect;
mod size;

pub use color::ColorRgba;
pub use rect::Rect;
pub use size::Size;
