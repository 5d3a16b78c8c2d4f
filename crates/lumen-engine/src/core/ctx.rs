use anyhow::Result;
use winit::window::Window;

use crate::coords::Size;
use crate::device::Gpu;
use crate::gfx::GraphicsManager;
use crate::time::FrameTime;

/// Per-frame context passed to [`App::on_frame`](super::App::on_frame).
///
/// Lifetimes:
/// - `'a` is the duration of the callback invocation
/// - `'w` is the window-borrow lifetime carried by `Gpu<'w>`
pub struct FrameCtx<'a, 'w> {
    pub window: &'a Window,
    pub gfx: &'a mut GraphicsManager<Gpu<'w>>,
    pub time: FrameTime,
}

impl FrameCtx<'_, '_> {
    /// Client area in physical pixels.
    pub fn client_size(&self) -> Size {
        self.window.inner_size().into()
    }

    /// Leaves full-screen and rebuilds the surface for the window.
    pub fn toggle_full_screen(&mut self) -> Result<()> {
        self.gfx.toggle_full_screen(Some(self.window))
    }

    /// Resizes the window's client area and resets the device for it.
    pub fn set_resolution(&mut self, size: Size) -> Result<bool> {
        self.gfx.set_resolution(self.window, size)
    }
}
