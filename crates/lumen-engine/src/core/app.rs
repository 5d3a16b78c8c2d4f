use anyhow::Result;
use winit::event::WindowEvent;

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract driven by [`crate::window::Runtime`].
pub trait App {
    /// Called for every window event before the runtime handles it.
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let _ = event;
        AppControl::Continue
    }

    /// Called once per acquired frame, between `begin_frame` and `end_frame`.
    ///
    /// Returning an error stops the runtime; `run` hands the error back.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> Result<AppControl>;
}
