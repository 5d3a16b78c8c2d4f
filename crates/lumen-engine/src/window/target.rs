use winit::window::Window;

use crate::coords::Size;
use crate::gfx::TargetSurface;

impl TargetSurface for Window {
    fn client_size(&self) -> Size {
        self.inner_size().into()
    }

    fn request_client_size(&self, size: Size) {
        let requested: winit::dpi::PhysicalSize<u32> = size.into();
        if let Some(applied) = self.request_inner_size(requested) {
            log::debug!("client size applied immediately: {}x{}", applied.width, applied.height);
        }
    }

    fn leave_full_screen(&self) {
        if self.fullscreen().is_some() {
            self.set_fullscreen(None);
        }
    }
}
