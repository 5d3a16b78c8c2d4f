use winit::dpi::PhysicalSize;

/// Client-area or texture size in physical pixels.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero (e.g. a minimized window).
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<PhysicalSize<u32>> for Size {
    fn from(s: PhysicalSize<u32>) -> Self {
        Self::new(s.width, s.height)
    }
}

impl From<Size> for PhysicalSize<u32> {
    fn from(s: Size) -> Self {
        PhysicalSize::new(s.width, s.height)
    }
}
