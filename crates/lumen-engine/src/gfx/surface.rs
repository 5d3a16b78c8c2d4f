use crate::coords::Size;

/// How back-buffer values are interpreted by the presenter.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum ColorSpace {
    /// Values are written as-is (non-sRGB swap-chain format).
    #[default]
    Gamma,
    /// Values are linear and encoded to sRGB on store.
    Linear,
}

impl ColorSpace {
    /// Picks the sRGB or non-sRGB variant of `format` for this color space.
    pub fn apply(self, format: wgpu::TextureFormat) -> wgpu::TextureFormat {
        match self {
            ColorSpace::Gamma => format.remove_srgb_suffix(),
            ColorSpace::Linear => format.add_srgb_suffix(),
        }
    }
}

/// Presentation settings forced on every device reset.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SurfaceDefaults {
    pub color_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
    pub color_space: ColorSpace,

    /// Requested MSAA sample count. Backends clamp it to what the device supports.
    pub multisample_level: u32,

    /// Immediate by default: the frame loop is not vsync-bound.
    pub present_mode: wgpu::PresentMode,
}

impl Default for SurfaceDefaults {
    fn default() -> Self {
        Self {
            color_format: wgpu::TextureFormat::Rgba8Unorm,
            depth_format: wgpu::TextureFormat::Depth16Unorm,
            color_space: ColorSpace::Gamma,
            multisample_level: 2,
            present_mode: wgpu::PresentMode::Immediate,
        }
    }
}

/// Presentation parameters derived from the window/target.
///
/// Only the device lifecycle controller mutates this; the resource pool and the
/// backend read it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SurfaceDescriptor {
    pub width: u32,
    pub height: u32,
    pub color_format: wgpu::TextureFormat,
    pub depth_format: wgpu::TextureFormat,
    pub multisample_level: u32,
    pub color_space: ColorSpace,
    pub present_mode: wgpu::PresentMode,
    pub full_screen: bool,
}

impl SurfaceDescriptor {
    pub fn new(size: Size, defaults: &SurfaceDefaults) -> Self {
        let mut desc = Self {
            width: size.width,
            height: size.height,
            color_format: defaults.color_format,
            depth_format: defaults.depth_format,
            multisample_level: defaults.multisample_level,
            color_space: defaults.color_space,
            present_mode: defaults.present_mode,
            full_screen: false,
        };
        desc.apply_defaults(defaults);
        desc
    }

    #[inline]
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Swap-chain format after applying the color space.
    #[inline]
    pub fn swap_chain_format(&self) -> wgpu::TextureFormat {
        self.color_space.apply(self.color_format)
    }

    pub(crate) fn resize(&mut self, size: Size) {
        self.width = size.width;
        self.height = size.height;
    }

    /// Windowed, fixed formats, fixed multisample level.
    pub(crate) fn apply_defaults(&mut self, defaults: &SurfaceDefaults) {
        self.full_screen = false;
        self.color_space = defaults.color_space;
        self.color_format = defaults.color_format;
        self.depth_format = defaults.depth_format;
        self.multisample_level = defaults.multisample_level.max(1);
        self.present_mode = defaults.present_mode;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gamma_strips_srgb_and_linear_adds_it() {
        assert_eq!(
            ColorSpace::Gamma.apply(wgpu::TextureFormat::Rgba8UnormSrgb),
            wgpu::TextureFormat::Rgba8Unorm
        );
        assert_eq!(
            ColorSpace::Linear.apply(wgpu::TextureFormat::Bgra8Unorm),
            wgpu::TextureFormat::Bgra8UnormSrgb
        );
    }

    #[test]
    fn defaults_force_windowed_mode_and_fixed_formats() {
        let defaults = SurfaceDefaults::default();
        let mut desc = SurfaceDescriptor::new(Size::new(800, 600), &defaults);
        desc.full_screen = true;
        desc.color_format = wgpu::TextureFormat::Bgra8Unorm;
        desc.multisample_level = 8;

        desc.apply_defaults(&defaults);

        assert!(!desc.full_screen);
        assert_eq!(desc.color_format, wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(desc.depth_format, wgpu::TextureFormat::Depth16Unorm);
        assert_eq!(desc.multisample_level, 2);
        assert_eq!(desc.size(), Size::new(800, 600));
    }
}
