use crate::gfx::SurfaceDefaults;

/// Initialization parameters for the GPU layer.
///
/// `surface` holds the presentation settings the graphics manager re-applies
/// on every device reset.
#[derive(Debug, Clone)]
pub struct GraphicsConfig {
    pub power_preference: wgpu::PowerPreference,

    /// Optional alpha mode preference for the surface.
    ///
    /// If provided but unsupported on the current surface, a supported mode is selected.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    /// Required wgpu features.
    ///
    /// Favor an empty set for portability unless a feature is strictly necessary.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,

    /// Desired maximum frame latency for the surface. A hint only.
    pub desired_maximum_frame_latency: u32,

    pub surface: SurfaceDefaults,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            alpha_mode: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            desired_maximum_frame_latency: 2,
            surface: SurfaceDefaults::default(),
        }
    }
}
