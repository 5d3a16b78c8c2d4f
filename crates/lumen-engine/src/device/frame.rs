/// Represents a single acquired swap-chain image.
///
/// This object is short-lived and must be presented or dropped promptly. Holding
/// the surface texture prevents acquisition of subsequent frames.
pub struct GpuFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
}

impl GpuFrame {
    pub fn new(surface_texture: wgpu::SurfaceTexture) -> Self {
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            surface_texture,
            view,
        }
    }
}
