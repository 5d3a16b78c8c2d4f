//! Seams between the graphics manager and its collaborators.
//!
//! The manager never touches wgpu objects directly. It programs against
//! [`GraphicsBackend`] (device, presenter and command stream) and
//! [`TargetSurface`] (the window whose client area is presented).

use anyhow::Result;
use kurbo::Affine;

use crate::coords::{ColorRgba, Rect, Size};

use super::blend::BlendDescriptor;
use super::pipeline::PipelineState;
use super::surface::SurfaceDescriptor;

macro_rules! handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            #[inline]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }
    };
}

handle!(
    /// Backend-owned texture. Equality is identity.
    TextureHandle
);
handle!(
    /// Backend-owned sampler.
    SamplerHandle
);
handle!(
    /// Backend-owned sprite batch (the Draw Session's GPU side).
    BatchHandle
);

/// Texture allocation request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

/// Sampler request. Only the knobs the manager needs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SamplerDesc {
    pub label: &'static str,
    pub max_anisotropy: u16,
}

impl SamplerDesc {
    pub const fn anisotropic(label: &'static str, max_anisotropy: u16) -> Self {
        Self { label, max_anisotropy }
    }
}

/// Parameters snapshotted by the backend when a batch is opened.
///
/// Backends must not observe pipeline changes made after `begin_batch`; that is
/// why every state change closes and reopens the session.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BatchParams {
    pub blend: BlendDescriptor,
    pub transform: Option<Affine>,
    pub sampler: Option<SamplerHandle>,
}

impl BatchParams {
    /// Untransformed batch using the default sampler.
    pub const fn plain(blend: BlendDescriptor) -> Self {
        Self {
            blend,
            transform: None,
            sampler: None,
        }
    }
}

/// One queued sprite.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SpriteDraw {
    pub texture: TextureHandle,
    /// Destination in target pixels.
    pub dest: Rect,
    /// Source region in texture pixels; `None` samples the whole texture.
    pub source: Option<Rect>,
    pub tint: ColorRgba,
}

/// Color attachment for subsequent batches.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum RenderTargetBinding {
    #[default]
    BackBuffer,
    Texture(TextureHandle),
}

impl From<Option<TextureHandle>> for RenderTargetBinding {
    fn from(target: Option<TextureHandle>) -> Self {
        target.map_or(Self::BackBuffer, Self::Texture)
    }
}

/// Outcome of acquiring the next swap-chain image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameStatus {
    Ready,
    /// Transient failure; skip this frame.
    Skipped,
    /// Surface is lost or outdated; the device must be reset.
    Lost,
}

/// Device, presenter and command stream consumed by the graphics manager.
///
/// Fallible methods report fatal device-layer failures; the manager does not
/// retry them. Release methods are infallible and must tolerate handles that
/// were already released.
pub trait GraphicsBackend {
    /// Applies a (possibly changed) presentation configuration.
    fn configure(&mut self, surface: &SurfaceDescriptor) -> Result<()>;

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle>;
    /// Uploads tightly packed RGBA8 rows covering the whole texture.
    fn write_texture(&mut self, texture: TextureHandle, rgba: &[u8]) -> Result<()>;
    fn is_texture_released(&self, texture: TextureHandle) -> bool;
    fn release_texture(&mut self, texture: TextureHandle);

    fn create_batch(&mut self) -> Result<BatchHandle>;
    fn is_batch_released(&self, batch: BatchHandle) -> bool;
    fn release_batch(&mut self, batch: BatchHandle);
    fn begin_batch(&mut self, batch: BatchHandle, params: &BatchParams);
    fn draw(&mut self, batch: BatchHandle, sprite: &SpriteDraw);
    /// Flushes queued sprites to the bound render target.
    fn end_batch(&mut self, batch: BatchHandle);

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle>;

    fn apply_pipeline_state(&mut self, state: &PipelineState);
    fn set_blend_factor(&mut self, factor: ColorRgba);
    /// Binds `target` together with the shared depth-stencil buffer.
    fn bind_render_target(&mut self, target: RenderTargetBinding);
    fn clear(&mut self, target: RenderTargetBinding, color: ColorRgba);
    fn clear_depth(&mut self);

    fn begin_frame(&mut self) -> Result<FrameStatus>;
    fn present(&mut self);

    /// Destroys the device. Every later call must be a no-op or an error.
    fn destroy_device(&mut self);
}

/// Window-side collaborator: the presented client area.
pub trait TargetSurface {
    fn client_size(&self) -> Size;

    /// Requests a new client size. Platforms may apply it asynchronously.
    fn request_client_size(&self, size: Size);

    fn leave_full_screen(&self);
}
