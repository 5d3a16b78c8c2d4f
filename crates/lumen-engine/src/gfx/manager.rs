//! The graphics manager: one value owning the backend, the device-tied
//! resources and the render state.
//!
//! Lifecycle is `create` → (`attempt_reset` → frames)* → `unload`. `unload`
//! also runs on drop, so resources are released on every exit path.

use anyhow::{Context, Result, bail};
use kurbo::Affine;

use crate::coords::{ColorRgba, Rect, Size};

use super::backend::{
    FrameStatus, GraphicsBackend, RenderTargetBinding, SamplerHandle, SpriteDraw, TargetSurface,
    TextureHandle,
};
use super::blend::{BlendDescriptor, BlendMode, BlendStateMachine};
use super::metrics::GraphicsMetrics;
use super::pipeline::PipelineStateCache;
use super::resources::{ManagedTexture, ResourcePool};
use super::session::{DrawSession, Stage};
use super::surface::{SurfaceDefaults, SurfaceDescriptor};
use super::target::RenderTargetRouter;
use super::transform::TransformSession;

pub struct GraphicsManager<B: GraphicsBackend> {
    backend: B,
    surface: SurfaceDescriptor,
    defaults: SurfaceDefaults,

    pool: ResourcePool,
    pipeline: PipelineStateCache,
    blend: BlendStateMachine,
    router: RenderTargetRouter,
    transform: TransformSession,
    session: DrawSession,

    device_lost: bool,
    unloaded: bool,
    resets: u64,
    skipped_resets: u64,
}

impl<B: GraphicsBackend> GraphicsManager<B> {
    /// Binds a manager to `backend`, sizing the surface descriptor from
    /// `target` and pushing the default alpha-blend pipeline.
    ///
    /// Nothing is allocated yet; call [`attempt_reset`](Self::attempt_reset)
    /// (or [`load_textures`](Self::load_textures)) before drawing.
    pub fn create<T: TargetSurface + ?Sized>(
        mut backend: B,
        target: &T,
        defaults: SurfaceDefaults,
    ) -> Self {
        let surface = SurfaceDescriptor::new(target.client_size(), &defaults);
        let mut pipeline = PipelineStateCache::default();
        pipeline.push(&mut backend);
        backend.set_blend_factor(pipeline.blend().blend_factor);

        log::debug!(
            "graphics manager created ({}x{}, {:?})",
            surface.width,
            surface.height,
            surface.color_format
        );

        Self {
            backend,
            surface,
            defaults,
            pool: ResourcePool::default(),
            pipeline,
            blend: BlendStateMachine::default(),
            router: RenderTargetRouter::default(),
            transform: TransformSession::default(),
            session: DrawSession::default(),
            device_lost: false,
            unloaded: false,
            resets: 0,
            skipped_resets: 0,
        }
    }

    // ---- device lifecycle ------------------------------------------------

    /// Creates the draw-session batch, the poison texture and the scratch
    /// texture if they are missing.
    pub fn load_textures(&mut self) -> Result<()> {
        if self.unloaded {
            bail!("graphics manager is unloaded");
        }
        self.pool
            .load(&mut self.backend, &mut self.session, &self.surface)
    }

    /// Tears the manager down and destroys the device. Idempotent.
    pub fn unload(&mut self) {
        if self.unloaded {
            return;
        }
        self.cleanup();
        self.transform.reset();
        self.backend.destroy_device();
        self.unloaded = true;
        log::info!("graphics unloaded ({})", self.metrics());
    }

    /// Re-reads the target's client size and rebuilds every device-tied
    /// resource for it.
    ///
    /// A zero-size client area (minimized window) skips the reset and leaves
    /// resources and render state untouched. `device_lost` is set either way.
    pub fn reset_device<T: TargetSurface + ?Sized>(&mut self, target: &T) -> Result<()> {
        self.device_lost = true;

        let size = target.client_size();
        if size.is_empty() {
            self.skipped_resets += 1;
            log::debug!("device reset skipped: client area is {}x{}", size.width, size.height);
            return Ok(());
        }

        self.cleanup();

        self.surface.resize(size);
        self.surface.apply_defaults(&self.defaults);
        self.backend
            .configure(&self.surface)
            .with_context(|| format!("failed to configure {}x{} surface", size.width, size.height))?;

        // Backend state does not survive a reconfigure; replay the live state.
        self.pipeline.invalidate();
        self.pipeline.push(&mut self.backend);
        self.backend.set_blend_factor(self.pipeline.blend().blend_factor);
        self.router.rebind(&mut self.backend);

        self.resets += 1;
        log::info!(
            "device reset to {}x{} ({:?}, {}x msaa)",
            self.surface.width,
            self.surface.height,
            self.surface.swap_chain_format(),
            self.surface.multisample_level
        );

        self.load_textures()
    }

    /// [`reset_device`](Self::reset_device), then clears `device_lost`.
    pub fn attempt_reset<T: TargetSurface + ?Sized>(&mut self, target: &T) -> Result<()> {
        self.reset_device(target)?;
        self.device_lost = false;
        Ok(())
    }

    /// Cheap path for a stale (not lost) device: flush the open batch and go
    /// back to drawing into the back buffer. Nothing is reallocated.
    pub fn attempt_recovery(&mut self) {
        self.session.close(&mut self.backend);
        self.router.forget();
        self.backend.bind_render_target(RenderTargetBinding::BackBuffer);
        log::debug!("device recovery: session closed, back buffer bound");
    }

    /// Takes `target` out of full-screen and resets against it. No target is
    /// a no-op.
    ///
    /// Resize-driven resets only clear the descriptor's `full_screen` flag; this
    /// is the one path that changes the window itself.
    pub fn toggle_full_screen<T: TargetSurface + ?Sized>(&mut self, target: Option<&T>) -> Result<()> {
        match target {
            Some(target) => {
                target.leave_full_screen();
                self.reset_device(target)
            }
            None => Ok(()),
        }
    }

    /// Resizes the target's client area and resets the device for it.
    ///
    /// Returns `Ok(false)` when the target already has that size.
    pub fn set_resolution<T: TargetSurface + ?Sized>(&mut self, target: &T, size: Size) -> Result<bool> {
        if target.client_size() == size {
            return Ok(false);
        }

        self.session.close(&mut self.backend);
        self.backend
            .clear(RenderTargetBinding::BackBuffer, ColorRgba::black());
        self.backend.clear_depth();

        target.request_client_size(size);
        self.reset_device(target)?;
        Ok(true)
    }

    /// Marks the device lost when the window reports a size different from
    /// the one the surface is configured for.
    pub fn notify_resized(&mut self, size: Size) -> bool {
        if size == self.surface.size() {
            return false;
        }
        log::debug!(
            "surface {}x{} is stale (window is {}x{})",
            self.surface.width,
            self.surface.height,
            size.width,
            size.height
        );
        self.device_lost = true;
        true
    }

    fn cleanup(&mut self) {
        self.pool.cleanup(&mut self.backend, &mut self.session);
        self.router.forget();
    }

    // ---- render state ------------------------------------------------------

    /// Raw, sentinel-encoded opacity: anything `>= 1` or `< 0` disables fading.
    ///
    /// Returns `false` when `value` equals the recorded opacity exactly.
    pub fn set_opacity(&mut self, value: f32) -> bool {
        let Self { backend, session, pipeline, blend, .. } = self;
        blend.set_opacity(value, Stage { backend, session, pipeline })
    }

    /// Enables or disables additive blending at rate 1.
    pub fn set_blend(&mut self, enabled: bool) -> bool {
        self.set_blend_with(enabled, 1.0, None)
    }

    /// Enables or disables additive blending.
    ///
    /// `rate` feeds the device blend factor; the recorded blend rate is reset
    /// to 1 on every effective call regardless.
    pub fn set_blend_with(
        &mut self,
        enabled: bool,
        rate: f32,
        color_src_override: Option<wgpu::BlendFactor>,
    ) -> bool {
        let Self { backend, session, pipeline, blend, router, .. } = self;
        blend.set_blend(
            enabled,
            rate,
            color_src_override,
            router,
            Stage { backend, session, pipeline },
        )
    }

    /// Routes subsequent batches to `target` (`None` is the back buffer).
    pub fn set_render_target(&mut self, target: Option<TextureHandle>) -> bool {
        let Self { backend, session, pipeline, router, .. } = self;
        router.set_render_target(target, Stage { backend, session, pipeline })
    }

    /// Applies `matrix` to the open batch and to every later open until the
    /// identity is set.
    pub fn set_transform(&mut self, matrix: Affine) -> Result<()> {
        let Self { backend, session, pipeline, transform, .. } = self;
        transform.set_transform(matrix, Stage { backend, session, pipeline })
    }

    // ---- frames & sprites --------------------------------------------------

    /// Acquires the next swap-chain image.
    ///
    /// `Ok(false)` means "don't draw this frame"; a lost surface additionally
    /// sets `device_lost`.
    pub fn begin_frame(&mut self) -> Result<bool> {
        if self.unloaded {
            bail!("graphics manager is unloaded");
        }
        match self.backend.begin_frame()? {
            FrameStatus::Ready => Ok(true),
            FrameStatus::Skipped => Ok(false),
            FrameStatus::Lost => {
                log::warn!("surface lost; device marked for reset");
                self.device_lost = true;
                Ok(false)
            }
        }
    }

    /// Flushes the open batch and presents.
    pub fn end_frame(&mut self) {
        self.session.close(&mut self.backend);
        self.backend.present();
    }

    /// Clears the current render target.
    pub fn clear(&mut self, color: ColorRgba) {
        let binding = self.router.binding();
        let params = self
            .session
            .params()
            .unwrap_or_else(|| self.transform.batch_params(self.pipeline.blend()));
        self.session.suspend(&mut self.backend, |backend| {
            backend.clear(binding, color);
            params
        });
    }

    /// Opens the draw session with the live blend descriptor and the active
    /// transform.
    pub fn begin_draw(&mut self) -> bool {
        self.pipeline.push(&mut self.backend);
        let params = self.transform.batch_params(self.pipeline.blend());
        self.session.open(&mut self.backend, &params)
    }

    pub fn end_draw(&mut self) -> bool {
        self.session.close(&mut self.backend)
    }

    /// Queues `texture` stretched over `dest`.
    pub fn draw(&mut self, texture: TextureHandle, dest: Rect, tint: ColorRgba) {
        self.draw_region(texture, dest, None, tint);
    }

    /// Queues the `source` region of `texture` stretched over `dest`.
    pub fn draw_region(
        &mut self,
        texture: TextureHandle,
        dest: Rect,
        source: Option<Rect>,
        tint: ColorRgba,
    ) {
        let Some(batch) = self.session.batch().filter(|_| self.session.is_open()) else {
            log::warn!("draw of {texture:?} outside an open draw session dropped");
            return;
        };
        if dest.is_empty() {
            return;
        }
        self.backend.draw(
            batch,
            &SpriteDraw {
                texture,
                dest,
                source,
                tint,
            },
        );
    }

    // ---- accessors -------------------------------------------------------

    #[inline]
    pub fn device_lost(&self) -> bool {
        self.device_lost
    }

    #[inline]
    pub fn is_unloaded(&self) -> bool {
        self.unloaded
    }

    /// Session batch and both pool textures exist.
    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.pool.is_loaded() && self.session.batch().is_some()
    }

    #[inline]
    pub fn surface(&self) -> &SurfaceDescriptor {
        &self.surface
    }

    #[inline]
    pub fn poison_texture(&self) -> Option<&ManagedTexture> {
        self.pool.poison()
    }

    #[inline]
    pub fn scratch_texture(&self) -> Option<&ManagedTexture> {
        self.pool.scratch()
    }

    #[inline]
    pub fn opacity(&self) -> f32 {
        self.blend.opacity()
    }

    #[inline]
    pub fn blending(&self) -> bool {
        self.blend.blending()
    }

    #[inline]
    pub fn blend_rate(&self) -> f32 {
        self.blend.blend_rate()
    }

    #[inline]
    pub fn blend_mode(&self) -> BlendMode {
        self.blend.mode()
    }

    /// Live blend descriptor.
    #[inline]
    pub fn blend_descriptor(&self) -> BlendDescriptor {
        self.pipeline.blend()
    }

    #[inline]
    pub fn render_target(&self) -> Option<TextureHandle> {
        self.router.current()
    }

    #[inline]
    pub fn session(&self) -> &DrawSession {
        &self.session
    }

    /// Non-identity transform applied to batches, if any.
    #[inline]
    pub fn transform(&self) -> Option<Affine> {
        self.transform.active()
    }

    #[inline]
    pub fn transform_sampler(&self) -> Option<SamplerHandle> {
        self.transform.sampler()
    }

    pub fn metrics(&self) -> GraphicsMetrics {
        GraphicsMetrics {
            sessions_opened: self.session.opened(),
            sessions_closed: self.session.closed(),
            pipeline_pushes: self.pipeline.pushes(),
            device_resets: self.resets,
            skipped_resets: self.skipped_resets,
            textures_created: self.pool.created(),
            textures_released: self.pool.released(),
        }
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: GraphicsBackend> Drop for GraphicsManager<B> {
    fn drop(&mut self) {
        self.unload();
    }
}
