use std::collections::HashMap;

use anyhow::{Context, Result, anyhow, bail, ensure};
use kurbo::Affine;
use winit::window::Window;

use crate::coords::{ColorRgba, Size};
use crate::gfx::{
    BatchHandle, BatchParams, FrameStatus, GraphicsBackend, PipelineState, RenderTargetBinding,
    SamplerDesc, SamplerHandle, SpriteDraw, SurfaceDescriptor, TextureDesc, TextureHandle,
};
use crate::render::{RenderCtx, RenderTarget, SpritePass, SpriteRenderer, SpriteRun, batch_sprites};

use super::{GpuFrame, GraphicsConfig, SurfaceErrorAction, surface};

/// wgpu implementation of [`GraphicsBackend`].
///
/// Owns the adapter/device/queue, the window surface, every texture and
/// sampler handed out by handle, the shared depth buffer and the MSAA color
/// targets. Commands are recorded into one encoder and submitted on
/// [`present`](GraphicsBackend::present).
pub struct Gpu<'w> {
    /// Surface bound to the window.
    ///
    /// Surface lifetime is tied to the window; the window must outlive the `Gpu`.
    surface: wgpu::Surface<'w>,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,

    /// Active surface configuration.
    config: wgpu::SurfaceConfiguration,
    alpha_request: Option<wgpu::CompositeAlphaMode>,
    sample_count: u32,

    frame: Option<GpuFrame>,
    encoder: Option<wgpu::CommandEncoder>,
    /// Multisampled back buffer, resolved into the swap-chain image.
    msaa: Option<wgpu::TextureView>,
    depth: Option<DepthBuffer>,

    textures: HashMap<TextureHandle, GpuTexture>,
    samplers: HashMap<SamplerHandle, wgpu::Sampler>,
    batches: HashMap<BatchHandle, Batch>,
    next_handle: u64,

    target: RenderTargetBinding,
    state: PipelineState,
    blend_factor: ColorRgba,

    sprites: SpriteRenderer,
    destroyed: bool,
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    /// Multisampled companion for render-target textures.
    msaa: Option<wgpu::TextureView>,
    size: Size,
    format: wgpu::TextureFormat,
}

struct DepthBuffer {
    view: wgpu::TextureView,
    size: Size,
    format: wgpu::TextureFormat,
}

/// Batch state captured at `begin_batch`.
struct OpenBatch {
    params: BatchParams,
    target: RenderTargetBinding,
    state: PipelineState,
    blend_factor: ColorRgba,
    sprites: Vec<SpriteDraw>,
}

#[derive(Default)]
struct Batch {
    open: Option<OpenBatch>,
}

/// Color attachment views resolved from a [`RenderTargetBinding`].
struct TargetViews<'a> {
    color: &'a wgpu::TextureView,
    resolve: Option<&'a wgpu::TextureView>,
    size: Size,
    format: wgpu::TextureFormat,
    sample_count: u32,
}

impl<'w> Gpu<'w> {
    /// Creates a GPU context bound to a window.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(window: &'w Window, config: &GraphicsConfig) -> Result<Self> {
        let size = window.inner_size();
        ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("lumen device"),
                required_features: config.required_features,
                required_limits: config.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let caps = surface.get_capabilities(&adapter);
        let defaults = &config.surface;
        let format = surface::choose_surface_format(
            &caps.formats,
            defaults.color_space.apply(defaults.color_format),
        )
        .context("no supported surface formats")?;

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: surface::choose_present_mode(&caps.present_modes, defaults.present_mode),
            alpha_mode: surface::choose_alpha_mode(&caps.alpha_modes, config.alpha_mode),
            view_formats: vec![],
            desired_maximum_frame_latency: config.desired_maximum_frame_latency,
        };

        surface.configure(&device, &surface_config);

        let info = adapter.get_info();
        log::info!("gpu: {} ({:?})", info.name, info.backend);

        Ok(Self {
            surface,
            adapter,
            device,
            queue,
            config: surface_config,
            alpha_request: config.alpha_mode,
            sample_count: 1,
            frame: None,
            encoder: None,
            msaa: None,
            depth: None,
            textures: HashMap::new(),
            samplers: HashMap::new(),
            batches: HashMap::new(),
            next_handle: 1,
            target: RenderTargetBinding::BackBuffer,
            state: PipelineState::default(),
            blend_factor: ColorRgba::white(),
            sprites: SpriteRenderer::new(),
            destroyed: false,
        })
    }

    /// Returns the active surface format.
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// MSAA sample count actually in use.
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Sprite pipeline variants built so far.
    pub fn pipeline_count(&self) -> usize {
        self.sprites.pipeline_count()
    }

    fn next_raw(&mut self) -> u64 {
        let raw = self.next_handle;
        self.next_handle += 1;
        raw
    }

    fn supports_samples(&self, format: wgpu::TextureFormat, count: u32) -> bool {
        self.adapter
            .get_texture_format_features(format)
            .flags
            .sample_count_supported(count)
    }

    fn create_msaa_view(&self, label: &str, size: Size, format: wgpu::TextureFormat) -> wgpu::TextureView {
        self.device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: size.width,
                    height: size.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: self.sample_count,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default())
    }

    fn create_depth_buffer(&self, size: Size, format: wgpu::TextureFormat) -> DepthBuffer {
        let view = self
            .device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("lumen depth buffer"),
                size: wgpu::Extent3d {
                    width: size.width,
                    height: size.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: self.sample_count,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());
        DepthBuffer { view, size, format }
    }

    fn take_encoder(&mut self) -> wgpu::CommandEncoder {
        match self.encoder.take() {
            Some(encoder) => encoder,
            None => self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("lumen frame encoder"),
                }),
        }
    }

    /// Submits recorded work. The acquired frame (if any) is presented or dropped.
    fn finish_frame(&mut self, present: bool) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        if let Some(frame) = self.frame.take() {
            if present {
                frame.surface_texture.present();
            }
        }
    }

    fn flush(&mut self, batch: OpenBatch) {
        let sprites = batch_sprites(&batch.sprites, |h| {
            self.textures.get(&h).map(|t| (t.size.width, t.size.height))
        });
        if sprites.skipped > 0 {
            log::warn!("{} sprite(s) reference released textures; skipped", sprites.skipped);
        }
        if sprites.instances.is_empty() {
            return;
        }

        let mut encoder = self.take_encoder();

        let views = resolve_target(
            batch.target,
            self.frame.as_ref(),
            self.msaa.as_ref(),
            &self.textures,
            &self.config,
            self.sample_count,
        );
        match views {
            Some(views) => {
                let runs: Vec<SpriteRun<'_>> = sprites
                    .runs
                    .iter()
                    .filter_map(|(handle, range)| {
                        self.textures.get(handle).map(|t| SpriteRun {
                            view: &t.view,
                            instances: range.clone(),
                        })
                    })
                    .collect();
                let sampler = batch.params.sampler.and_then(|s| self.samplers.get(&s));
                let pass = SpritePass {
                    instances: &sprites.instances,
                    runs: &runs,
                    sampler,
                    blend: batch.params.blend,
                    state: batch.state,
                    transform: batch.params.transform.unwrap_or(Affine::IDENTITY),
                    blend_constant: batch.blend_factor,
                };

                let depth = self.depth.as_ref().filter(|d| d.size == views.size);
                let ctx = RenderCtx::new(&self.device, &self.queue, views.size);
                let mut target = RenderTarget {
                    encoder: &mut encoder,
                    color_view: views.color,
                    resolve_view: views.resolve,
                    depth_view: depth.map(|d| &d.view),
                    format: views.format,
                    depth_format: depth.map(|d| d.format),
                    sample_count: views.sample_count,
                };
                self.sprites.render(&ctx, &mut target, &pass);
            }
            None => log::warn!(
                "{:?} has no drawable surface; {} sprite(s) dropped",
                batch.target,
                sprites.instances.len()
            ),
        }

        self.encoder = Some(encoder);
    }
}

fn resolve_target<'a>(
    binding: RenderTargetBinding,
    frame: Option<&'a GpuFrame>,
    msaa: Option<&'a wgpu::TextureView>,
    textures: &'a HashMap<TextureHandle, GpuTexture>,
    config: &wgpu::SurfaceConfiguration,
    sample_count: u32,
) -> Option<TargetViews<'a>> {
    match binding {
        RenderTargetBinding::BackBuffer => {
            let frame = frame?;
            let (color, resolve, sample_count) = match msaa {
                Some(msaa) => (msaa, Some(&frame.view), sample_count),
                None => (&frame.view, None, 1),
            };
            Some(TargetViews {
                color,
                resolve,
                size: Size::new(config.width, config.height),
                format: config.format,
                sample_count,
            })
        }
        RenderTargetBinding::Texture(handle) => {
            let texture = textures.get(&handle)?;
            let (color, resolve, sample_count) = match texture.msaa.as_ref() {
                Some(msaa) => (msaa, Some(&texture.view), sample_count),
                None => (&texture.view, None, 1),
            };
            Some(TargetViews {
                color,
                resolve,
                size: texture.size,
                format: texture.format,
                sample_count,
            })
        }
    }
}

impl GraphicsBackend for Gpu<'_> {
    fn configure(&mut self, desc: &SurfaceDescriptor) -> Result<()> {
        ensure!(!self.destroyed, "device destroyed");
        ensure!(desc.width > 0 && desc.height > 0, "surface has zero size");
        let max = self.device.limits().max_texture_dimension_2d;
        ensure!(
            desc.width <= max && desc.height <= max,
            "{}x{} exceeds the device limit of {max}",
            desc.width,
            desc.height
        );

        // Nothing recorded for the old configuration may outlive it.
        self.finish_frame(false);

        let caps = self.surface.get_capabilities(&self.adapter);
        let format = surface::choose_surface_format(&caps.formats, desc.swap_chain_format())
            .context("no supported surface formats")?;
        if format != desc.swap_chain_format() {
            log::warn!("{:?} unsupported by the surface; using {format:?}", desc.swap_chain_format());
        }

        self.config.format = format;
        self.config.width = desc.width;
        self.config.height = desc.height;
        self.config.present_mode = surface::choose_present_mode(&caps.present_modes, desc.present_mode);
        self.config.alpha_mode = surface::choose_alpha_mode(&caps.alpha_modes, self.alpha_request);
        self.surface.configure(&self.device, &self.config);

        self.sample_count = surface::choose_sample_count(desc.multisample_level, |n| {
            self.supports_samples(format, n)
                && self.supports_samples(desc.color_format, n)
                && self.supports_samples(desc.depth_format, n)
        });
        if self.sample_count != desc.multisample_level {
            log::debug!(
                "msaa {}x unavailable; using {}x",
                desc.multisample_level,
                self.sample_count
            );
        }

        let size = desc.size();
        self.msaa = (self.sample_count > 1).then(|| self.create_msaa_view("lumen msaa back buffer", size, format));
        self.depth = Some(self.create_depth_buffer(size, desc.depth_format));

        log::info!(
            "surface configured: {}x{} {:?} {:?} {}x msaa",
            self.config.width,
            self.config.height,
            self.config.format,
            self.config.present_mode,
            self.sample_count
        );
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle> {
        ensure!(!self.destroyed, "device destroyed");
        ensure!(desc.width > 0 && desc.height > 0, "{} has zero size", desc.label);
        let max = self.device.limits().max_texture_dimension_2d;
        ensure!(
            desc.width <= max && desc.height <= max,
            "{} ({}x{}) exceeds the device limit of {max}",
            desc.label,
            desc.width,
            desc.height
        );

        let size = Size::new(desc.width, desc.height);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let msaa = (desc.usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
            && self.sample_count > 1
            && self.supports_samples(desc.format, self.sample_count))
        .then(|| self.create_msaa_view(desc.label, size, desc.format));

        let handle = TextureHandle::from_raw(self.next_raw());
        self.textures.insert(
            handle,
            GpuTexture {
                texture,
                view,
                msaa,
                size,
                format: desc.format,
            },
        );
        log::debug!("{} created: {handle:?} {}x{}", desc.label, desc.width, desc.height);
        Ok(handle)
    }

    fn write_texture(&mut self, handle: TextureHandle, rgba: &[u8]) -> Result<()> {
        let texture = self
            .textures
            .get(&handle)
            .ok_or_else(|| anyhow!("unknown texture {handle:?}"))?;
        ensure!(
            texture.format.block_copy_size(None) == Some(4),
            "{:?} is not a 4-byte texel format",
            texture.format
        );
        let Size { width, height } = texture.size;
        ensure!(
            rgba.len() == (width * height * 4) as usize,
            "expected {} bytes for {width}x{height}, got {}",
            width * height * 4,
            rgba.len()
        );

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn is_texture_released(&self, handle: TextureHandle) -> bool {
        !self.textures.contains_key(&handle)
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        if self.textures.remove(&handle).is_none() {
            log::trace!("{handle:?} already released");
        }
    }

    fn create_batch(&mut self) -> Result<BatchHandle> {
        ensure!(!self.destroyed, "device destroyed");
        let handle = BatchHandle::from_raw(self.next_raw());
        self.batches.insert(handle, Batch::default());
        Ok(handle)
    }

    fn is_batch_released(&self, batch: BatchHandle) -> bool {
        !self.batches.contains_key(&batch)
    }

    fn release_batch(&mut self, batch: BatchHandle) {
        self.batches.remove(&batch);
    }

    fn begin_batch(&mut self, handle: BatchHandle, params: &BatchParams) {
        let open = OpenBatch {
            params: *params,
            target: self.target,
            state: self.state,
            blend_factor: self.blend_factor,
            sprites: Vec::new(),
        };
        match self.batches.get_mut(&handle) {
            Some(batch) => batch.open = Some(open),
            None => log::warn!("begin on unknown batch {handle:?}"),
        }
    }

    fn draw(&mut self, handle: BatchHandle, sprite: &SpriteDraw) {
        match self.batches.get_mut(&handle).and_then(|b| b.open.as_mut()) {
            Some(open) => open.sprites.push(*sprite),
            None => log::trace!("draw on closed batch {handle:?} ignored"),
        }
    }

    fn end_batch(&mut self, handle: BatchHandle) {
        let Some(open) = self.batches.get_mut(&handle).and_then(|b| b.open.take()) else {
            return;
        };
        if !open.sprites.is_empty() {
            self.flush(open);
        }
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        ensure!(!self.destroyed, "device destroyed");
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(desc.label),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            anisotropy_clamp: desc.max_anisotropy.max(1),
            ..Default::default()
        });
        let handle = SamplerHandle::from_raw(self.next_raw());
        self.samplers.insert(handle, sampler);
        Ok(handle)
    }

    fn apply_pipeline_state(&mut self, state: &PipelineState) {
        self.state = *state;
    }

    fn set_blend_factor(&mut self, factor: ColorRgba) {
        self.blend_factor = factor;
    }

    fn bind_render_target(&mut self, target: RenderTargetBinding) {
        if let RenderTargetBinding::Texture(handle) = target {
            if !self.textures.contains_key(&handle) {
                log::warn!("binding released texture {handle:?}");
            }
        }
        self.target = target;
    }

    fn clear(&mut self, binding: RenderTargetBinding, color: ColorRgba) {
        let mut encoder = self.take_encoder();
        let views = resolve_target(
            binding,
            self.frame.as_ref(),
            self.msaa.as_ref(),
            &self.textures,
            &self.config,
            self.sample_count,
        );
        match views {
            Some(views) => {
                let mut target = RenderTarget {
                    encoder: &mut encoder,
                    color_view: views.color,
                    resolve_view: views.resolve,
                    depth_view: None,
                    format: views.format,
                    depth_format: None,
                    sample_count: views.sample_count,
                };
                drop(target.begin_pass("lumen clear", Some(color)));
            }
            None => log::debug!("clear of {binding:?} skipped: nothing to clear"),
        }
        self.encoder = Some(encoder);
    }

    fn clear_depth(&mut self) {
        let mut encoder = self.take_encoder();
        if let Some(depth) = self.depth.as_ref() {
            drop(encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("lumen clear depth"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            }));
        }
        self.encoder = Some(encoder);
    }

    fn begin_frame(&mut self) -> Result<FrameStatus> {
        if self.destroyed {
            bail!("device destroyed");
        }
        if self.frame.is_some() {
            return Ok(FrameStatus::Ready);
        }

        match self.surface.get_current_texture() {
            Ok(surface_texture) => {
                self.frame = Some(GpuFrame::new(surface_texture));
                Ok(FrameStatus::Ready)
            }
            Err(err) => match surface::map_surface_error(&err) {
                SurfaceErrorAction::ResetDevice => Ok(FrameStatus::Lost),
                SurfaceErrorAction::SkipFrame => {
                    log::debug!("frame skipped: {err}");
                    Ok(FrameStatus::Skipped)
                }
                SurfaceErrorAction::Fatal => Err(anyhow!(err).context("failed to acquire frame")),
            },
        }
    }

    fn present(&mut self) {
        self.finish_frame(true);
    }

    fn destroy_device(&mut self) {
        if self.destroyed {
            return;
        }
        self.finish_frame(false);
        self.batches.clear();
        self.textures.clear();
        self.samplers.clear();
        self.msaa = None;
        self.depth = None;
        self.sprites = SpriteRenderer::new();
        self.device.destroy();
        self.destroyed = true;
        log::info!("gpu device destroyed");
    }
}
