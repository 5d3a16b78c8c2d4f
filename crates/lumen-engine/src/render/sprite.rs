use std::collections::HashMap;
use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use kurbo::Affine;
use wgpu::util::DeviceExt;

use crate::coords::ColorRgba;
use crate::gfx::{BlendDescriptor, PipelineState, SpriteDraw, TextureHandle};

use super::{RenderCtx, RenderTarget};

/// Sprites of one flushed batch, in submission order.
///
/// Consecutive sprites sharing a texture form one run (one bind group, one
/// instanced draw call).
#[derive(Debug, Default)]
pub struct SpriteBatch {
    pub instances: Vec<SpriteInstance>,
    pub runs: Vec<(TextureHandle, Range<u32>)>,
    /// Sprites dropped because their texture no longer exists.
    pub skipped: usize,
}

/// Converts queued sprites into instance data.
///
/// `texture_size` resolves a handle to its pixel size, or `None` if the texture
/// was released.
pub fn batch_sprites<F>(sprites: &[SpriteDraw], mut texture_size: F) -> SpriteBatch
where
    F: FnMut(TextureHandle) -> Option<(u32, u32)>,
{
    let mut out = SpriteBatch::default();

    for sprite in sprites {
        let Some((tw, th)) = texture_size(sprite.texture) else {
            out.skipped += 1;
            continue;
        };

        let uv = sprite.source.map_or([0.0, 0.0, 1.0, 1.0], |r| r.to_uv(tw, th));
        let index = out.instances.len() as u32;
        out.instances.push(SpriteInstance {
            dst_min: [sprite.dest.x, sprite.dest.y],
            dst_size: [sprite.dest.width, sprite.dest.height],
            uv_min: [uv[0], uv[1]],
            uv_max: [uv[2], uv[3]],
            tint: [sprite.tint.r, sprite.tint.g, sprite.tint.b, sprite.tint.a],
        });

        match out.runs.last_mut() {
            Some((texture, range)) if *texture == sprite.texture => range.end = index + 1,
            _ => out.runs.push((sprite.texture, index..index + 1)),
        }
    }

    out
}

/// A run resolved to its texture view.
pub struct SpriteRun<'a> {
    pub view: &'a wgpu::TextureView,
    pub instances: Range<u32>,
}

/// Everything one flush needs besides the target.
pub struct SpritePass<'a> {
    pub instances: &'a [SpriteInstance],
    pub runs: &'a [SpriteRun<'a>],
    /// `None` uses the renderer's linear clamp sampler.
    pub sampler: Option<&'a wgpu::Sampler>,
    pub blend: BlendDescriptor,
    pub state: PipelineState,
    pub transform: Affine,
    pub blend_constant: ColorRgba,
}

/// Render pipeline variant.
///
/// Alpha-to-coverage only exists on multisampled targets, so it is folded
/// away for single-sampled ones.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub color_src: wgpu::BlendFactor,
    pub color_dst: wgpu::BlendFactor,
    pub alpha_src: wgpu::BlendFactor,
    pub alpha_to_coverage: bool,
    pub topology: wgpu::PrimitiveTopology,
    pub cull_mode: Option<wgpu::Face>,
    pub format: wgpu::TextureFormat,
    pub sample_count: u32,
    pub depth_format: Option<wgpu::TextureFormat>,
}

impl PipelineKey {
    pub fn new(
        blend: &BlendDescriptor,
        state: &PipelineState,
        format: wgpu::TextureFormat,
        sample_count: u32,
        depth_format: Option<wgpu::TextureFormat>,
    ) -> Self {
        Self {
            color_src: blend.color_src,
            color_dst: blend.color_dst,
            alpha_src: blend.alpha_src,
            alpha_to_coverage: blend.alpha_to_coverage && sample_count > 1,
            topology: state.topology,
            cull_mode: state.cull_mode,
            format,
            sample_count,
            depth_format,
        }
    }

    fn blend_state(&self) -> wgpu::BlendState {
        BlendDescriptor {
            alpha_to_coverage: self.alpha_to_coverage,
            color_src: self.color_src,
            color_dst: self.color_dst,
            alpha_src: self.alpha_src,
            blend_factor: ColorRgba::white(),
        }
        .to_wgpu()
    }
}

/// Textured-quad renderer with a pipeline per [`PipelineKey`].
#[derive(Default)]
pub struct SpriteRenderer {
    shader: Option<wgpu::ShaderModule>,
    globals_layout: Option<wgpu::BindGroupLayout>,
    texture_layout: Option<wgpu::BindGroupLayout>,
    pipeline_layout: Option<wgpu::PipelineLayout>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    default_sampler: Option<wgpu::Sampler>,

    quad_vbo: Option<wgpu::Buffer>,
    quad_ibo: Option<wgpu::Buffer>,
}

impl SpriteRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pipeline variants built so far.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Draws `pass` into `target` on top of its current contents.
    pub fn render(&mut self, ctx: &RenderCtx<'_>, target: &mut RenderTarget<'_>, pass: &SpritePass<'_>) {
        if pass.instances.is_empty() || pass.runs.is_empty() {
            return;
        }

        self.ensure_layouts(ctx);
        self.ensure_static_buffers(ctx);
        self.ensure_default_sampler(ctx);

        let key = PipelineKey::new(
            &pass.blend,
            &pass.state,
            target.format,
            target.sample_count,
            target.depth_format,
        );
        self.ensure_pipeline(ctx, key);

        let Some(globals_layout) = self.globals_layout.as_ref() else { return };
        let Some(texture_layout) = self.texture_layout.as_ref() else { return };
        let Some(pipeline) = self.pipelines.get(&key) else { return };
        let Some(quad_vbo) = self.quad_vbo.as_ref() else { return };
        let Some(quad_ibo) = self.quad_ibo.as_ref() else { return };
        let Some(sampler) = pass.sampler.or(self.default_sampler.as_ref()) else { return };

        // Per-flush buffers: queue writes would land before the whole encoder
        // runs, so several flushes in one frame cannot share a buffer.
        let globals = Globals::new(ctx.viewport.width, ctx.viewport.height, pass.transform);
        let globals_ubo = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lumen sprite globals ubo"),
            contents: bytemuck::bytes_of(&globals),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let instance_vbo = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lumen sprite instance vbo"),
            contents: bytemuck::cast_slice(pass.instances),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let globals_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lumen sprite globals"),
            layout: globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_ubo.as_entire_binding(),
            }],
        });

        let texture_groups: Vec<wgpu::BindGroup> = pass
            .runs
            .iter()
            .map(|run| {
                ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("lumen sprite texture"),
                    layout: texture_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(run.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(sampler),
                        },
                    ],
                })
            })
            .collect();

        let mut rpass = target.begin_pass("lumen sprite pass", None);
        rpass.set_pipeline(pipeline);
        rpass.set_blend_constant(pass.blend_constant.to_wgpu());
        rpass.set_bind_group(0, &globals_group, &[]);
        rpass.set_vertex_buffer(0, quad_vbo.slice(..));
        rpass.set_vertex_buffer(1, instance_vbo.slice(..));
        rpass.set_index_buffer(quad_ibo.slice(..), wgpu::IndexFormat::Uint16);

        for (run, group) in pass.runs.iter().zip(&texture_groups) {
            rpass.set_bind_group(1, group, &[]);
            rpass.draw_indexed(0..6, 0, run.instances.clone());
        }
    }

    fn ensure_layouts(&mut self, ctx: &RenderCtx<'_>) {
        if self.pipeline_layout.is_some() {
            return;
        }

        let globals_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lumen sprite globals bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<Globals>() as u64),
                },
                count: None,
            }],
        });

        let texture_layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lumen sprite texture bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("lumen sprite pipeline layout"),
            bind_group_layouts: &[&globals_layout, &texture_layout],
            immediate_size: 0,
        });

        self.shader = Some(ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lumen sprite shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/sprite.wgsl").into()),
        }));
        self.globals_layout = Some(globals_layout);
        self.texture_layout = Some(texture_layout);
        self.pipeline_layout = Some(pipeline_layout);
        self.pipelines.clear();
    }

    fn ensure_pipeline(&mut self, ctx: &RenderCtx<'_>, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        let Some(shader) = self.shader.as_ref() else { return };
        let Some(layout) = self.pipeline_layout.as_ref() else { return };

        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("lumen sprite pipeline"),
            layout: Some(layout),

            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[QuadVertex::layout(), SpriteInstance::layout()],
            },

            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: key.format,
                    blend: Some(key.blend_state()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),

            primitive: wgpu::PrimitiveState {
                topology: key.topology,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: key.cull_mode,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },

            // Sprites are painter-ordered; depth is attached but never tested.
            depth_stencil: key.depth_format.map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: key.sample_count,
                mask: !0,
                alpha_to_coverage_enabled: key.alpha_to_coverage,
            },

            multiview_mask: None,
            cache: None,
        });

        log::debug!("sprite pipeline built: {key:?}");
        self.pipelines.insert(key, pipeline);
    }

    fn ensure_default_sampler(&mut self, ctx: &RenderCtx<'_>) {
        if self.default_sampler.is_some() {
            return;
        }
        self.default_sampler = Some(ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("lumen sprite sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        }));
    }

    fn ensure_static_buffers(&mut self, ctx: &RenderCtx<'_>) {
        if self.quad_vbo.is_some() && self.quad_ibo.is_some() {
            return;
        }
        self.quad_vbo = Some(ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lumen sprite quad vbo"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        }));
        self.quad_ibo = Some(ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lumen sprite quad ibo"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        }));
    }
}

// ── GPU types ─────────────────────────────────────────────────────────────

/// Uniform block (48 bytes): viewport, then the affine transform as two rows.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
struct Globals {
    viewport: [f32; 4],
    row0: [f32; 4],
    row1: [f32; 4],
}

impl Globals {
    fn new(width: u32, height: u32, transform: Affine) -> Self {
        let [a, b, c, d, e, f] = transform.as_coeffs().map(|v| v as f32);
        Self {
            viewport: [width.max(1) as f32, height.max(1) as f32, 0.0, 0.0],
            row0: [a, c, e, 0.0],
            row1: [b, d, f, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct QuadVertex {
    corner: [f32; 2], // 0..1
}

impl QuadVertex {
    const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { corner: [0.0, 0.0] },
    QuadVertex { corner: [1.0, 0.0] },
    QuadVertex { corner: [1.0, 1.0] },
    QuadVertex { corner: [0.0, 1.0] },
];

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Instance data layout (48 bytes):
///
///  offset  0  dst_min   [f32; 2]   loc 1
///  offset  8  dst_size  [f32; 2]   loc 2
///  offset 16  uv_min    [f32; 2]   loc 3
///  offset 24  uv_max    [f32; 2]   loc 4
///  offset 32  tint      [f32; 4]   loc 5
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct SpriteInstance {
    pub dst_min: [f32; 2],
    pub dst_size: [f32; 2],
    pub uv_min: [f32; 2],
    pub uv_max: [f32; 2],
    pub tint: [f32; 4],
}

impl SpriteInstance {
    const ATTRS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        1 => Float32x2, // dst_min
        2 => Float32x2, // dst_size
        3 => Float32x2, // uv_min
        4 => Float32x2, // uv_max
        5 => Float32x4  // tint
    ];

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SpriteInstance>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRS,
        }
    }
}
