use crate::coords::{ColorRgba, Size};

/// Renderer-facing context (device/queue + target size).
pub struct RenderCtx<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub viewport: Size, // physical px
}

impl<'a> RenderCtx<'a> {
    #[inline]
    pub fn new(device: &'a wgpu::Device, queue: &'a wgpu::Queue, viewport: Size) -> Self {
        Self {
            device,
            queue,
            viewport,
        }
    }
}

/// Target for drawing: encoder, color attachment and the optional depth buffer.
///
/// With MSAA, `color_view` is the multisampled texture and `resolve_view` the
/// single-sampled texture it resolves into at the end of every pass.
pub struct RenderTarget<'a> {
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub color_view: &'a wgpu::TextureView,
    pub resolve_view: Option<&'a wgpu::TextureView>,
    pub depth_view: Option<&'a wgpu::TextureView>,
    pub format: wgpu::TextureFormat,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub sample_count: u32,
}

impl<'a> RenderTarget<'a> {
    /// Starts a pass that keeps (`None`) or clears the color attachment.
    pub fn begin_pass(&mut self, label: &str, clear: Option<ColorRgba>) -> wgpu::RenderPass<'_> {
        let load = match clear {
            Some(c) => wgpu::LoadOp::Clear(c.to_wgpu()),
            None => wgpu::LoadOp::Load,
        };

        self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: self.color_view,
                resolve_target: self.resolve_view,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: self.depth_view.map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        })
    }
}
