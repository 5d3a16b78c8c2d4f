//! In-memory collaborators for manager tests.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};

use crate::coords::{ColorRgba, Size};

use super::backend::{
    BatchHandle, BatchParams, FrameStatus, GraphicsBackend, RenderTargetBinding, SamplerDesc,
    SamplerHandle, SpriteDraw, TargetSurface, TextureDesc, TextureHandle,
};
use super::pipeline::PipelineState;
use super::surface::SurfaceDescriptor;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Configure(SurfaceDescriptor),
    CreateTexture(TextureHandle, TextureDesc),
    WriteTexture(TextureHandle),
    ReleaseTexture(TextureHandle),
    CreateBatch(BatchHandle),
    ReleaseBatch(BatchHandle),
    BeginBatch(BatchHandle, BatchParams),
    Draw(BatchHandle, SpriteDraw),
    EndBatch(BatchHandle),
    CreateSampler(SamplerHandle, SamplerDesc),
    ApplyPipeline(PipelineState),
    SetBlendFactor(ColorRgba),
    BindTarget(RenderTargetBinding),
    Clear(RenderTargetBinding, ColorRgba),
    ClearDepth,
    BeginFrame,
    Present,
    DestroyDevice,
}

/// Backend that records every call and keeps just enough state to answer the
/// released/live queries.
#[derive(Debug)]
pub struct RecordingBackend {
    pub calls: Vec<Call>,
    /// Returned by `begin_frame`.
    pub frame_status: FrameStatus,
    pub fail_configure: bool,
    pub fail_texture_creation: bool,
    pub fail_writes: bool,
    next: u64,
    textures: HashMap<TextureHandle, Option<Vec<u8>>>,
    batches: HashSet<BatchHandle>,
    destroyed: bool,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            frame_status: FrameStatus::Ready,
            fail_configure: false,
            fail_texture_creation: false,
            fail_writes: false,
            next: 1,
            textures: HashMap::new(),
            batches: HashSet::new(),
            destroyed: false,
        }
    }
}

impl RecordingBackend {
    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn last_blend_factor(&self) -> Option<ColorRgba> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::SetBlendFactor(f) => Some(*f),
            _ => None,
        })
    }

    pub fn last_configure(&self) -> Option<SurfaceDescriptor> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::Configure(d) => Some(*d),
            _ => None,
        })
    }

    pub fn texture_pixels(&self, texture: TextureHandle) -> Option<Vec<u8>> {
        self.textures.get(&texture).cloned().flatten()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_batches(&self) -> usize {
        self.batches.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn next_raw(&mut self) -> u64 {
        let raw = self.next;
        self.next += 1;
        raw
    }
}

impl GraphicsBackend for RecordingBackend {
    fn configure(&mut self, surface: &SurfaceDescriptor) -> Result<()> {
        if self.fail_configure {
            bail!("configuration refused");
        }
        self.calls.push(Call::Configure(*surface));
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle> {
        if self.destroyed || self.fail_texture_creation {
            bail!("texture creation refused");
        }
        let handle = TextureHandle::from_raw(self.next_raw());
        self.textures.insert(handle, None);
        self.calls.push(Call::CreateTexture(handle, *desc));
        Ok(handle)
    }

    fn write_texture(&mut self, texture: TextureHandle, rgba: &[u8]) -> Result<()> {
        if self.fail_writes {
            bail!("upload refused");
        }
        let Some(slot) = self.textures.get_mut(&texture) else {
            bail!("unknown texture {texture:?}");
        };
        *slot = Some(rgba.to_vec());
        self.calls.push(Call::WriteTexture(texture));
        Ok(())
    }

    fn is_texture_released(&self, texture: TextureHandle) -> bool {
        !self.textures.contains_key(&texture)
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.calls.push(Call::ReleaseTexture(texture));
    }

    fn create_batch(&mut self) -> Result<BatchHandle> {
        if self.destroyed {
            bail!("device destroyed");
        }
        let handle = BatchHandle::from_raw(self.next_raw());
        self.batches.insert(handle);
        self.calls.push(Call::CreateBatch(handle));
        Ok(handle)
    }

    fn is_batch_released(&self, batch: BatchHandle) -> bool {
        !self.batches.contains(&batch)
    }

    fn release_batch(&mut self, batch: BatchHandle) {
        self.batches.remove(&batch);
        self.calls.push(Call::ReleaseBatch(batch));
    }

    fn begin_batch(&mut self, batch: BatchHandle, params: &BatchParams) {
        self.calls.push(Call::BeginBatch(batch, *params));
    }

    fn draw(&mut self, batch: BatchHandle, sprite: &SpriteDraw) {
        self.calls.push(Call::Draw(batch, *sprite));
    }

    fn end_batch(&mut self, batch: BatchHandle) {
        self.calls.push(Call::EndBatch(batch));
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        let handle = SamplerHandle::from_raw(self.next_raw());
        self.calls.push(Call::CreateSampler(handle, *desc));
        Ok(handle)
    }

    fn apply_pipeline_state(&mut self, state: &PipelineState) {
        self.calls.push(Call::ApplyPipeline(*state));
    }

    fn set_blend_factor(&mut self, factor: ColorRgba) {
        self.calls.push(Call::SetBlendFactor(factor));
    }

    fn bind_render_target(&mut self, target: RenderTargetBinding) {
        self.calls.push(Call::BindTarget(target));
    }

    fn clear(&mut self, target: RenderTargetBinding, color: ColorRgba) {
        self.calls.push(Call::Clear(target, color));
    }

    fn clear_depth(&mut self) {
        self.calls.push(Call::ClearDepth);
    }

    fn begin_frame(&mut self) -> Result<FrameStatus> {
        self.calls.push(Call::BeginFrame);
        Ok(self.frame_status)
    }

    fn present(&mut self) {
        self.calls.push(Call::Present);
    }

    fn destroy_device(&mut self) {
        self.destroyed = true;
        self.calls.push(Call::DestroyDevice);
    }
}

/// Window stand-in. Size requests apply immediately.
#[derive(Debug)]
pub struct FakeTarget {
    size: Cell<Size>,
    full_screen: Cell<bool>,
    requests: Cell<u32>,
}

impl FakeTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Cell::new(Size::new(width, height)),
            full_screen: Cell::new(false),
            requests: Cell::new(0),
        }
    }

    /// Simulates the user or the OS resizing the window.
    pub fn set_size(&self, width: u32, height: u32) {
        self.size.set(Size::new(width, height));
    }

    pub fn enter_full_screen(&self) {
        self.full_screen.set(true);
    }

    pub fn is_full_screen(&self) -> bool {
        self.full_screen.get()
    }

    pub fn size_requests(&self) -> u32 {
        self.requests.get()
    }
}

impl TargetSurface for FakeTarget {
    fn client_size(&self) -> Size {
        self.size.get()
    }

    fn request_client_size(&self, size: Size) {
        self.requests.set(self.requests.get() + 1);
        self.size.set(size);
    }

    fn leave_full_screen(&self) {
        self.full_screen.set(false);
    }
}
