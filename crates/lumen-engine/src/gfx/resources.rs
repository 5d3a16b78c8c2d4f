//! Device-tied resources: the poison and scratch textures plus the batch
//! handle used by the draw session.
//!
//! Everything here dies with the device configuration and is rebuilt by
//! `load` after a reset.

use anyhow::{Context, Result};

use super::backend::{GraphicsBackend, TextureDesc, TextureHandle};
use super::session::DrawSession;
use super::surface::SurfaceDescriptor;

/// Edge length of the poison texture.
pub const POISON_SIZE: u32 = 6;

const POISON_BORDER: [u8; 4] = [0, 0, 0, 255];
const POISON_FILL: [u8; 4] = [255, 255, 255, 0];

/// RGBA8 pixels of the poison texture: a one-pixel opaque black frame around a
/// transparent white interior. Drawn in place of missing assets.
pub fn poison_pixels() -> Vec<u8> {
    let n = POISON_SIZE;
    let mut out = Vec::with_capacity((n * n * 4) as usize);
    for y in 0..n {
        for x in 0..n {
            let border = x == 0 || y == 0 || x == n - 1 || y == n - 1;
            out.extend_from_slice(if border { &POISON_BORDER } else { &POISON_FILL });
        }
    }
    out
}

/// Texture owned by the pool.
///
/// A `ManagedTexture` only exists once its backend texture is fully created and
/// initialized.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ManagedTexture {
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

impl ManagedTexture {
    fn from_desc(handle: TextureHandle, desc: &TextureDesc) -> Self {
        Self {
            handle,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            usage: desc.usage,
        }
    }
}

#[derive(Debug, Default)]
pub struct ResourcePool {
    poison: Option<ManagedTexture>,
    scratch: Option<ManagedTexture>,
    created: u64,
    released: u64,
}

impl ResourcePool {
    #[inline]
    pub fn poison(&self) -> Option<&ManagedTexture> {
        self.poison.as_ref()
    }

    #[inline]
    pub fn scratch(&self) -> Option<&ManagedTexture> {
        self.scratch.as_ref()
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.poison.is_some() && self.scratch.is_some()
    }

    /// Textures allocated over the pool's lifetime.
    #[inline]
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Textures handed back to the backend over the pool's lifetime.
    #[inline]
    pub fn released(&self) -> u64 {
        self.released
    }

    /// Creates whatever is missing. Safe to call repeatedly.
    pub(crate) fn load<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        session: &mut DrawSession,
        surface: &SurfaceDescriptor,
    ) -> Result<()> {
        if session.batch().is_none() {
            let batch = backend.create_batch().context("failed to create sprite batch")?;
            session.attach(batch);
        }

        if self.poison.is_none() {
            let desc = TextureDesc {
                label: "lumen poison texture",
                width: POISON_SIZE,
                height: POISON_SIZE,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            };
            let handle = backend
                .create_texture(&desc)
                .context("failed to create poison texture")?;
            if let Err(e) = backend.write_texture(handle, &poison_pixels()) {
                backend.release_texture(handle);
                return Err(e.context("failed to upload poison texture"));
            }
            self.poison = Some(ManagedTexture::from_desc(handle, &desc));
            self.created += 1;
        }

        if self.scratch.is_none() {
            let desc = TextureDesc {
                label: "lumen scratch texture",
                width: surface.width,
                height: surface.height,
                format: surface.color_format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::RENDER_ATTACHMENT,
            };
            let handle = backend.create_texture(&desc).with_context(|| {
                format!("failed to create {}x{} scratch texture", desc.width, desc.height)
            })?;
            self.scratch = Some(ManagedTexture::from_desc(handle, &desc));
            self.created += 1;
        }

        Ok(())
    }

    /// Releases everything the pool owns. Resources the backend already
    /// released are skipped; references are cleared either way.
    pub(crate) fn cleanup<B: GraphicsBackend>(&mut self, backend: &mut B, session: &mut DrawSession) {
        if let Some(batch) = session.detach(backend) {
            if !backend.is_batch_released(batch) {
                backend.release_batch(batch);
            }
        }

        for slot in [&mut self.scratch, &mut self.poison] {
            if let Some(texture) = slot.take() {
                if !backend.is_texture_released(texture.handle) {
                    backend.release_texture(texture.handle);
                    self.released += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::Size;
    use crate::gfx::surface::SurfaceDefaults;
    use crate::gfx::testing::{Call, RecordingBackend};

    fn surface() -> SurfaceDescriptor {
        SurfaceDescriptor::new(Size::new(320, 200), &SurfaceDefaults::default())
    }

    fn pixel(data: &[u8], x: u32, y: u32) -> [u8; 4] {
        let i = ((y * POISON_SIZE + x) * 4) as usize;
        [data[i], data[i + 1], data[i + 2], data[i + 3]]
    }

    #[test]
    fn poison_has_black_frame_and_clear_white_interior() {
        let data = poison_pixels();
        assert_eq!(data.len(), 6 * 6 * 4);
        for y in 0..POISON_SIZE {
            for x in 0..POISON_SIZE {
                let border = x == 0 || y == 0 || x == 5 || y == 5;
                let expected = if border { [0, 0, 0, 255] } else { [255, 255, 255, 0] };
                assert_eq!(pixel(&data, x, y), expected, "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn load_twice_allocates_once() {
        let mut backend = RecordingBackend::default();
        let mut session = DrawSession::default();
        let mut pool = ResourcePool::default();

        pool.load(&mut backend, &mut session, &surface()).unwrap();
        pool.load(&mut backend, &mut session, &surface()).unwrap();

        assert_eq!(backend.count(|c| matches!(c, Call::CreateTexture(..))), 2);
        assert_eq!(backend.count(|c| matches!(c, Call::CreateBatch(_))), 1);
        assert_eq!(pool.created(), 2);
        assert!(pool.is_loaded());
    }

    #[test]
    fn scratch_matches_back_buffer_and_is_renderable() {
        let mut backend = RecordingBackend::default();
        let mut session = DrawSession::default();
        let mut pool = ResourcePool::default();
        pool.load(&mut backend, &mut session, &surface()).unwrap();

        let scratch = pool.scratch().unwrap();
        assert_eq!((scratch.width, scratch.height), (320, 200));
        assert!(scratch.usage.contains(wgpu::TextureUsages::TEXTURE_BINDING));
        assert!(scratch.usage.contains(wgpu::TextureUsages::RENDER_ATTACHMENT));

        let poison = pool.poison().unwrap();
        assert_eq!(backend.texture_pixels(poison.handle), Some(poison_pixels()));
    }

    #[test]
    fn cleanup_nulls_references_and_skips_released_handles() {
        let mut backend = RecordingBackend::default();
        let mut session = DrawSession::default();
        let mut pool = ResourcePool::default();
        pool.load(&mut backend, &mut session, &surface()).unwrap();

        let poison = pool.poison().unwrap().handle;
        backend.release_texture(poison);
        backend.calls.clear();

        pool.cleanup(&mut backend, &mut session);

        assert!(pool.poison().is_none() && pool.scratch().is_none());
        assert!(session.batch().is_none());
        assert_eq!(backend.count(|c| matches!(c, Call::ReleaseTexture(_))), 1);
        assert_eq!(backend.count(|c| matches!(c, Call::ReleaseBatch(_))), 1);

        pool.cleanup(&mut backend, &mut session);
        assert_eq!(backend.count(|c| matches!(c, Call::ReleaseTexture(_))), 1);
    }

    #[test]
    fn failed_upload_leaves_no_poison_behind() {
        let mut backend = RecordingBackend::default();
        backend.fail_writes = true;
        let mut session = DrawSession::default();
        let mut pool = ResourcePool::default();

        assert!(pool.load(&mut backend, &mut session, &surface()).is_err());
        assert!(pool.poison().is_none());
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn reload_after_cleanup_recreates_everything() {
        let mut backend = RecordingBackend::default();
        let mut session = DrawSession::default();
        let mut pool = ResourcePool::default();
        pool.load(&mut backend, &mut session, &surface()).unwrap();
        let first = pool.scratch().unwrap().handle;

        pool.cleanup(&mut backend, &mut session);
        pool.load(&mut backend, &mut session, &surface()).unwrap();

        assert_ne!(pool.scratch().unwrap().handle, first);
        assert!(session.batch().is_some());
        assert_eq!(backend.live_textures(), 2);
    }
}
