//! GPU rendering subsystem.
//!
//! Renderers turn flushed sprite batches into wgpu passes. Each renderer is
//! responsible for its own GPU resources (pipelines, layouts, static buffers).
//!
//! Convention:
//! - CPU geometry is in target pixels (top-left origin, +Y down).
//! - Vertex shader applies the batch transform, then converts to NDC using a
//!   viewport uniform.

mod ctx;
mod sprite;

pub use ctx::{RenderCtx, RenderTarget};
pub use sprite::{
    PipelineKey, SpriteBatch, SpriteInstance, SpritePass, SpriteRenderer, SpriteRun, batch_sprites,
};
