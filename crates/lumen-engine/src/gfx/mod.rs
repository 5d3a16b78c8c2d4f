//! Graphics manager: device/resource lifecycle and the blend state machine.
//!
//! Every draw goes through a single batching [`DrawSession`]. Anything that
//! changes how a batch is rendered (blend, opacity, render target, transform)
//! closes the session, edits state and reopens it, so batches never straddle
//! a state change.
//!
//! The manager is generic over [`GraphicsBackend`]; the wgpu implementation
//! lives in [`crate::device`].

mod backend;
mod blend;
mod manager;
mod metrics;
mod pipeline;
mod resources;
mod session;
mod surface;
mod target;
mod transform;

#[cfg(test)]
mod testing;

pub use backend::{
    BatchHandle, BatchParams, FrameStatus, GraphicsBackend, RenderTargetBinding, SamplerDesc,
    SamplerHandle, SpriteDraw, TargetSurface, TextureDesc, TextureHandle,
};
pub use blend::{BlendDescriptor, BlendMode, BlendStateMachine, Opacity};
pub use manager::GraphicsManager;
pub use metrics::GraphicsMetrics;
pub use pipeline::{PipelineState, PipelineStateCache};
pub use resources::{ManagedTexture, POISON_SIZE, ResourcePool, poison_pixels};
pub use session::DrawSession;
pub use surface::{ColorSpace, SurfaceDefaults, SurfaceDescriptor};
pub use target::RenderTargetRouter;
pub use transform::{TRANSFORM_ANISOTROPY, TransformSession};
