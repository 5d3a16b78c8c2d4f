use super::backend::{BatchParams, GraphicsBackend, RenderTargetBinding, TextureHandle};
use super::session::Stage;

/// Tracks which surface subsequent batches draw into.
#[derive(Debug, Default)]
pub struct RenderTargetRouter {
    current: Option<TextureHandle>,
}

impl RenderTargetRouter {
    /// Bound offscreen texture; `None` is the back buffer.
    #[inline]
    pub fn current(&self) -> Option<TextureHandle> {
        self.current
    }

    #[inline]
    pub fn binding(&self) -> RenderTargetBinding {
        self.current.into()
    }

    /// Re-issues the current binding (back buffer if none).
    pub(crate) fn rebind<B: GraphicsBackend>(&self, backend: &mut B) {
        backend.bind_render_target(self.binding());
    }

    /// Switches the bound surface. Identity comparison; returns `false` on no-op.
    pub(crate) fn set_render_target<B: GraphicsBackend>(
        &mut self,
        target: Option<TextureHandle>,
        stage: Stage<'_, B>,
    ) -> bool {
        if self.current == target {
            return false;
        }

        let Stage { backend, session, pipeline } = stage;
        session.suspend(backend, |backend| {
            self.current = target;
            backend.bind_render_target(target.into());
            BatchParams::plain(pipeline.blend())
        });

        log::trace!("render target -> {:?}", self.binding());
        true
    }

    /// Points the router back at the back buffer without touching the backend.
    pub(crate) fn forget(&mut self) {
        self.current = None;
    }
}
