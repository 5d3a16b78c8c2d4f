use super::backend::GraphicsBackend;
use super::blend::BlendDescriptor;

/// Rasterizer + blend description of the sprite pipeline.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PipelineState {
    pub blend: BlendDescriptor,
    pub topology: wgpu::PrimitiveTopology,
    pub cull_mode: Option<wgpu::Face>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            blend: BlendDescriptor::alpha_blend(),
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
        }
    }
}

/// Lazily constructed, mutable pipeline description.
///
/// Edits go through [`state_mut`](Self::state_mut); [`push`](Self::push) hands the
/// result to the backend only if it differs from what was last pushed.
#[derive(Debug, Default)]
pub struct PipelineStateCache {
    state: Option<PipelineState>,
    pushed: Option<PipelineState>,
    pushes: u64,
}

impl PipelineStateCache {
    /// Current state, if anything has been configured yet.
    #[inline]
    pub fn current(&self) -> Option<&PipelineState> {
        self.state.as_ref()
    }

    /// Live blend descriptor (default alpha blend before first use).
    pub fn blend(&self) -> BlendDescriptor {
        self.state.map(|s| s.blend).unwrap_or_default()
    }

    /// Number of states handed to the backend.
    #[inline]
    pub fn pushes(&self) -> u64 {
        self.pushes
    }

    pub(crate) fn state_mut(&mut self) -> &mut PipelineState {
        self.state.get_or_insert_with(PipelineState::default)
    }

    pub(crate) fn push<B: GraphicsBackend>(&mut self, backend: &mut B) -> bool {
        let state = *self.state_mut();
        if self.pushed == Some(state) {
            return false;
        }
        backend.apply_pipeline_state(&state);
        self.pushed = Some(state);
        self.pushes += 1;
        true
    }

    /// Forgets what the backend holds; the next push always goes through.
    pub(crate) fn invalidate(&mut self) {
        self.pushed = None;
    }
}
