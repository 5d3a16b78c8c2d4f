use super::backend::{BatchHandle, BatchParams, GraphicsBackend};
use super::pipeline::PipelineStateCache;

/// Open/closed state of the shared sprite batch.
///
/// At most one session exists. Pipeline and render-target edits only happen
/// inside [`DrawSession::suspend`], which guarantees the batch is closed while
/// the edit runs.
#[derive(Debug, Default)]
pub struct DrawSession {
    batch: Option<BatchHandle>,
    open: bool,
    params: Option<BatchParams>,
    opened: u64,
    closed: u64,
}

impl DrawSession {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Backend batch handle, if resources are loaded.
    #[inline]
    pub fn batch(&self) -> Option<BatchHandle> {
        self.batch
    }

    /// Parameters of the most recent open.
    #[inline]
    pub fn params(&self) -> Option<BatchParams> {
        self.params
    }

    /// Total successful opens.
    #[inline]
    pub fn opened(&self) -> u64 {
        self.opened
    }

    /// Total successful closes.
    #[inline]
    pub fn closed(&self) -> u64 {
        self.closed
    }

    pub(crate) fn attach(&mut self, batch: BatchHandle) {
        debug_assert!(self.batch.is_none(), "draw session already has a batch");
        self.batch = Some(batch);
        self.open = false;
        self.params = None;
    }

    /// Closes the session if needed and gives up the batch handle.
    pub(crate) fn detach<B: GraphicsBackend>(&mut self, backend: &mut B) -> Option<BatchHandle> {
        self.close(backend);
        self.batch.take()
    }

    /// Opens the session. No-op when already open or when no batch exists.
    pub(crate) fn open<B: GraphicsBackend>(&mut self, backend: &mut B, params: &BatchParams) -> bool {
        let Some(batch) = self.batch else {
            log::trace!("draw session has no batch; open skipped");
            return false;
        };
        if self.open {
            return false;
        }
        backend.begin_batch(batch, params);
        self.params = Some(*params);
        self.open = true;
        self.opened += 1;
        true
    }

    /// Closes (flushes) the session. No-op when already closed.
    pub(crate) fn close<B: GraphicsBackend>(&mut self, backend: &mut B) -> bool {
        let Some(batch) = self.batch else { return false };
        if !self.open {
            return false;
        }
        backend.end_batch(batch);
        self.open = false;
        self.closed += 1;
        true
    }

    /// Runs `mutate` with the session closed, then reopens it with the
    /// parameters `mutate` returns.
    ///
    /// The session is only reopened if it was open on entry, so a closed
    /// session stays closed and the next explicit open picks up the new state.
    pub(crate) fn suspend<B, F>(&mut self, backend: &mut B, mutate: F)
    where
        B: GraphicsBackend,
        F: FnOnce(&mut B) -> BatchParams,
    {
        let was_open = self.close(backend);
        let params = mutate(backend);
        if was_open {
            self.open(backend, &params);
        }
    }
}

/// Mutable view over the pieces every state transition touches.
///
/// Built from disjoint fields of the graphics manager so a transition can
/// borrow them together without borrowing the manager as a whole.
pub(crate) struct Stage<'a, B> {
    pub(crate) backend: &'a mut B,
    pub(crate) session: &'a mut DrawSession,
    pub(crate) pipeline: &'a mut PipelineStateCache,
}
