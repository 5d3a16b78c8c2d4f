use anyhow::{Context, Result};
use kurbo::Affine;

use super::backend::{BatchParams, GraphicsBackend, SamplerDesc, SamplerHandle};
use super::blend::BlendDescriptor;
use super::session::Stage;

/// Max anisotropy of the sampler used by transformed batches.
pub const TRANSFORM_ANISOTROPY: u16 = 2;

/// Applies a world transform to subsequent batches.
///
/// Transformed batches sample through a dedicated anisotropic sampler, created
/// by the first `set_transform` call (identity included) and dropped with the
/// device. The active matrix outlives session restarts: whatever opens the
/// session next picks it up through [`TransformSession::batch_params`].
#[derive(Debug, Default)]
pub struct TransformSession {
    sampler: Option<SamplerHandle>,
    active: Option<Affine>,
}

impl TransformSession {
    #[inline]
    pub fn sampler(&self) -> Option<SamplerHandle> {
        self.sampler
    }

    /// Non-identity matrix currently applied, if any.
    #[inline]
    pub fn active(&self) -> Option<Affine> {
        self.active
    }

    /// Parameters for opening a batch under the active transform.
    pub(crate) fn batch_params(&self, blend: BlendDescriptor) -> BatchParams {
        match self.active {
            Some(matrix) => BatchParams {
                blend,
                transform: Some(matrix),
                sampler: self.sampler,
            },
            None => BatchParams::plain(blend),
        }
    }

    /// Restarts the draw session with `matrix` applied.
    ///
    /// The identity reopens a plain batch with the live blend descriptor.
    /// Anything else also turns alpha-to-coverage off; identity does not turn
    /// it back on.
    pub(crate) fn set_transform<B: GraphicsBackend>(
        &mut self,
        matrix: Affine,
        stage: Stage<'_, B>,
    ) -> Result<()> {
        let Stage { backend, session, pipeline } = stage;

        if self.sampler.is_none() {
            let desc = SamplerDesc::anisotropic("lumen transform sampler", TRANSFORM_ANISOTROPY);
            let sampler = backend
                .create_sampler(&desc)
                .context("failed to create transform sampler")?;
            self.sampler = Some(sampler);
        }
        self.active = (matrix != Affine::IDENTITY).then_some(matrix);

        let this = &*self;
        session.suspend(backend, |backend| {
            if this.active.is_some() {
                pipeline.state_mut().blend.alpha_to_coverage = false;
                pipeline.push(backend);
            }
            this.batch_params(pipeline.blend())
        });

        log::trace!("transform -> {:?}", matrix.as_coeffs());
        Ok(())
    }

    /// Forgets the sampler and the matrix; the backend that owned them is gone.
    pub(crate) fn reset(&mut self) {
        self.sampler = None;
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::pipeline::PipelineStateCache;
    use crate::gfx::session::DrawSession;
    use crate::gfx::testing::{Call, RecordingBackend};

    fn rig() -> (RecordingBackend, DrawSession, PipelineStateCache) {
        let mut backend = RecordingBackend::default();
        let mut session = DrawSession::default();
        let mut pipeline = PipelineStateCache::default();
        session.attach(backend.create_batch().unwrap());
        pipeline.state_mut().blend.alpha_to_coverage = true;
        session.open(&mut backend, &BatchParams::plain(pipeline.blend()));
        backend.calls.clear();
        (backend, session, pipeline)
    }

    #[test]
    fn sampler_is_created_once() {
        let (mut backend, mut session, mut pipeline) = rig();
        let mut transform = TransformSession::default();

        for _ in 0..3 {
            transform
                .set_transform(
                    Affine::scale(2.0),
                    Stage { backend: &mut backend, session: &mut session, pipeline: &mut pipeline },
                )
                .unwrap();
        }

        assert_eq!(backend.count(|c| matches!(c, Call::CreateSampler(..))), 1);
        let Some(Call::CreateSampler(_, desc)) =
            backend.calls.iter().find(|c| matches!(c, Call::CreateSampler(..)))
        else {
            unreachable!()
        };
        assert_eq!(desc.max_anisotropy, 2);
    }

    #[test]
    fn non_identity_reopens_with_matrix_and_sampler() {
        let (mut backend, mut session, mut pipeline) = rig();
        let mut transform = TransformSession::default();
        let matrix = Affine::translate((10.0, 4.0)) * Affine::rotate(0.5);

        transform
            .set_transform(
                matrix,
                Stage { backend: &mut backend, session: &mut session, pipeline: &mut pipeline },
            )
            .unwrap();

        assert!(!pipeline.blend().alpha_to_coverage);
        let Some(Call::BeginBatch(_, params)) = backend.calls.last() else { unreachable!() };
        assert_eq!(params.transform, Some(matrix));
        assert_eq!(params.sampler, transform.sampler());
        assert!(!params.blend.alpha_to_coverage);
        assert_eq!(session.opened(), 2);
        assert_eq!(session.closed(), 1);
    }

    #[test]
    fn identity_reopens_plain_and_keeps_coverage() {
        let (mut backend, mut session, mut pipeline) = rig();
        let mut transform = TransformSession::default();

        transform
            .set_transform(
                Affine::IDENTITY,
                Stage { backend: &mut backend, session: &mut session, pipeline: &mut pipeline },
            )
            .unwrap();

        assert!(pipeline.blend().alpha_to_coverage);
        assert!(matches!(backend.calls[0], Call::CreateSampler(..)));
        assert!(matches!(backend.calls[1], Call::EndBatch(_)));
        let Some(Call::BeginBatch(_, params)) = backend.calls.last() else { unreachable!() };
        assert_eq!(*params, BatchParams::plain(pipeline.blend()));
    }

    #[test]
    fn reset_drops_the_sampler() {
        let (mut backend, mut session, mut pipeline) = rig();
        let mut transform = TransformSession::default();
        transform
            .set_transform(
                Affine::scale(0.5),
                Stage { backend: &mut backend, session: &mut session, pipeline: &mut pipeline },
            )
            .unwrap();

        transform.reset();
        assert!(transform.sampler().is_none());
        assert!(transform.active().is_none());
    }

    #[test]
    fn transform_set_while_closed_applies_to_the_next_open() {
        let (mut backend, mut session, mut pipeline) = rig();
        session.close(&mut backend);
        let mut transform = TransformSession::default();

        transform
            .set_transform(
                Affine::scale(2.0),
                Stage { backend: &mut backend, session: &mut session, pipeline: &mut pipeline },
            )
            .unwrap();
        assert!(!session.is_open());

        let params = transform.batch_params(pipeline.blend());
        assert_eq!(params.transform, Some(Affine::scale(2.0)));
        assert_eq!(params.sampler, transform.sampler());
        assert!(!params.blend.alpha_to_coverage);
    }

    #[test]
    fn identity_clears_the_active_transform() {
        let (mut backend, mut session, mut pipeline) = rig();
        let mut transform = TransformSession::default();

        for matrix in [Affine::rotate(1.0), Affine::IDENTITY] {
            transform
                .set_transform(
                    matrix,
                    Stage { backend: &mut backend, session: &mut session, pipeline: &mut pipeline },
                )
                .unwrap();
        }

        assert!(transform.active().is_none());
        assert_eq!(
            transform.batch_params(pipeline.blend()),
            BatchParams::plain(pipeline.blend())
        );
    }
}
