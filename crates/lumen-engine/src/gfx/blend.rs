//! Opacity/blend state machine.
//!
//! The live [`BlendDescriptor`] is a pure function of the last transition:
//! `set_opacity` and `set_blend` both rewrite it completely for their mode, and
//! the most recent call wins.
//!
//! Every transition closes the draw session before touching pipeline state and
//! reopens it afterwards (see `DrawSession::suspend`). Batch backends snapshot
//! state when a session opens, so an edit made mid-session would silently apply
//! to the wrong draws.

use wgpu::BlendFactor;

use crate::coords::ColorRgba;

use super::backend::{BatchParams, GraphicsBackend};
use super::session::Stage;
use super::target::RenderTargetRouter;

/// Blend configuration bound to the pipeline.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BlendDescriptor {
    pub alpha_to_coverage: bool,
    pub color_src: BlendFactor,
    pub color_dst: BlendFactor,
    pub alpha_src: BlendFactor,
    /// Device blend constant (`Constant` / `OneMinusConstant` factors).
    pub blend_factor: ColorRgba,
}

impl BlendDescriptor {
    /// Premultiplied alpha blend, fully opaque.
    pub const fn alpha_blend() -> Self {
        Self {
            alpha_to_coverage: false,
            color_src: BlendFactor::One,
            color_dst: BlendFactor::OneMinusSrcAlpha,
            alpha_src: BlendFactor::One,
            blend_factor: ColorRgba::white(),
        }
    }

    /// wgpu blend state. The alpha destination factor is fixed.
    pub fn to_wgpu(&self) -> wgpu::BlendState {
        wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: self.color_src,
                dst_factor: self.color_dst,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: self.alpha_src,
                dst_factor: BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
        }
    }

    fn apply_opacity(&mut self, opacity: Opacity) {
        match opacity {
            Opacity::Disabled => {
                self.alpha_to_coverage = false;
                self.color_src = BlendFactor::SrcAlpha;
                self.color_dst = BlendFactor::OneMinusSrcAlpha;
                self.alpha_src = BlendFactor::One;
                self.blend_factor = ColorRgba::white();
            }
            Opacity::Fade(v) => {
                self.alpha_to_coverage = true;
                self.color_src = BlendFactor::Constant;
                self.color_dst = BlendFactor::OneMinusConstant;
                self.alpha_src = BlendFactor::SrcAlpha;
                self.blend_factor = ColorRgba::splat(v);
            }
        }
    }

    fn apply_additive(&mut self, rate: f32, color_src_override: Option<BlendFactor>) {
        self.alpha_to_coverage = true;
        self.color_src = color_src_override.unwrap_or(BlendFactor::Constant);
        self.color_dst = BlendFactor::One;
        self.blend_factor = ColorRgba::splat(rate);
    }

    fn clear_additive(&mut self) {
        self.color_src = BlendFactor::One;
        self.color_dst = BlendFactor::OneMinusSrcAlpha;
        self.blend_factor = ColorRgba::white();
    }
}

impl Default for BlendDescriptor {
    fn default() -> Self {
        Self::alpha_blend()
    }
}

/// Decoded opacity.
///
/// Externally opacity stays a raw `f32` where anything `>= 1` or `< 0` means
/// "no fade". That encoding is kept for compatibility with existing callers;
/// internally it is decoded once into this enum.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Opacity {
    Disabled,
    Fade(f32),
}

impl Opacity {
    pub fn from_raw(value: f32) -> Self {
        if value >= 1.0 || value < 0.0 {
            Opacity::Disabled
        } else {
            Opacity::Fade(value)
        }
    }
}

/// Effective mode after the most recent transition.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum BlendMode {
    Opaque,
    Fading(f32),
    Blending {
        rate: f32,
        color_src_override: Option<BlendFactor>,
    },
}

/// Render state owned by the graphics manager.
///
/// Fields are private; the transition methods are the only mutation path.
#[derive(Debug, Clone)]
pub struct BlendStateMachine {
    opacity: f32,
    blending: bool,
    blend_rate: f32,
    mode: BlendMode,
}

impl Default for BlendStateMachine {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            blending: false,
            blend_rate: 1.0,
            mode: BlendMode::Opaque,
        }
    }
}

impl BlendStateMachine {
    /// Last recorded raw opacity (sentinel-encoded).
    #[inline]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    #[inline]
    pub fn blending(&self) -> bool {
        self.blending
    }

    #[inline]
    pub fn blend_rate(&self) -> f32 {
        self.blend_rate
    }

    #[inline]
    pub fn mode(&self) -> BlendMode {
        self.mode
    }

    /// Switches to fade mode (`0 <= value < 1`) or back to plain alpha blending.
    ///
    /// Equality with the recorded opacity is exact: values that differ only by
    /// float noise still trigger a full reconfiguration.
    ///
    /// Returns `false` when the call was a no-op.
    pub(crate) fn set_opacity<B: GraphicsBackend>(
        &mut self,
        value: f32,
        stage: Stage<'_, B>,
    ) -> bool {
        if self.opacity == value {
            return false;
        }

        let opacity = Opacity::from_raw(value);
        let Stage { backend, session, pipeline } = stage;

        session.suspend(backend, |backend| {
            let blend = &mut pipeline.state_mut().blend;
            blend.apply_opacity(opacity);
            backend.set_blend_factor(blend.blend_factor);
            pipeline.push(backend);
            BatchParams::plain(pipeline.blend())
        });

        self.opacity = value;
        self.mode = match opacity {
            Opacity::Disabled => BlendMode::Opaque,
            Opacity::Fade(v) => BlendMode::Fading(v),
        };
        log::debug!("opacity set to {value} ({:?})", self.mode);
        true
    }

    /// Enables or disables additive blending.
    ///
    /// The recorded blend rate is reset to `1` on every effective call,
    /// whatever `rate` was passed; `rate` only feeds the device blend factor.
    ///
    /// Returns `false` when `enabled` already matches the recorded flag.
    pub(crate) fn set_blend<B: GraphicsBackend>(
        &mut self,
        enabled: bool,
        rate: f32,
        color_src_override: Option<BlendFactor>,
        router: &RenderTargetRouter,
        stage: Stage<'_, B>,
    ) -> bool {
        if self.blending == enabled {
            return false;
        }

        self.blending = enabled;
        self.blend_rate = 1.0;

        let Stage { backend, session, pipeline } = stage;

        session.suspend(backend, |backend| {
            let blend = &mut pipeline.state_mut().blend;
            if enabled {
                blend.apply_additive(rate, color_src_override);
            } else {
                blend.clear_additive();
            }
            backend.set_blend_factor(blend.blend_factor);
            pipeline.push(backend);
            router.rebind(backend);
            BatchParams::plain(pipeline.blend())
        });

        self.mode = if enabled {
            BlendMode::Blending { rate, color_src_override }
        } else {
            BlendMode::Opaque
        };
        log::debug!("blending {} (rate {rate})", if enabled { "enabled" } else { "disabled" });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::pipeline::PipelineStateCache;
    use crate::gfx::session::DrawSession;
    use crate::gfx::testing::{Call, RecordingBackend};

    struct Rig {
        backend: RecordingBackend,
        session: DrawSession,
        pipeline: PipelineStateCache,
        router: RenderTargetRouter,
        state: BlendStateMachine,
    }

    impl Rig {
        fn open() -> Self {
            let mut backend = RecordingBackend::default();
            let mut session = DrawSession::default();
            let batch = backend.create_batch().unwrap();
            session.attach(batch);
            let pipeline = PipelineStateCache::default();
            session.open(&mut backend, &BatchParams::plain(pipeline.blend()));
            backend.calls.clear();
            Self {
                backend,
                session,
                pipeline,
                router: RenderTargetRouter::default(),
                state: BlendStateMachine::default(),
            }
        }

        fn set_opacity(&mut self, v: f32) -> bool {
            let Rig { backend, session, pipeline, state, .. } = self;
            state.set_opacity(v, Stage { backend, session, pipeline })
        }

        fn set_blend(&mut self, enabled: bool, rate: f32, ovr: Option<BlendFactor>) -> bool {
            let Rig { backend, session, pipeline, router, state } = self;
            state.set_blend(enabled, rate, ovr, router, Stage { backend, session, pipeline })
        }
    }

    #[test]
    fn raw_opacity_sentinel_decodes() {
        assert_eq!(Opacity::from_raw(1.0), Opacity::Disabled);
        assert_eq!(Opacity::from_raw(7.5), Opacity::Disabled);
        assert_eq!(Opacity::from_raw(-0.01), Opacity::Disabled);
        assert_eq!(Opacity::from_raw(0.0), Opacity::Fade(0.0));
        assert_eq!(Opacity::from_raw(0.999), Opacity::Fade(0.999));
    }

    #[test]
    fn each_effective_opacity_change_restarts_the_session_once() {
        let mut rig = Rig::open();

        assert!(rig.set_opacity(0.5));
        assert!(!rig.set_opacity(0.5));
        assert!(rig.set_opacity(0.25));
        assert!(rig.set_opacity(1.0));
        assert!(!rig.set_opacity(1.0));

        assert_eq!(rig.backend.count(|c| matches!(c, Call::EndBatch(_))), 3);
        assert_eq!(rig.backend.count(|c| matches!(c, Call::BeginBatch(..))), 3);
        assert_eq!(rig.session.opened(), 4);
        assert_eq!(rig.session.closed(), 3);
        assert!(rig.session.is_open());
    }

    #[test]
    fn half_opacity_uses_constant_factor() {
        let mut rig = Rig::open();
        rig.set_opacity(0.5);

        let blend = rig.pipeline.blend();
        assert!(blend.alpha_to_coverage);
        assert_eq!(blend.color_src, BlendFactor::Constant);
        assert_eq!(blend.color_dst, BlendFactor::OneMinusConstant);
        assert_eq!(blend.alpha_src, BlendFactor::SrcAlpha);
        assert_eq!(blend.blend_factor, ColorRgba::new(0.5, 0.5, 0.5, 0.5));
        assert_eq!(rig.backend.last_blend_factor(), Some(ColorRgba::splat(0.5)));
        assert_eq!(rig.state.mode(), BlendMode::Fading(0.5));
    }

    #[test]
    fn out_of_range_opacity_always_yields_the_disabled_descriptor() {
        for v in [-1.0, -0.001, 1.0, 3.0] {
            let mut rig = Rig::open();
            rig.set_blend(true, 0.3, Some(BlendFactor::SrcAlpha));
            rig.set_opacity(0.4);
            rig.set_opacity(v);

            let blend = rig.pipeline.blend();
            assert!(!blend.alpha_to_coverage, "v = {v}");
            assert_eq!(blend.color_src, BlendFactor::SrcAlpha);
            assert_eq!(blend.color_dst, BlendFactor::OneMinusSrcAlpha);
            assert_eq!(blend.alpha_src, BlendFactor::One);
            assert_eq!(blend.blend_factor, ColorRgba::white());
            assert_eq!(rig.state.mode(), BlendMode::Opaque);
        }
    }

    #[test]
    fn opacity_restart_brackets_pipeline_edits() {
        let mut rig = Rig::open();
        rig.set_opacity(0.5);

        let calls = &rig.backend.calls;
        let end = calls.iter().position(|c| matches!(c, Call::EndBatch(_))).unwrap();
        let push = calls.iter().position(|c| matches!(c, Call::ApplyPipeline(_))).unwrap();
        let factor = calls.iter().position(|c| matches!(c, Call::SetBlendFactor(_))).unwrap();
        let begin = calls.iter().position(|c| matches!(c, Call::BeginBatch(..))).unwrap();
        assert!(end < factor && factor < push && push < begin);

        let Some(Call::BeginBatch(_, params)) = calls.get(begin) else { unreachable!() };
        assert_eq!(params.blend, rig.pipeline.blend());
    }

    #[test]
    fn repeated_enable_is_a_no_op() {
        let mut rig = Rig::open();
        assert!(rig.set_blend(true, 1.0, None));
        let calls = rig.backend.calls.len();
        let opened = rig.session.opened();

        assert!(!rig.set_blend(true, 0.2, None));

        assert_eq!(rig.backend.calls.len(), calls);
        assert_eq!(rig.session.opened(), opened);
        assert!(rig.state.blending());
    }

    #[test]
    fn enabling_uses_rate_and_override() {
        let mut rig = Rig::open();
        rig.set_blend(true, 0.3, Some(BlendFactor::SrcAlpha));

        let blend = rig.pipeline.blend();
        assert!(blend.alpha_to_coverage);
        assert_eq!(blend.color_src, BlendFactor::SrcAlpha);
        assert_eq!(blend.color_dst, BlendFactor::One);
        assert_eq!(blend.blend_factor, ColorRgba::splat(0.3));
        assert_eq!(rig.state.blend_rate(), 1.0);
        assert_eq!(
            rig.state.mode(),
            BlendMode::Blending { rate: 0.3, color_src_override: Some(BlendFactor::SrcAlpha) }
        );
    }

    #[test]
    fn enabling_without_override_uses_the_blend_factor() {
        let mut rig = Rig::open();
        rig.set_blend(true, 0.6, None);
        assert_eq!(rig.pipeline.blend().color_src, BlendFactor::Constant);
    }

    #[test]
    fn disabling_resets_rate_and_restores_alpha_blend() {
        let mut rig = Rig::open();
        rig.set_blend(true, 0.3, None);
        rig.set_blend(false, 0.7, None);

        assert_eq!(rig.state.blend_rate(), 1.0);
        let blend = rig.pipeline.blend();
        assert_eq!(blend.color_src, BlendFactor::One);
        assert_eq!(blend.color_dst, BlendFactor::OneMinusSrcAlpha);
        assert_eq!(blend.blend_factor, ColorRgba::white());
        assert_eq!(rig.backend.last_blend_factor(), Some(ColorRgba::white()));
    }

    #[test]
    fn blend_switch_rebinds_current_target_before_reopening() {
        let mut rig = Rig::open();
        rig.set_blend(true, 1.0, None);

        let calls = &rig.backend.calls;
        let bind = calls.iter().position(|c| matches!(c, Call::BindTarget(_))).unwrap();
        let begin = calls.iter().position(|c| matches!(c, Call::BeginBatch(..))).unwrap();
        assert!(bind < begin);
        assert_eq!(calls[bind], Call::BindTarget(crate::gfx::RenderTargetBinding::BackBuffer));
    }

    #[test]
    fn closed_session_stays_closed_across_transitions() {
        let mut rig = Rig::open();
        let batch = rig.session.batch();
        rig.session.close(&mut rig.backend);
        rig.backend.calls.clear();

        assert!(rig.set_opacity(0.5));
        assert!(!rig.session.is_open());
        assert_eq!(rig.backend.count(|c| matches!(c, Call::BeginBatch(..))), 0);

        let params = BatchParams::plain(rig.pipeline.blend());
        rig.session.open(&mut rig.backend, &params);
        assert!(rig.session.is_open());
        assert_eq!(rig.session.batch(), batch);
        let Some(Call::BeginBatch(_, reopened)) = rig.backend.calls.last() else { unreachable!() };
        assert_eq!(reopened.blend.blend_factor, ColorRgba::splat(0.5));
    }
}
