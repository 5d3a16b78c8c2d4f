use anyhow::Result;
use kurbo::Affine;
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::Fullscreen;

use lumen_engine::coords::{ColorRgba, Rect, Size};
use lumen_engine::core::{App, AppControl, FrameCtx};
use lumen_engine::logging::{LoggingConfig, init_logging};
use lumen_engine::window::{Runtime, RuntimeConfig};

/// Resolutions cycled with `R`.
const RESOLUTIONS: [Size; 3] = [
    Size::new(1280, 720),
    Size::new(960, 540),
    Size::new(640, 480),
];

/// Opacity steps cycled with `O`. `1.0` means no fading.
const OPACITIES: [f32; 4] = [1.0, 0.75, 0.5, 0.25];

const TILE: f32 = 48.0;

#[derive(Default)]
struct Studio {
    opacity_step: usize,
    blending: bool,
    rotating: bool,
    resolution_step: usize,

    // Requests recorded from input, applied at the start of the next frame.
    toggle_opacity: bool,
    toggle_blend: bool,
    toggle_full_screen: bool,
    next_resolution: bool,
    log_metrics: bool,
}

impl Studio {
    /// Returns `true` when the surface was rebuilt, which drops the acquired frame.
    fn apply_requests(&mut self, ctx: &mut FrameCtx<'_, '_>) -> Result<bool> {
        let mut rebuilt = false;

        if std::mem::take(&mut self.toggle_opacity) {
            self.opacity_step = (self.opacity_step + 1) % OPACITIES.len();
            ctx.gfx.set_opacity(OPACITIES[self.opacity_step]);
            log::info!("opacity {}", ctx.gfx.opacity());
        }

        if std::mem::take(&mut self.toggle_blend) {
            self.blending = !self.blending;
            ctx.gfx.set_blend(self.blending);
            log::info!("blend mode {:?}", ctx.gfx.blend_mode());
        }

        if std::mem::take(&mut self.toggle_full_screen) {
            if ctx.window.fullscreen().is_some() {
                ctx.toggle_full_screen()?;
                rebuilt = true;
            } else {
                // The resize event that follows marks the device for reset.
                ctx.window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            }
        }

        if std::mem::take(&mut self.next_resolution) {
            self.resolution_step = (self.resolution_step + 1) % RESOLUTIONS.len();
            let size = RESOLUTIONS[self.resolution_step];
            if ctx.set_resolution(size)? {
                rebuilt = true;
            } else {
                log::info!("already at {}x{}", size.width, size.height);
            }
        }

        if std::mem::take(&mut self.log_metrics) {
            let gpu = ctx.gfx.backend();
            log::info!(
                "{} | {:?} {}x msaa | {} sprite pipelines",
                ctx.gfx.metrics(),
                gpu.surface_format(),
                gpu.sample_count(),
                gpu.pipeline_count()
            );
        }
        Ok(rebuilt)
    }
}

impl App for Studio {
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let WindowEvent::KeyboardInput { event, .. } = event else {
            return AppControl::Continue;
        };
        if event.state != ElementState::Pressed || event.repeat {
            return AppControl::Continue;
        }

        match event.physical_key {
            PhysicalKey::Code(KeyCode::Escape) => return AppControl::Exit,
            PhysicalKey::Code(KeyCode::KeyO) => self.toggle_opacity = true,
            PhysicalKey::Code(KeyCode::KeyB) => self.toggle_blend = true,
            PhysicalKey::Code(KeyCode::KeyT) => self.rotating = !self.rotating,
            PhysicalKey::Code(KeyCode::F11) => self.toggle_full_screen = true,
            PhysicalKey::Code(KeyCode::KeyR) => self.next_resolution = true,
            PhysicalKey::Code(KeyCode::KeyM) => self.log_metrics = true,
            _ => {}
        }
        AppControl::Continue
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> Result<AppControl> {
        if self.apply_requests(ctx)? {
            return Ok(AppControl::Continue);
        }

        let (Some(poison), Some(scratch)) = (
            ctx.gfx.poison_texture().map(|t| t.handle),
            ctx.gfx.scratch_texture().map(|t| t.handle),
        ) else {
            return Ok(AppControl::Continue);
        };

        let size = ctx.client_size();
        let t = ctx.time.elapsed.as_secs_f64();

        ctx.gfx.begin_draw();

        // Scratch target: a checker of poison tiles.
        ctx.gfx.set_render_target(Some(scratch));
        ctx.gfx.clear(ColorRgba::new(0.1, 0.1, 0.12, 1.0));
        for row in 0..4 {
            for col in 0..4 {
                if (row + col) % 2 == 0 {
                    let dest = Rect::new(col as f32 * TILE, row as f32 * TILE, TILE, TILE);
                    ctx.gfx.draw(poison, dest, ColorRgba::white());
                }
            }
        }

        // Back buffer.
        ctx.gfx.set_render_target(None);
        ctx.gfx.clear(ColorRgba::cornflower_blue());

        let rotation = if self.rotating {
            let center = kurbo::Vec2::new(size.width as f64 / 2.0, size.height as f64 / 2.0);
            Affine::translate(center) * Affine::rotate(t * 0.5) * Affine::translate(-center)
        } else {
            Affine::IDENTITY
        };
        ctx.gfx.set_transform(rotation)?;

        let view = Rect::new(
            (size.width as f32 - TILE * 8.0) / 2.0,
            (size.height as f32 - TILE * 8.0) / 2.0,
            TILE * 8.0,
            TILE * 8.0,
        );
        ctx.gfx.draw_region(
            scratch,
            view,
            Some(Rect::new(0.0, 0.0, TILE * 4.0, TILE * 4.0)),
            ColorRgba::white(),
        );

        let pulse = (t.sin() * 0.5 + 0.5) as f32;
        ctx.gfx.draw(
            poison,
            Rect::new(16.0, 16.0, TILE * 2.0, TILE * 2.0),
            ColorRgba::new(1.0, pulse, 1.0 - pulse, 1.0),
        );

        ctx.gfx.set_transform(Affine::IDENTITY)?;
        ctx.gfx.end_draw();

        Ok(AppControl::Continue)
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    log::info!("keys: O opacity | B blend | T rotate | F11 full screen | R resolution | M metrics | Esc quit");

    Runtime::run(
        RuntimeConfig {
            title: "Lumen Studio".to_string(),
            ..Default::default()
        },
        Studio::default(),
    )
}
