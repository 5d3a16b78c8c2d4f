use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::coords::Size;
use crate::core::{App, AppControl, FrameCtx};
use crate::device::{Gpu, GraphicsConfig};
use crate::gfx::GraphicsManager;
use crate::time::FrameClock;

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub graphics: GraphicsConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "lumen".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            graphics: GraphicsConfig::default(),
        }
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens one window, drives `app` until it exits, then unloads graphics.
    ///
    /// The first error raised by the graphics layer or by `app` ends the loop
    /// and is returned here.
    pub fn run<A>(config: RuntimeConfig, app: A) -> Result<()>
    where
        A: 'static + App,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(config, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        match state.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[self_referencing]
struct WindowEntry {
    clock: FrameClock,

    window: Window,

    #[borrows(window)]
    #[covariant]
    gfx: GraphicsManager<Gpu<'this>>,
}

struct AppState<A>
where
    A: App + 'static,
{
    config: RuntimeConfig,
    app: A,

    window: Option<WindowEntry>,
    error: Option<anyhow::Error>,
    exit_requested: bool,
}

impl<A> AppState<A>
where
    A: App + 'static,
{
    fn new(config: RuntimeConfig, app: A) -> Self {
        Self {
            config,
            app,
            window: None,
            error: None,
            exit_requested: false,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        if self.error.is_none() {
            self.error = Some(err);
        }
        self.request_exit(event_loop);
    }

    /// Drops the window entry (unloading graphics) and stops the loop.
    fn request_exit(&mut self, event_loop: &ActiveEventLoop) {
        self.exit_requested = true;
        self.window = None;
        event_loop.exit();
    }

    fn create_window_entry(&self, event_loop: &ActiveEventLoop) -> Result<WindowEntry> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let graphics = &self.config.graphics;

        WindowEntryTryBuilder {
            clock: FrameClock::default(),
            window,
            gfx_builder: |window| create_graphics(window, graphics),
        }
        .try_build()
    }

    fn redraw(&mut self) -> Result<AppControl> {
        let (app, entry) = (&mut self.app, &mut self.window);
        let Some(entry) = entry.as_mut() else {
            return Ok(AppControl::Continue);
        };

        entry.with_mut(|fields| -> Result<AppControl> {
            let window: &Window = fields.window;
            let gfx = fields.gfx;

            // Minimized: nothing to draw into until the client area comes back.
            if Size::from(window.inner_size()).is_empty() {
                return Ok(AppControl::Continue);
            }

            // A reset skipped while minimized leaves nothing loaded.
            if gfx.device_lost() || !gfx.is_loaded() {
                gfx.attempt_reset(window)?;
            }
            if !gfx.begin_frame()? {
                return Ok(AppControl::Continue);
            }

            let time = fields.clock.tick();
            let control = {
                let mut ctx = FrameCtx {
                    window,
                    gfx: &mut *gfx,
                    time,
                };
                app.on_frame(&mut ctx)?
            };

            window.pre_present_notify();
            gfx.end_frame();
            Ok(control)
        })
    }
}

/// Binds a manager to the window and performs the initial device reset.
fn create_graphics<'w>(
    window: &'w Window,
    config: &GraphicsConfig,
) -> Result<GraphicsManager<Gpu<'w>>> {
    let gpu = pollster::block_on(Gpu::new(window, config))
        .context("GPU initialization failed for window")?;
    let mut gfx = GraphicsManager::create(gpu, window, config.surface);
    gfx.attempt_reset(window)?;
    Ok(gfx)
}

impl<A> ApplicationHandler for AppState<A>
where
    A: App + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.exit_requested {
            return;
        }

        match self.create_window_entry(event_loop) {
            Ok(entry) => {
                entry.with_window(|w| w.request_redraw());
                self.window = Some(entry);
            }
            Err(err) => self.fail(event_loop, err.context("failed to create initial window")),
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw.
        if let Some(entry) = &self.window {
            entry.with_window(|w| w.request_redraw());
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        if self.app.on_window_event(&event) == AppControl::Exit {
            self.request_exit(event_loop);
            return;
        }

        match &event {
            WindowEvent::CloseRequested => self.request_exit(event_loop),

            WindowEvent::Resized(new_size) => {
                if let Some(entry) = self.window.as_mut() {
                    entry.with_gfx_mut(|gfx| gfx.notify_resized((*new_size).into()));
                    entry.with_window(|w| w.request_redraw());
                }
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(entry) = self.window.as_mut() {
                    let new_size = entry.with_window(|w| w.inner_size());
                    entry.with_gfx_mut(|gfx| gfx.notify_resized(new_size.into()));
                    entry.with_window(|w| w.request_redraw());
                }
            }

            WindowEvent::RedrawRequested => match self.redraw() {
                Ok(AppControl::Continue) => {}
                Ok(AppControl::Exit) => self.request_exit(event_loop),
                Err(err) => self.fail(event_loop, err),
            },

            _ => {}
        }
    }
}
