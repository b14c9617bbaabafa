//! Logging setup and the winit event loop.

use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vkrt_core::SceneDescription;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::config::AppConfig;
use crate::context::AppContext;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// `info` filter.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Load the configured scene and show it until the window is closed.
///
/// Any failure stops the event loop and is returned; the caller logs it.
pub fn run(config: AppConfig) -> anyhow::Result<()> {
    config.validate()?;
    info!(scene = %config.scene_path.display(), "{} starting", config.title);

    let scene = vkrt_scene::load_gltf(&config.scene_path)
        .with_context(|| format!("failed to load {}", config.scene_path.display()))?;

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner {
        config,
        scene,
        state: None,
        error: None,
    };
    event_loop.run_app(&mut runner).context("event loop error")?;

    match runner.error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

struct AppRunner {
    config: AppConfig,
    scene: SceneDescription,
    state: Option<AppContext>,
    error: Option<anyhow::Error>,
}

impl AppRunner {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppContext> {
        let attributes = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(attributes)?);

        AppContext::new(window, &self.config, &self.scene)
    }

    /// Record the first fatal error and shut down.
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        // Dropping the context drains the device before releasing anything.
        self.state = None;
        self.error.get_or_insert(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for AppRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() || self.error.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                info!("Viewer ready");
                self.state = Some(state);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.state = None;
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = state.render_frame() {
                    self.fail(event_loop, e);
                }
            }
            other => state.handle_window_event(&other),
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window().request_redraw();
        }
    }
}
