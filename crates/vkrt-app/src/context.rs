//! Application context: every GPU object of one viewing session.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use ash::vk;
use glam::Vec3;
use raw_window_handle::HasDisplayHandle;
use tracing::{info, warn};
use vkrt_accel::SceneAccelerationStructure;
use vkrt_core::SceneDescription;
use vkrt_gpu::{GpuContext, GpuContextBuilder, GpuError, SurfaceContext, Swapchain, TransferContext};
use vkrt_render::{Camera, GpuScene, RenderContext, Renderer};
use winit::event::WindowEvent;
use winit::window::Window;

use crate::config::AppConfig;
use crate::input::InputState;

/// Owns the window's GPU state for the whole session.
///
/// Fields drop top to bottom, after [`Drop`] has drained the device, so GPU
/// objects go before the device that created them.
pub struct AppContext {
    acceleration: SceneAccelerationStructure,
    renderer: Renderer,
    swapchain: Swapchain,
    surface: SurfaceContext,
    gpu: GpuContext,
    window: Arc<Window>,
    render_ctx: RenderContext,
    input: InputState,
    camera_speed: f32,
    vsync: bool,
    swapchain_stale: bool,
    last_frame_time: Instant,
}

impl AppContext {
    /// Create the GPU context, surface and swapchain for `window`, upload
    /// `scene` and build its acceleration structures.
    ///
    /// A device without acceleration-structure support is an error; there is
    /// no rasterization-only mode.
    pub fn new(window: Arc<Window>, config: &AppConfig, scene: &SceneDescription) -> anyhow::Result<Self> {
        let display = window
            .display_handle()
            .context("window has no display handle")?
            .as_raw();
        let gpu = GpuContextBuilder::new()
            .app_name(&config.title)
            .validation(config.validation)
            .display(display)
            .build()
            .context("failed to create GPU context")?;

        // SAFETY: the context was built for this window's display and the
        // surface is dropped before the window.
        let surface = unsafe { SurfaceContext::from_window(&gpu, window.as_ref())? };
        if !surface.supports_present(&gpu)? {
            return Err(
                anyhow::Error::new(GpuError::Presentation(vk::Result::ERROR_INCOMPATIBLE_DISPLAY_KHR))
                    .context("graphics queue cannot present to the window surface"),
            );
        }

        if !gpu.acceleration_structure_enabled() {
            return Err(GpuError::ExtensionNotSupported(
                "VK_KHR_acceleration_structure".to_string(),
            )
            .into());
        }

        let size = window.inner_size();
        let swapchain = unsafe {
            surface.create_swapchain(
                &gpu,
                size.width.max(1),
                size.height.max(1),
                config.vsync,
                None,
            )?
        };
        info!(
            width = swapchain.extent.width,
            height = swapchain.extent.height,
            images = swapchain.image_count(),
            "Swapchain created"
        );

        // SAFETY: the graphics queue belongs to the graphics family.
        let transfer = unsafe {
            TransferContext::new(gpu.allocator(), gpu.graphics_queue_family(), gpu.graphics_queue())?
        };

        let gpu_scene = GpuScene::upload(&transfer, scene)
            .context("failed to upload scene")?;
        let renderer = Renderer::new(&gpu, &swapchain, gpu_scene)?;

        let render_ctx = RenderContext::new(
            framing_camera(scene, config.model_scale, &swapchain),
            &config.title,
        )
        .with_model_scale(config.model_scale);

        let acceleration = renderer
            .build_acceleration_structures(&gpu, &transfer, config.batch_budget, &render_ctx)
            .context("failed to build acceleration structures")?;
        info!(
            bottom_level = acceleration.bottom_level().len(),
            instances = acceleration.top_level().instance_count(),
            total_bytes = acceleration.total_size(),
            "Acceleration structures built"
        );

        Ok(Self {
            acceleration,
            renderer,
            swapchain,
            surface,
            gpu,
            window,
            render_ctx,
            input: InputState::new(),
            camera_speed: config.camera_speed,
            vsync: config.vsync,
            swapchain_stale: false,
            last_frame_time: Instant::now(),
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn camera(&self) -> &Camera {
        &self.render_ctx.camera
    }

    pub fn acceleration_structures(&self) -> &SceneAccelerationStructure {
        &self.acceleration
    }

    pub fn frame_count(&self) -> u64 {
        self.renderer.frame_counter()
    }

    /// Route a window event to the input state or the swapchain.
    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        if let WindowEvent::Resized(size) = event {
            tracing::debug!(width = size.width, height = size.height, "Window resized");
            self.swapchain_stale = true;
        }
        self.input.process_window_event(event);
    }

    /// Update the camera and render one frame.
    ///
    /// Does nothing while the window has no area.
    pub fn render_frame(&mut self) -> anyhow::Result<()> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;

        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }

        if self.swapchain_stale {
            self.recreate_swapchain(size.width, size.height)?;
        }

        self.input
            .update_camera(&mut self.render_ctx.camera, self.camera_speed, dt);
        self.render_ctx
            .camera
            .set_aspect(aspect_ratio(self.swapchain.extent));

        let outcome = self.renderer.render_frame(&self.swapchain, &self.render_ctx)?;
        if outcome.needs_recreate() {
            self.swapchain_stale = true;
        }
        Ok(())
    }

    /// Drain the device, then rebuild the swapchain and everything sized by it.
    fn recreate_swapchain(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        self.gpu.wait_idle()?;
        // SAFETY: the device is idle, so no image of the old swapchain is in use.
        unsafe {
            self.surface
                .recreate_swapchain(&self.gpu, &mut self.swapchain, width, height, self.vsync)?;
        }
        self.renderer.recreate_targets(&self.gpu, &self.swapchain)?;
        self.swapchain_stale = false;

        info!(
            width = self.swapchain.extent.width,
            height = self.swapchain.extent.height,
            "Swapchain recreated"
        );
        Ok(())
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        if let Err(e) = self.renderer.wait_all() {
            warn!("Failed to wait for in-flight frames: {e}");
        }
        if let Err(e) = self.gpu.wait_idle() {
            warn!("Failed to wait idle: {e}");
        }
        info!(frames = self.renderer.frame_counter(), "Session closed");
    }
}

fn aspect_ratio(extent: vk::Extent2D) -> f32 {
    extent.width as f32 / extent.height.max(1) as f32
}

/// Camera in front of the scaled scene, looking at its center.
fn framing_camera(scene: &SceneDescription, model_scale: f32, swapchain: &Swapchain) -> Camera {
    let aspect = aspect_ratio(swapchain.extent);
    let bounds = scene.bounds();
    if bounds.is_empty() {
        let mut camera = Camera::default();
        camera.set_aspect(aspect);
        return camera;
    }

    let center = bounds.center() * model_scale;
    let radius = (bounds.size().length() * model_scale * 0.5).max(0.01);
    let position = center + Vec3::new(0.0, radius * 0.5, radius * 2.0);
    Camera::looking_at(position, center, aspect)
}
