//! Scene renderer: rasterizer, frame slots and scheduler bound to one device.

use crate::context::RenderContext;
use crate::error::Result;
use crate::frame::FrameSlots;
use crate::rasterizer::{frame_set_layout, Rasterizer};
use crate::scene::GpuScene;
use crate::scheduler::{FrameBackend, FrameOutcome, FrameScheduler};
use crate::uniforms::FrameUniforms;
use ash::vk;
use std::sync::Arc;
use vkrt_accel::SceneAccelerationStructure;
use vkrt_core::constants::MAX_FRAMES_IN_FLIGHT;
use vkrt_gpu::{
    begin_command_buffer, end_command_buffer, reset_fence, submit_command_buffers,
    wait_for_fence, GpuContext, GpuError, Swapchain, TransferContext, FENCE_TIMEOUT_NS,
};

/// Draws an uploaded scene into a swapchain.
pub struct Renderer {
    scheduler: FrameScheduler,
    slots: FrameSlots,
    rasterizer: Rasterizer,
    scene: GpuScene,
    device: Arc<ash::Device>,
    queue: vk::Queue,
}

impl Renderer {
    /// Create the rasterizer and frame slots for `swapchain`.
    ///
    /// Presentation goes through the graphics queue, which the caller must have
    /// checked supports the swapchain's surface.
    pub fn new(gpu: &GpuContext, swapchain: &Swapchain, scene: GpuScene) -> Result<Self> {
        let allocator = gpu.allocator();
        let rasterizer = Rasterizer::new(allocator, swapchain)?;
        let pool_sizes = frame_set_layout().pool_sizes(MAX_FRAMES_IN_FLIGHT as u32);
        let slots = FrameSlots::new(
            allocator,
            gpu.graphics_queue_family(),
            rasterizer.descriptor_set_layout(),
            &pool_sizes,
        )?;

        tracing::info!(
            frames_in_flight = slots.len(),
            swapchain_images = swapchain.image_count(),
            "Renderer created"
        );

        Ok(Self {
            scheduler: FrameScheduler::new(),
            slots,
            rasterizer,
            scene,
            device: Arc::clone(gpu.device_arc()),
            queue: gpu.graphics_queue(),
        })
    }

    pub fn scene(&self) -> &GpuScene {
        &self.scene
    }

    pub fn frame_counter(&self) -> u64 {
        self.scheduler.frame_counter()
    }

    /// Build the bottom-level structures for every mesh and one top-level
    /// structure over every instance.
    pub fn build_acceleration_structures(
        &self,
        gpu: &GpuContext,
        transfer: &TransferContext,
        batch_budget: u64,
        ctx: &RenderContext,
    ) -> Result<SceneAccelerationStructure> {
        let _span = ctx.span().enter();
        let structures = vkrt_accel::build_scene(
            gpu,
            transfer,
            batch_budget,
            &self.scene.build_inputs(),
            self.scene.instances(),
        )?;
        Ok(structures)
    }

    /// Render and present one frame with the camera in `ctx`.
    pub fn render_frame(&mut self, swapchain: &Swapchain, ctx: &RenderContext) -> Result<FrameOutcome> {
        let _span = ctx.span().enter();

        let mut backend = VulkanFrame {
            device: &self.device,
            queue: self.queue,
            swapchain,
            slots: &self.slots,
            rasterizer: &self.rasterizer,
            scene: &self.scene,
            uniforms: FrameUniforms::new(&ctx.camera, ctx.model_scale),
        };
        Ok(self.scheduler.render_frame(&mut backend)?)
    }

    /// Rebuild depth and framebuffers for a recreated swapchain.
    ///
    /// The caller must have drained the device.
    pub fn recreate_targets(&mut self, gpu: &GpuContext, swapchain: &Swapchain) -> Result<()> {
        self.rasterizer.recreate_targets(gpu.allocator(), swapchain)?;
        tracing::debug!(
            width = swapchain.extent.width,
            height = swapchain.extent.height,
            "Render targets recreated"
        );
        Ok(())
    }

    /// Block until every slot's last submission has finished.
    ///
    /// Skips a fence left reset by a failed submit, which nothing would signal.
    pub fn wait_all(&self) -> Result<()> {
        for slot in self.scheduler.waitable_slots() {
            let fence = self.slots.get(slot).fence();
            unsafe { wait_for_fence(&self.device, fence, FENCE_TIMEOUT_NS)? };
        }
        Ok(())
    }
}

/// One frame's view of the renderer's Vulkan objects.
struct VulkanFrame<'a> {
    device: &'a ash::Device,
    queue: vk::Queue,
    swapchain: &'a Swapchain,
    slots: &'a FrameSlots,
    rasterizer: &'a Rasterizer,
    scene: &'a GpuScene,
    uniforms: FrameUniforms,
}

impl FrameBackend for VulkanFrame<'_> {
    type Error = GpuError;

    fn wait_for_slot(&mut self, slot: usize) -> vkrt_gpu::Result<()> {
        let fence = self.slots.get(slot).fence();
        unsafe { wait_for_fence(self.device, fence, FENCE_TIMEOUT_NS) }
    }

    fn write_uniforms(&mut self, slot: usize) -> vkrt_gpu::Result<()> {
        self.slots.get(slot).write_uniforms(&self.uniforms)
    }

    fn acquire_image(&mut self, slot: usize) -> vkrt_gpu::Result<Option<(u32, bool)>> {
        let semaphore = self.slots.get(slot).image_available.raw();
        unsafe { self.swapchain.acquire_next_image(semaphore, FENCE_TIMEOUT_NS) }
    }

    fn reset_fence(&mut self, slot: usize) -> vkrt_gpu::Result<()> {
        unsafe { reset_fence(self.device, self.slots.get(slot).fence()) }
    }

    fn record(&mut self, slot: usize, image_index: u32) -> vkrt_gpu::Result<()> {
        let frame = self.slots.get(slot);
        let cmd = frame.command_buffer();
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
            begin_command_buffer(self.device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
            self.rasterizer.record(
                cmd,
                image_index,
                self.swapchain.extent,
                frame.descriptor_set(),
                self.scene,
            )?;
            end_command_buffer(self.device, cmd)
        }
    }

    fn submit(&mut self, slot: usize) -> vkrt_gpu::Result<()> {
        let frame = self.slots.get(slot);
        unsafe {
            submit_command_buffers(
                self.device,
                self.queue,
                &[frame.command_buffer()],
                &[frame.image_available.raw()],
                &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
                &[frame.render_finished.raw()],
                frame.fence(),
            )
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> vkrt_gpu::Result<bool> {
        let render_finished = self.slots.get(slot).render_finished.raw();
        unsafe { self.swapchain.present(self.queue, image_index, &[render_finished]) }
    }
}
