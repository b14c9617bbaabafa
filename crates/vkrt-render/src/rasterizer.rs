//! Forward rasterizer: render pass, mesh pipeline, depth and framebuffers.

use crate::mesh::vertex_input_layout;
use crate::scene::GpuScene;
use crate::uniforms::InstancePushConstants;
use ash::vk;
use std::sync::Arc;
use vkrt_gpu::{
    create_framebuffers, create_render_pass, DepthTarget, DescriptorSetLayoutBuilder,
    DeviceHandle, GpuAllocator, GraphicsPipeline, GraphicsPipelineConfig, Result, Swapchain,
};

/// Descriptor layout shared by the pipeline and every frame slot.
pub fn frame_set_layout() -> DescriptorSetLayoutBuilder<'static> {
    DescriptorSetLayoutBuilder::new().uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
}

/// Everything needed to draw the scene into a swapchain image.
///
/// Depth and framebuffers follow the swapchain extent and are rebuilt with
/// [`Rasterizer::recreate_targets`].
pub struct Rasterizer {
    // Field order is drop order: framebuffers before the views they use.
    framebuffers: Vec<DeviceHandle<vk::Framebuffer>>,
    depth: DepthTarget,
    pipeline: GraphicsPipeline,
    set_layout: DeviceHandle<vk::DescriptorSetLayout>,
    render_pass: DeviceHandle<vk::RenderPass>,
    device: Arc<ash::Device>,
}

impl Rasterizer {
    /// Build the render pass and pipeline for `swapchain`'s format, then its targets.
    pub fn new(allocator: &GpuAllocator, swapchain: &Swapchain) -> Result<Self> {
        let device = Arc::clone(allocator.device());

        let render_pass = unsafe { create_render_pass(&device, swapchain.format)? };
        let set_layout = unsafe { frame_set_layout().build(&device)? };

        let (vertex_bindings, vertex_attributes) = vertex_input_layout();
        let config = GraphicsPipelineConfig {
            vertex_shader: vkrt_shaders::mesh_vertex_shader().to_vec(),
            fragment_shader: vkrt_shaders::mesh_fragment_shader().to_vec(),
            vertex_bindings,
            vertex_attributes,
            cull_mode: vk::CullModeFlags::NONE,
            ..Default::default()
        };
        let push_ranges = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: InstancePushConstants::SIZE,
        }];
        let pipeline = unsafe {
            GraphicsPipeline::new(
                &device,
                &config,
                render_pass.raw(),
                &[set_layout.raw()],
                &push_ranges,
            )?
        };

        let depth = DepthTarget::new(allocator, swapchain.extent)?;
        let framebuffers = unsafe {
            create_framebuffers(
                &device,
                render_pass.raw(),
                &swapchain.image_views(),
                depth.view(),
                swapchain.extent,
            )?
        };

        tracing::debug!(
            width = swapchain.extent.width,
            height = swapchain.extent.height,
            framebuffers = framebuffers.len(),
            "Rasterizer created"
        );

        Ok(Self {
            framebuffers,
            depth,
            pipeline,
            set_layout,
            render_pass,
            device,
        })
    }

    /// Replace depth and framebuffers after the swapchain was recreated.
    ///
    /// The GPU must no longer use the old targets.
    pub fn recreate_targets(&mut self, allocator: &GpuAllocator, swapchain: &Swapchain) -> Result<()> {
        // Old framebuffers reference the old depth view; release them first.
        self.framebuffers.clear();
        self.depth = DepthTarget::new(allocator, swapchain.extent)?;
        self.framebuffers = unsafe {
            create_framebuffers(
                &self.device,
                self.render_pass.raw(),
                &swapchain.image_views(),
                self.depth.view(),
                swapchain.extent,
            )?
        };
        Ok(())
    }

    pub fn descriptor_set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout.raw()
    }

    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Record the scene pass into swapchain image `image_index`.
    ///
    /// # Safety
    /// `cmd` must be recording and `descriptor_set` must match the frame layout.
    pub unsafe fn record(
        &self,
        cmd: vk::CommandBuffer,
        image_index: u32,
        extent: vk::Extent2D,
        descriptor_set: vk::DescriptorSet,
        scene: &GpuScene,
    ) -> Result<()> {
        let framebuffer = self
            .framebuffers
            .get(image_index as usize)
            .ok_or_else(|| {
                vkrt_gpu::GpuError::InvalidState(format!("No framebuffer for image {image_index}"))
            })?
            .raw();

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass.raw())
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        let device = &self.device;
        unsafe {
            device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline());
            device.cmd_set_viewport(cmd, 0, &[viewport]);
            device.cmd_set_scissor(cmd, 0, &[render_area]);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout(),
                0,
                &[descriptor_set],
                &[],
            );
            let drawn = scene.record_draws(device, cmd, self.pipeline.layout());
            device.cmd_end_render_pass(cmd);
            drawn
        }
    }
}
