//! Render pass, depth target and framebuffers for presenting to a swapchain.

use crate::error::{GpuError, Result};
use crate::handle::{device_handle, DeviceHandle};
use crate::memory::{GpuAllocator, GpuImage};
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// Depth buffer format.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Single-subpass render pass: one color attachment that ends up in
/// `PRESENT_SRC_KHR` and a transient depth attachment.
///
/// Color clears on load, depth clears on load and is discarded on store.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_render_pass(
    device: &Arc<ash::Device>,
    color_format: vk::Format,
) -> Result<DeviceHandle<vk::RenderPass>> {
    let attachments = [
        vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        vk::AttachmentDescription::default()
            .format(DEPTH_FORMAT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
    ];

    let color_ref = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };

    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_ref)
        .depth_stencil_attachment(&depth_ref);

    // Wait for the acquire semaphore stage and the previous frame's depth use.
    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        )
        .dst_stage_mask(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        )
        .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        );

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(std::slice::from_ref(&subpass))
        .dependencies(std::slice::from_ref(&dependency));

    let render_pass = unsafe { device.create_render_pass(&create_info, None) }
        .map_err(|e| GpuError::resource("render pass", e))?;
    Ok(unsafe { device_handle(device, render_pass) })
}

/// Depth image sized to the swapchain.
pub struct DepthTarget {
    view: DeviceHandle<vk::ImageView>,
    _image: GpuImage,
}

impl DepthTarget {
    /// Allocate a depth image and view.
    pub fn new(allocator: &GpuAllocator, extent: vk::Extent2D) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = allocator.create_image(&image_info, MemoryLocation::GpuOnly, "depth")?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image.image())
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(DEPTH_FORMAT)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::DEPTH)
                    .level_count(1)
                    .layer_count(1),
            );

        let device = allocator.device();
        let view = unsafe { device.create_image_view(&view_info, None) }
            .map_err(|e| GpuError::resource("depth image view", e))?;

        Ok(Self {
            view: unsafe { device_handle(device, view) },
            _image: image,
        })
    }

    /// Depth image view.
    pub fn view(&self) -> vk::ImageView {
        self.view.raw()
    }
}

/// One framebuffer per swapchain image view, all sharing `depth_view`.
///
/// # Safety
/// All handles must be valid and compatible with `render_pass`.
pub unsafe fn create_framebuffers(
    device: &Arc<ash::Device>,
    render_pass: vk::RenderPass,
    color_views: &[vk::ImageView],
    depth_view: vk::ImageView,
    extent: vk::Extent2D,
) -> Result<Vec<DeviceHandle<vk::Framebuffer>>> {
    color_views
        .iter()
        .map(|&color_view| {
            let attachments = [color_view, depth_view];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe { device.create_framebuffer(&create_info, None) }
                .map_err(|e| GpuError::resource("framebuffer", e))?;
            Ok(unsafe { device_handle(device, framebuffer) })
        })
        .collect()
}
