//! Vulkan abstraction layer for the vkrt scene loader.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - GPU capability detection
//! - Memory allocation via gpu-allocator
//! - A generic owned-handle primitive for every destroyable Vulkan object
//! - Command buffer management and one-shot submission
//! - Staged uploads into device-local buffers
//! - Swapchain, render pass and pipeline handling

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod handle;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod render_pass;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod upload;

pub use capabilities::{AccelerationStructureLimits, GpuCapabilities, GpuVendor};
pub use command::{
    begin_command_buffer, end_command_buffer, submit_and_wait, submit_command_buffers, CommandPool,
};
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{
    write_acceleration_structure, write_uniform_buffer, DescriptorPool,
    DescriptorSetLayoutBuilder,
};
pub use error::{GpuError, Result};
pub use handle::{Destroyer, DeviceHandle, OwnedHandle};
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig};
pub use render_pass::{create_framebuffers, create_render_pass, DepthTarget};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::Swapchain;
pub use sync::{create_fence, create_semaphore, reset_fence, wait_for_fence, FENCE_TIMEOUT_NS};
pub use upload::TransferContext;
