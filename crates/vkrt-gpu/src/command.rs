//! Command buffer management.

use crate::error::{GpuError, Result};
use crate::handle::{device_handle, DeviceHandle};
use crate::sync::{create_fence, wait_for_fence, FENCE_TIMEOUT_NS};
use ash::vk;
use std::sync::Arc;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: DeviceHandle<vk::CommandPool>,
    queue_family: u32,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &Arc<ash::Device>,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = unsafe { device.create_command_pool(&create_info, None) }
            .map_err(|e| GpuError::resource("command pool", e))?;

        Ok(Self {
            pool: unsafe { device_handle(device, pool) },
            queue_family,
        })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::CommandPool {
        self.pool.raw()
    }

    /// Get the queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    fn device(&self) -> &ash::Device {
        self.pool.destroyer()
    }

    /// Allocate a single primary command buffer.
    ///
    /// # Safety
    /// The pool must not be in use from another thread.
    pub unsafe fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer> {
        let mut buffers = unsafe { self.allocate_command_buffers(1)? };
        buffers
            .pop()
            .ok_or_else(|| GpuError::resource("command buffer", "driver returned no buffers"))
    }

    /// Allocate multiple primary command buffers.
    ///
    /// # Safety
    /// The pool must not be in use from another thread.
    pub unsafe fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.handle())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device().allocate_command_buffers(&alloc_info) }
            .map_err(|e| GpuError::resource("command buffer", e))
    }

    /// Return command buffers to the pool.
    ///
    /// # Safety
    /// The buffers must not be pending execution.
    pub unsafe fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device().free_command_buffers(self.handle(), buffers) };
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    unsafe { device.begin_command_buffer(cmd, &begin_info)? };
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    unsafe { device.end_command_buffer(cmd)? };
    Ok(())
}

/// Submit command buffers to a queue.
///
/// # Safety
/// All handles must be valid.
pub unsafe fn submit_command_buffers(
    device: &ash::Device,
    queue: vk::Queue,
    command_buffers: &[vk::CommandBuffer],
    wait_semaphores: &[vk::Semaphore],
    wait_stages: &[vk::PipelineStageFlags],
    signal_semaphores: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    let submit_info = vk::SubmitInfo::default()
        .command_buffers(command_buffers)
        .wait_semaphores(wait_semaphores)
        .wait_dst_stage_mask(wait_stages)
        .signal_semaphores(signal_semaphores);

    unsafe { device.queue_submit(queue, &[submit_info], fence)? };
    Ok(())
}

/// Record a one-time command buffer, submit it and block until the GPU is done.
///
/// The wait is on a dedicated fence, so other work on `queue` is not drained.
/// The command buffer goes back to the pool whether or not submission succeeded.
///
/// # Safety
/// All handles must be valid and `pool` must belong to `queue`'s family.
pub unsafe fn submit_and_wait<F>(
    device: &Arc<ash::Device>,
    pool: &CommandPool,
    queue: vk::Queue,
    record: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    let cmd = unsafe { pool.allocate_command_buffer()? };

    let record_and_submit = || -> Result<DeviceHandle<vk::Fence>> {
        unsafe {
            begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
            record(cmd);
            end_command_buffer(device, cmd)?;

            let fence = create_fence(device, false)?;
            submit_command_buffers(device, queue, &[cmd], &[], &[], &[], fence.raw())?;
            Ok(fence)
        }
    };

    let fence = match record_and_submit() {
        Ok(fence) => fence,
        Err(e) => {
            unsafe { pool.free_command_buffers(&[cmd]) };
            return Err(e);
        }
    };

    if let Err(e) = unsafe { wait_for_fence(device, fence.raw(), FENCE_TIMEOUT_NS) } {
        // Work may still be pending: leave the buffer and fence to device teardown.
        let _ = fence.into_raw();
        return Err(e);
    }

    unsafe { pool.free_command_buffers(&[cmd]) };
    Ok(())
}
