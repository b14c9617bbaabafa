//! Staged uploads into device-local memory.

use crate::command::{submit_and_wait, CommandPool};
use crate::error::{GpuError, Result};
use crate::memory::{GpuAllocator, GpuBuffer};
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// Everything needed to run one-shot transfer and build commands.
///
/// Each submission waits for completion before returning, so the caller
/// may free staging and scratch memory as soon as a call returns.
pub struct TransferContext {
    pool: CommandPool,
    allocator: GpuAllocator,
    device: Arc<ash::Device>,
    queue: vk::Queue,
}

impl TransferContext {
    /// Create a transfer context on `queue`.
    ///
    /// # Safety
    /// `queue` must belong to `queue_family` on `allocator`'s device.
    pub unsafe fn new(allocator: &GpuAllocator, queue_family: u32, queue: vk::Queue) -> Result<Self> {
        let device = Arc::clone(allocator.device());
        let pool = unsafe {
            CommandPool::new(&device, queue_family, vk::CommandPoolCreateFlags::TRANSIENT)?
        };

        Ok(Self {
            pool,
            allocator: allocator.clone(),
            device,
            queue,
        })
    }

    /// The allocator used for destination and staging buffers.
    pub fn allocator(&self) -> &GpuAllocator {
        &self.allocator
    }

    /// The logical device.
    pub fn device(&self) -> &Arc<ash::Device> {
        &self.device
    }

    /// Record commands with `record`, submit them and block until they finish.
    pub fn submit_and_wait<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let device = &self.device;
        // SAFETY: pool and queue share a family; the wait completes before return.
        unsafe { submit_and_wait(device, &self.pool, self.queue, |cmd| record(device, cmd)) }
    }

    /// Copy `data` into a new device-local buffer with `usage | TRANSFER_DST`.
    ///
    /// The staging buffer is freed before this returns.
    pub fn upload_slice<T: bytemuck::Pod>(
        &self,
        data: &[T],
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<GpuBuffer> {
        self.upload_bytes(bytemuck::cast_slice(data), usage, name)
    }

    /// Byte-level form of [`Self::upload_slice`].
    pub fn upload_bytes(
        &self,
        bytes: &[u8],
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<GpuBuffer> {
        if bytes.is_empty() {
            return Err(GpuError::resource("buffer", format!("{name}: empty upload")));
        }
        let size = bytes.len() as u64;

        let staging = self.allocator.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            &format!("{name}_staging"),
        )?;
        staging.write_bytes(0, bytes)?;

        let destination = self.allocator.create_buffer(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            name,
        )?;

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        self.submit_and_wait(|device, cmd| unsafe {
            device.cmd_copy_buffer(cmd, staging.buffer(), destination.buffer(), &[region]);
        })?;

        tracing::trace!(name, size, "Uploaded buffer");
        Ok(destination)
    }
}
