//! Per-frame resource sets.
//!
//! Exactly [`MAX_FRAMES_IN_FLIGHT`] slots are created up front and reused by
//! index for the whole session.

use crate::uniforms::FrameUniforms;
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;
use vkrt_core::constants::MAX_FRAMES_IN_FLIGHT;
use vkrt_gpu::{
    create_fence, create_semaphore, write_uniform_buffer, CommandPool, DescriptorPool,
    DeviceHandle, GpuAllocator, GpuBuffer, GpuError, Result,
};

/// One frame's fence, semaphores, command buffer, uniforms and descriptor set.
pub struct FrameSlot {
    /// Signaled when this slot's last submission finished. Starts signaled.
    pub(crate) in_flight: DeviceHandle<vk::Fence>,
    pub(crate) image_available: DeviceHandle<vk::Semaphore>,
    pub(crate) render_finished: DeviceHandle<vk::Semaphore>,
    pub(crate) command_buffer: vk::CommandBuffer,
    /// Host-visible and persistently mapped.
    pub(crate) uniforms: GpuBuffer,
    pub(crate) descriptor_set: vk::DescriptorSet,
}

impl FrameSlot {
    pub fn fence(&self) -> vk::Fence {
        self.in_flight.raw()
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// Copy `uniforms` into the mapped buffer. The memory is host-coherent.
    pub fn write_uniforms(&self, uniforms: &FrameUniforms) -> Result<()> {
        self.uniforms.write(std::slice::from_ref(uniforms))
    }
}

/// The fixed array of frame slots plus the pools they allocate from.
pub struct FrameSlots {
    // Slots go before the pools their command buffers and sets come from.
    slots: [FrameSlot; MAX_FRAMES_IN_FLIGHT],
    _descriptor_pool: DescriptorPool,
    _command_pool: CommandPool,
}

impl FrameSlots {
    /// Create every slot for the given frame descriptor layout.
    ///
    /// Nothing is returned until all slots exist; a failure drops whatever was
    /// created so far.
    pub fn new(
        allocator: &GpuAllocator,
        queue_family: u32,
        set_layout: vk::DescriptorSetLayout,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let device = Arc::clone(allocator.device());
        let slot_count = MAX_FRAMES_IN_FLIGHT as u32;

        let command_pool = unsafe {
            CommandPool::new(
                &device,
                queue_family,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?
        };
        let descriptor_pool = unsafe { DescriptorPool::new(&device, slot_count, pool_sizes)? };

        let command_buffers = unsafe { command_pool.allocate_command_buffers(slot_count)? };
        let set_layouts = [set_layout; MAX_FRAMES_IN_FLIGHT];
        let descriptor_sets = unsafe { descriptor_pool.allocate(&set_layouts)? };

        let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for (index, (command_buffer, descriptor_set)) in
            command_buffers.into_iter().zip(descriptor_sets).enumerate()
        {
            let uniforms = allocator.create_buffer(
                FrameUniforms::SIZE,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
                &format!("frame_{index}_uniforms"),
            )?;
            if uniforms.mapped_ptr().is_none() {
                return Err(GpuError::resource("uniform buffer", "memory is not host-mapped"));
            }

            unsafe {
                write_uniform_buffer(
                    &device,
                    descriptor_set,
                    0,
                    uniforms.buffer(),
                    0,
                    FrameUniforms::SIZE,
                );
            }

            slots.push(FrameSlot {
                in_flight: unsafe { create_fence(&device, true)? },
                image_available: unsafe { create_semaphore(&device)? },
                render_finished: unsafe { create_semaphore(&device)? },
                command_buffer,
                uniforms,
                descriptor_set,
            });
        }

        let slots: [FrameSlot; MAX_FRAMES_IN_FLIGHT] = slots.try_into().map_err(|_| {
            GpuError::resource("frame slots", "driver returned too few command buffers or sets")
        })?;

        tracing::debug!(slots = MAX_FRAMES_IN_FLIGHT, "Frame slots created");

        Ok(Self {
            slots,
            _descriptor_pool: descriptor_pool,
            _command_pool: command_pool,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> &FrameSlot {
        &self.slots[index % MAX_FRAMES_IN_FLIGHT]
    }
}
