//! A single acceleration structure and its backing buffer.

use crate::error::Result;
use crate::loader::AccelerationStructureDevice;
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;
use vkrt_gpu::{GpuAllocator, GpuBuffer, GpuError, OwnedHandle};

/// Acceleration structure handle plus the buffer sized exactly to its query.
pub struct AccelerationStructure {
    // The handle must go before the buffer that stores it.
    handle: OwnedHandle<vk::AccelerationStructureKHR, Arc<AccelerationStructureDevice>>,
    buffer: GpuBuffer,
    device_address: vk::DeviceAddress,
}

impl AccelerationStructure {
    /// Allocate storage of `size` bytes and create a structure of type `ty` in it.
    ///
    /// # Safety
    /// The loader must belong to the allocator's device.
    pub unsafe fn new(
        loader: &Arc<AccelerationStructureDevice>,
        allocator: &GpuAllocator,
        ty: vk::AccelerationStructureTypeKHR,
        size: u64,
        name: &str,
    ) -> Result<Self> {
        let buffer = allocator.create_buffer(
            size,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
            name,
        )?;

        let create_info = vk::AccelerationStructureCreateInfoKHR::default()
            .buffer(buffer.buffer())
            .offset(0)
            .size(size)
            .ty(ty);

        let handle = unsafe { loader.create_acceleration_structure(&create_info, None) }
            .map_err(|e| GpuError::resource("acceleration structure", e))?;
        let handle = unsafe { OwnedHandle::new(handle, Arc::clone(loader)) };

        let address_info =
            vk::AccelerationStructureDeviceAddressInfoKHR::default().acceleration_structure(handle.raw());
        let device_address =
            unsafe { loader.get_acceleration_structure_device_address(&address_info) };

        Ok(Self {
            handle,
            buffer,
            device_address,
        })
    }

    /// Raw structure handle.
    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.handle.raw()
    }

    /// Device address used in instance records.
    pub fn device_address(&self) -> vk::DeviceAddress {
        self.device_address
    }

    /// Size of the backing storage in bytes.
    pub fn size(&self) -> u64 {
        self.buffer.size()
    }

    pub(crate) fn loader(&self) -> &Arc<AccelerationStructureDevice> {
        self.handle.destroyer()
    }
}

/// Driver-reported sizes for one build.
///
/// # Safety
/// `build_info` must describe valid geometry for the loader's device.
pub(crate) unsafe fn query_build_sizes(
    loader: &AccelerationStructureDevice,
    build_info: &vk::AccelerationStructureBuildGeometryInfoKHR<'_>,
    primitive_count: u32,
) -> vk::AccelerationStructureBuildSizesInfoKHR<'static> {
    let mut build_sizes = vk::AccelerationStructureBuildSizesInfoKHR::default();
    unsafe {
        loader.get_acceleration_structure_build_sizes(
            vk::AccelerationStructureBuildTypeKHR::DEVICE,
            build_info,
            &[primitive_count],
            &mut build_sizes,
        );
    }
    build_sizes
}

/// Scratch buffer for builds, aligned for the device's scratch offset rule.
pub(crate) fn create_scratch_buffer(
    allocator: &GpuAllocator,
    size: u64,
    alignment: u64,
    name: &str,
) -> Result<GpuBuffer> {
    let buffer = allocator.create_buffer_aligned(
        size.max(1),
        vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        MemoryLocation::GpuOnly,
        alignment,
        name,
    )?;
    Ok(buffer)
}

/// Make finished builds visible to the next build and wait for prior copies.
///
/// Source covers transfer writes (uploaded inputs) and structure writes
/// (earlier builds); destination is the next structure build.
///
/// # Safety
/// `cmd` must be recording.
pub(crate) unsafe fn build_barrier(device: &ash::Device, cmd: vk::CommandBuffer) {
    let barrier = vk::MemoryBarrier2::default()
        .src_stage_mask(
            vk::PipelineStageFlags2::TRANSFER
                | vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR,
        )
        .src_access_mask(
            vk::AccessFlags2::TRANSFER_WRITE | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
        )
        .dst_stage_mask(vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR)
        .dst_access_mask(
            vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR
                | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR,
        );

    let dependency_info =
        vk::DependencyInfo::default().memory_barriers(std::slice::from_ref(&barrier));

    unsafe { device.cmd_pipeline_barrier2(cmd, &dependency_info) };
}
