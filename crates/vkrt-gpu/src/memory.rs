//! GPU memory management.
//!
//! [`GpuAllocator`] is a cheap, cloneable front for one shared
//! `gpu_allocator` instance. Buffers and images carry a clone of it inside
//! their [`OwnedHandle`], so they free their own memory when dropped.

use crate::error::{GpuError, Result};
use crate::handle::{Destroyer, OwnedHandle};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use std::sync::Arc;

/// GPU memory allocator wrapper.
#[derive(Clone)]
pub struct GpuAllocator {
    allocator: Arc<Mutex<Option<Allocator>>>,
    device: Arc<ash::Device>,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: true,
            allocation_sizes: gpu_allocator::AllocationSizes::default(),
        })
        .map_err(|e| GpuError::resource("memory allocator", e))?;

        Ok(Self {
            allocator: Arc::new(Mutex::new(Some(allocator))),
            device,
        })
    }

    /// The device this allocator binds memory on.
    pub fn device(&self) -> &Arc<ash::Device> {
        &self.device
    }

    /// Allocate a buffer.
    pub fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        self.create_buffer_aligned(size, usage, location, 1, name)
    }

    /// Allocate a buffer whose memory offset is a multiple of `min_alignment`
    /// (on top of the driver's own requirement).
    pub fn create_buffer_aligned(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        min_alignment: u64,
        name: &str,
    ) -> Result<GpuBuffer> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .map_err(|e| GpuError::resource("buffer", e))?;

        let mut requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        requirements.alignment = requirements.alignment.max(min_alignment.max(1));

        let allocation = self
            .allocate(name, requirements, location, true)
            .inspect_err(|_| unsafe { self.device.destroy_buffer(buffer, None) })?;

        let owned = unsafe {
            OwnedHandle::new(
                BufferAllocation {
                    buffer,
                    allocation: Some(allocation),
                },
                self.clone(),
            )
        };

        unsafe {
            self.device.bind_buffer_memory(
                buffer,
                owned.get().memory(),
                owned.get().offset(),
            )
        }
        .map_err(|e| GpuError::resource("buffer", e))?;

        Ok(GpuBuffer { owned, size })
    }

    /// Allocate an image.
    pub fn create_image(
        &self,
        create_info: &vk::ImageCreateInfo,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuImage> {
        let image = unsafe { self.device.create_image(create_info, None) }
            .map_err(|e| GpuError::resource("image", e))?;

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = self
            .allocate(name, requirements, location, false)
            .inspect_err(|_| unsafe { self.device.destroy_image(image, None) })?;

        let owned = unsafe {
            OwnedHandle::new(
                ImageAllocation {
                    image,
                    allocation: Some(allocation),
                },
                self.clone(),
            )
        };

        unsafe {
            self.device
                .bind_image_memory(image, owned.get().memory(), owned.get().offset())
        }
        .map_err(|e| GpuError::resource("image", e))?;

        Ok(GpuImage {
            owned,
            format: create_info.format,
            extent: create_info.extent,
        })
    }

    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        self.allocator
            .lock()
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::resource("device memory", e))
    }

    fn free(&self, allocation: Allocation) {
        match self.allocator.lock().as_mut() {
            Some(allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    tracing::warn!("Failed to free allocation: {e}");
                }
            }
            None => tracing::warn!("Allocation outlived the allocator"),
        }
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed.
    /// Any remaining allocations will be freed (and logged as leaks).
    pub fn shutdown(&self) {
        drop(self.allocator.lock().take());
    }
}

/// A buffer together with the memory bound to it.
pub struct BufferAllocation {
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
}

impl BufferAllocation {
    fn memory(&self) -> vk::DeviceMemory {
        self.allocation
            .as_ref()
            .map_or(vk::DeviceMemory::null(), |a| unsafe { a.memory() })
    }

    fn offset(&self) -> u64 {
        self.allocation.as_ref().map_or(0, Allocation::offset)
    }
}

impl Destroyer<BufferAllocation> for GpuAllocator {
    unsafe fn destroy(&self, mut handle: BufferAllocation) {
        unsafe { self.device.destroy_buffer(handle.buffer, None) };
        if let Some(allocation) = handle.allocation.take() {
            self.free(allocation);
        }
    }
}

/// An image together with the memory bound to it.
pub struct ImageAllocation {
    image: vk::Image,
    allocation: Option<Allocation>,
}

impl ImageAllocation {
    fn memory(&self) -> vk::DeviceMemory {
        self.allocation
            .as_ref()
            .map_or(vk::DeviceMemory::null(), |a| unsafe { a.memory() })
    }

    fn offset(&self) -> u64 {
        self.allocation.as_ref().map_or(0, Allocation::offset)
    }
}

impl Destroyer<ImageAllocation> for GpuAllocator {
    unsafe fn destroy(&self, mut handle: ImageAllocation) {
        unsafe { self.device.destroy_image(handle.image, None) };
        if let Some(allocation) = handle.allocation.take() {
            self.free(allocation);
        }
    }
}

/// A GPU buffer with its allocation. Freed on drop.
pub struct GpuBuffer {
    owned: OwnedHandle<BufferAllocation, GpuAllocator>,
    size: u64,
}

impl GpuBuffer {
    /// Raw buffer handle.
    pub fn buffer(&self) -> vk::Buffer {
        self.owned.get().buffer
    }

    /// Requested size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the device address of this buffer.
    pub fn device_address(&self) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.buffer());
        unsafe { self.owned.destroyer().device.get_buffer_device_address(&info) }
    }

    /// Pointer to persistently mapped memory, if host-visible.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.owned
            .get()
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .map(|p| p.as_ptr().cast::<u8>())
    }

    /// Write data to the start of the buffer (must be host-visible).
    pub fn write<T: bytemuck::Pod>(&self, data: &[T]) -> Result<()> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }

    /// Write raw bytes to the buffer at the given offset (must be host-visible).
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let ptr = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;

        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| GpuError::InvalidState("Offset overflow".to_string()))?;
        if end > self.size {
            return Err(GpuError::InvalidState(format!(
                "Write of {} bytes at {offset} overflows {}-byte buffer",
                data.len(),
                self.size
            )));
        }

        // SAFETY: range checked above; mapped memory stays valid while `self` lives.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
        }

        Ok(())
    }
}

/// A GPU image with its allocation. Freed on drop.
pub struct GpuImage {
    owned: OwnedHandle<ImageAllocation, GpuAllocator>,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
}

impl GpuImage {
    /// Raw image handle.
    pub fn image(&self) -> vk::Image {
        self.owned.get().image
    }
}
