//! GPU capability detection.

use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// Minimum device-local memory, in MB. One full BLAS batch must fit.
pub const MIN_DEVICE_LOCAL_MEMORY_MB: u64 = 256;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Acceleration structure limits reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelerationStructureLimits {
    /// Required alignment of scratch buffer device addresses.
    pub min_scratch_offset_alignment: u32,
    /// Maximum number of instances in one top-level structure.
    pub max_instance_count: u64,
    /// Maximum number of geometries in one bottom-level structure.
    pub max_geometry_count: u64,
    /// Maximum number of primitives in one bottom-level structure.
    pub max_primitive_count: u64,
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,

    /// Synchronization2 support (VK 1.3 core)
    pub supports_synchronization2: bool,
    /// Buffer device address support
    pub supports_buffer_device_address: bool,
    /// `VK_KHR_acceleration_structure` and `VK_KHR_deferred_host_operations` present
    pub supports_acceleration_structure: bool,
    /// Limits, when acceleration structures are supported
    pub acceleration_structure: Option<AccelerationStructureLimits>,

    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    /// Maximum memory allocation count
    pub max_memory_allocation_count: u32,

    pub available_extensions: HashSet<String>,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let extensions =
            unsafe { instance.enumerate_device_extension_properties(physical_device) }
                .unwrap_or_default();

        let available_extensions: HashSet<String> = extensions
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .filter_map(|name| name.to_str().ok().map(String::from))
            .collect();

        let vendor = GpuVendor::from_vendor_id(properties.vendor_id);
        let device_name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        let api_version = properties.api_version;
        let has_vulkan_1_3 = api_at_least_1_3(api_version);

        let supports_acceleration_structure = has_extension(
            &available_extensions,
            ash::khr::acceleration_structure::NAME,
        ) && has_extension(
            &available_extensions,
            ash::khr::deferred_host_operations::NAME,
        );

        let acceleration_structure = supports_acceleration_structure
            .then(|| unsafe { query_acceleration_structure_limits(instance, physical_device) });

        Self {
            vendor,
            device_name,
            api_version,
            driver_version: properties.driver_version,

            supports_synchronization2: has_vulkan_1_3,
            supports_buffer_device_address: has_vulkan_1_3
                || available_extensions.contains("VK_KHR_buffer_device_address"),
            supports_acceleration_structure,
            acceleration_structure,

            device_local_memory_mb,
            max_memory_allocation_count: properties.limits.max_memory_allocation_count,

            available_extensions,
        }
    }

    /// Check if the GPU meets minimum requirements for the renderer.
    pub fn meets_requirements(&self) -> bool {
        if !api_at_least_1_3(self.api_version) {
            return false;
        }

        // Geometry inputs are referenced by device address.
        if !self.supports_buffer_device_address {
            return false;
        }

        self.device_local_memory_mb >= MIN_DEVICE_LOCAL_MEMORY_MB
    }

    /// Required alignment for acceleration structure scratch addresses (1 if unknown).
    pub fn scratch_alignment(&self) -> u64 {
        self.acceleration_structure
            .map_or(1, |limits| u64::from(limits.min_scratch_offset_alignment.max(1)))
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM - acceleration structures: {}",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
            if self.supports_acceleration_structure {
                "yes"
            } else {
                "no"
            },
        )
    }
}

fn api_at_least_1_3(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    major > 1 || (major == 1 && minor >= 3)
}

fn has_extension(available: &HashSet<String>, name: &CStr) -> bool {
    name.to_str().is_ok_and(|name| available.contains(name))
}

unsafe fn query_acceleration_structure_limits(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> AccelerationStructureLimits {
    let mut as_properties = vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();
    let mut properties2 = vk::PhysicalDeviceProperties2::default().push_next(&mut as_properties);
    unsafe { instance.get_physical_device_properties2(physical_device, &mut properties2) };

    AccelerationStructureLimits {
        min_scratch_offset_alignment: as_properties
            .min_acceleration_structure_scratch_offset_alignment,
        max_instance_count: as_properties.max_instance_count,
        max_geometry_count: as_properties.max_geometry_count,
        max_primitive_count: as_properties.max_primitive_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(api_version: u32, vram_mb: u64) -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Other(0),
            device_name: "test".to_string(),
            api_version,
            driver_version: 0,
            supports_synchronization2: true,
            supports_buffer_device_address: true,
            supports_acceleration_structure: true,
            acceleration_structure: Some(AccelerationStructureLimits {
                min_scratch_offset_alignment: 128,
                max_instance_count: 1 << 24,
                max_geometry_count: 1 << 24,
                max_primitive_count: 1 << 29,
            }),
            device_local_memory_mb: vram_mb,
            max_memory_allocation_count: 4096,
            available_extensions: HashSet::new(),
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn requires_vulkan_1_3_and_enough_memory() {
        assert!(capabilities(vk::API_VERSION_1_3, 8192).meets_requirements());
        assert!(!capabilities(vk::API_VERSION_1_2, 8192).meets_requirements());
        assert!(!capabilities(vk::API_VERSION_1_3, 128).meets_requirements());

        let mut no_bda = capabilities(vk::API_VERSION_1_3, 8192);
        no_bda.supports_buffer_device_address = false;
        assert!(!no_bda.meets_requirements());
    }

    #[test]
    fn scratch_alignment_falls_back_to_one() {
        assert_eq!(capabilities(vk::API_VERSION_1_3, 8192).scratch_alignment(), 128);

        let mut none = capabilities(vk::API_VERSION_1_3, 8192);
        none.acceleration_structure = None;
        assert_eq!(none.scratch_alignment(), 1);
    }
}
