//! GPU context management.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use crate::instance::{
    create_debug_messenger, create_instance, select_physical_device, DebugMessenger,
};
use crate::memory::GpuAllocator;
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr};
use std::sync::Arc;

/// Main GPU context holding Vulkan resources.
pub struct GpuContext {
    entry: ash::Entry,
    instance: ash::Instance,
    debug_messenger: Option<DebugMessenger>,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    capabilities: GpuCapabilities,
    allocator: GpuAllocator,
    acceleration_structure_enabled: bool,

    graphics_queue_family: u32,
    graphics_queue: vk::Queue,
}

impl GpuContext {
    /// Get the Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Shared device handle, for objects that destroy themselves.
    pub fn device_arc(&self) -> &Arc<ash::Device> {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Whether the acceleration structure extension was enabled on the device.
    pub fn acceleration_structure_enabled(&self) -> bool {
        self.acceleration_structure_enabled
    }

    /// Get the graphics queue. Also used for transfers and presentation.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &GpuAllocator {
        &self.allocator
    }

    /// Check that the driver exposes a device-level entry point.
    ///
    /// Extension loaders resolve lazily and panic on first call to a missing
    /// function, so callers verify what they need up front.
    pub fn resolve_device_function(&self, name: &CStr) -> Result<()> {
        let get_device_proc_addr = self.instance.fp_v1_0().get_device_proc_addr;
        // SAFETY: the device is alive and `name` is NUL-terminated.
        let function = unsafe { get_device_proc_addr(self.device.handle(), name.as_ptr()) };

        function.map(|_| ()).ok_or_else(|| {
            GpuError::DriverFunctionUnavailable(name.to_string_lossy().into_owned())
        })
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Shutdown allocator BEFORE destroying device
            // This frees all VkDeviceMemory allocations
            self.allocator.shutdown();

            self.device.destroy_device(None);
            drop(self.debug_messenger.take());
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a GPU context.
pub struct GpuContextBuilder {
    app_name: String,
    enable_validation: bool,
    display: Option<RawDisplayHandle>,
}

impl Default for GpuContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "vkrt".to_string(),
            enable_validation: cfg!(debug_assertions),
            display: None,
        }
    }
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Enable the instance extensions needed to present to `display`.
    pub fn display(mut self, display: RawDisplayHandle) -> Self {
        self.display = Some(display);
        self
    }

    /// Build the GPU context.
    pub fn build(self) -> Result<GpuContext> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        let (instance, validation) = unsafe {
            create_instance(&entry, &self.app_name, self.display, self.enable_validation)?
        };

        // From here on every failure must tear down what was created so far.
        let mut partial = PartialInstance {
            instance: Some(&instance),
            debug_messenger: None,
        };

        if validation {
            partial.debug_messenger = Some(unsafe { create_debug_messenger(&entry, &instance)? });
        }

        let physical_device = unsafe { select_physical_device(&instance)? };
        let capabilities = unsafe { GpuCapabilities::query(&instance, physical_device) };

        if !capabilities.meets_requirements() {
            return Err(GpuError::NoSuitableDevice);
        }

        tracing::info!("Selected GPU: {}", capabilities.summary());

        let graphics_queue_family =
            unsafe { find_graphics_queue_family(&instance, physical_device)? };

        let acceleration_structure_enabled = capabilities.supports_acceleration_structure;
        let device = unsafe {
            create_device(
                &instance,
                physical_device,
                graphics_queue_family,
                acceleration_structure_enabled,
            )?
        };
        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };
        let device = Arc::new(device);

        let allocator = match unsafe {
            GpuAllocator::new(&instance, Arc::clone(&device), physical_device)
        } {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e);
            }
        };

        let debug_messenger = partial.disarm();

        Ok(GpuContext {
            entry,
            instance,
            debug_messenger,
            physical_device,
            device,
            capabilities,
            allocator,
            acceleration_structure_enabled,
            graphics_queue_family,
            graphics_queue,
        })
    }
}

/// Instance plus messenger, destroyed together if device setup bails out.
struct PartialInstance<'a> {
    instance: Option<&'a ash::Instance>,
    debug_messenger: Option<DebugMessenger>,
}

impl PartialInstance<'_> {
    /// Hand the messenger over to the finished context.
    fn disarm(mut self) -> Option<DebugMessenger> {
        self.instance = None;
        self.debug_messenger.take()
    }
}

impl Drop for PartialInstance<'_> {
    fn drop(&mut self) {
        drop(self.debug_messenger.take());
        if let Some(instance) = self.instance {
            unsafe { instance.destroy_instance(None) };
        }
    }
}

/// Find a queue family that supports graphics (and therefore transfer).
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn find_graphics_queue_family(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<u32> {
    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    queue_families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .and_then(|index| u32::try_from(index).ok())
        .ok_or(GpuError::NoSuitableDevice)
}

/// Device extensions to enable.
fn device_extensions(acceleration_structure: bool) -> Vec<*const c_char> {
    let mut extensions = vec![ash::khr::swapchain::NAME.as_ptr()];
    if acceleration_structure {
        extensions.push(ash::khr::acceleration_structure::NAME.as_ptr());
        extensions.push(ash::khr::deferred_host_operations::NAME.as_ptr());
    }
    extensions
}

/// Create the logical device.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    graphics_queue_family: u32,
    acceleration_structure: bool,
) -> Result<ash::Device> {
    let queue_priority = 1.0_f32;
    let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
        .queue_family_index(graphics_queue_family)
        .queue_priorities(std::slice::from_ref(&queue_priority))];

    let extension_names = device_extensions(acceleration_structure);

    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .synchronization2(true)
        .maintenance4(true);

    let mut vulkan_1_2_features =
        vk::PhysicalDeviceVulkan12Features::default().buffer_device_address(true);

    let mut acceleration_structure_features =
        vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default().acceleration_structure(true);

    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut vulkan_1_3_features)
        .push_next(&mut vulkan_1_2_features);
    if acceleration_structure {
        features2 = features2.push_next(&mut acceleration_structure_features);
    }

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    let device = unsafe { instance.create_device(physical_device, &device_create_info, None) }?;

    Ok(device)
}
