//! Vulkan instance creation.

use crate::error::{GpuError, Result};
use crate::handle::OwnedHandle;
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, CStr, CString};

/// Standard validation layer.
pub const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Validation messenger destroyed through the debug-utils loader.
pub type DebugMessenger = OwnedHandle<vk::DebugUtilsMessengerEXT, ash::ext::debug_utils::Instance>;

/// Instance extensions needed to present to `display`, or just the surface
/// extension set of the current platform when there is no display.
pub fn required_instance_extensions(
    display: Option<RawDisplayHandle>,
) -> Result<Vec<*const c_char>> {
    #[allow(unused_mut)]
    let mut extensions = match display {
        Some(display) => ash_window::enumerate_required_extensions(display)
            .map_err(|e| GpuError::ExtensionNotSupported(format!("surface extensions: {e}")))?
            .to_vec(),
        None => vec![ash::khr::surface::NAME.as_ptr()],
    };

    #[cfg(target_os = "macos")]
    extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());

    Ok(extensions)
}

/// Create a Vulkan instance.
///
/// When validation is requested but the layer is missing, the instance is
/// created without it and a warning is logged.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    display: Option<RawDisplayHandle>,
    enable_validation: bool,
) -> Result<(ash::Instance, bool)> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::InvalidState(format!("Application name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"vkrt")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    let validation = enable_validation && unsafe { validation_layer_available(entry) };
    if enable_validation && !validation {
        tracing::warn!(
            "Validation layer {} not available",
            VALIDATION_LAYER_NAME.to_string_lossy()
        );
    }

    let mut extension_names = required_instance_extensions(display)?;
    if validation {
        extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    let layer_names: Vec<*const c_char> = if validation {
        vec![VALIDATION_LAYER_NAME.as_ptr()]
    } else {
        vec![]
    };

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = unsafe { entry.create_instance(&create_info, None)? };

    Ok((instance, validation))
}

unsafe fn validation_layer_available(entry: &ash::Entry) -> bool {
    let Ok(layers) = (unsafe { entry.enumerate_instance_layer_properties() }) else {
        return false;
    };

    layers
        .iter()
        .any(|layer| {
            layer
                .layer_name_as_c_str()
                .is_ok_and(|name| name == VALIDATION_LAYER_NAME)
        })
}

/// Route validation output into `tracing`.
///
/// # Safety
/// The instance must have been created with `VK_EXT_debug_utils` enabled.
pub unsafe fn create_debug_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
) -> Result<DebugMessenger> {
    let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
        .map_err(|e| GpuError::resource("debug messenger", e))?;

    Ok(unsafe { OwnedHandle::new(messenger, debug_utils) })
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    // SAFETY: the driver passes either null or a valid callback struct.
    let message = unsafe { callback_data.as_ref() }
        .and_then(|data| unsafe { data.message_as_c_str() })
        .map_or_else(
            || "(no message)".to_string(),
            |message| message.to_string_lossy().into_owned(),
        );

    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            tracing::error!(target: "vulkan", ?message_type, "{message}");
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            tracing::warn!(target: "vulkan", ?message_type, "{message}");
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            tracing::debug!(target: "vulkan", ?message_type, "{message}");
        }
        _ => tracing::trace!(target: "vulkan", ?message_type, "{message}"),
    }

    vk::FALSE
}

/// Select the best physical device.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn select_physical_device(instance: &ash::Instance) -> Result<vk::PhysicalDevice> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    devices
        .into_iter()
        .map(|device| (unsafe { score_physical_device(instance, device) }, device))
        .filter(|(score, _)| *score > 0)
        .max_by_key(|(score, _)| *score)
        .map(|(_, device)| device)
        .ok_or(GpuError::NoSuitableDevice)
}

/// Score a physical device for selection.
unsafe fn score_physical_device(instance: &ash::Instance, device: vk::PhysicalDevice) -> i64 {
    let properties = unsafe { instance.get_physical_device_properties(device) };

    let api_version = properties.api_version;
    if vk::api_version_major(api_version) < 1
        || (vk::api_version_major(api_version) == 1 && vk::api_version_minor(api_version) < 3)
    {
        return -1;
    }

    let mut score = 1;

    // Prefer discrete GPUs
    match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => score += 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => score += 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => score += 50,
        _ => {}
    }

    // Prefer acceleration structure support
    let has_acceleration_structure = unsafe {
        instance.enumerate_device_extension_properties(device)
    }
    .unwrap_or_default()
    .iter()
    .any(|ext| {
        ext.extension_name_as_c_str()
            .is_ok_and(|name| name == ash::khr::acceleration_structure::NAME)
    });
    if has_acceleration_structure {
        score += 2000;
    }

    // Prefer more VRAM
    let memory = unsafe { instance.get_physical_device_memory_properties(device) };
    let vram_mb: u64 = memory
        .memory_heaps
        .iter()
        .take(memory.memory_heap_count as usize)
        .filter(|h| h.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|h| h.size / (1024 * 1024))
        .sum();
    score + i64::try_from(vram_mb / 1024).unwrap_or(0) // +1 per GB
}
