//! Acceleration structure extension loader.

use crate::error::Result;
use std::ffi::CStr;
use std::sync::Arc;
use vkrt_gpu::{GpuContext, GpuError};

/// Shared extension loader; also the destroyer of every structure handle.
pub type AccelerationStructureDevice = ash::khr::acceleration_structure::Device;

/// Device entry points the builder calls.
pub const REQUIRED_FUNCTIONS: [&CStr; 5] = [
    c"vkGetAccelerationStructureBuildSizesKHR",
    c"vkCreateAccelerationStructureKHR",
    c"vkCmdBuildAccelerationStructuresKHR",
    c"vkGetAccelerationStructureDeviceAddressKHR",
    c"vkDestroyAccelerationStructureKHR",
];

/// Create the extension loader after checking every entry point resolves.
pub fn load_acceleration_structure_device(
    gpu: &GpuContext,
) -> Result<Arc<AccelerationStructureDevice>> {
    if !gpu.acceleration_structure_enabled() {
        return Err(GpuError::ExtensionNotSupported(
            ash::khr::acceleration_structure::NAME
                .to_string_lossy()
                .into_owned(),
        )
        .into());
    }

    for name in REQUIRED_FUNCTIONS {
        gpu.resolve_device_function(name)?;
    }

    tracing::debug!("Acceleration structure entry points resolved");

    Ok(Arc::new(AccelerationStructureDevice::new(
        gpu.instance(),
        gpu.device(),
    )))
}
