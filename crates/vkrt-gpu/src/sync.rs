//! Synchronization primitives.

use crate::error::{GpuError, Result};
use crate::handle::{device_handle, DeviceHandle};
use ash::vk;
use std::sync::Arc;

/// Timeout used for every fence wait and image acquisition.
///
/// Effectively unbounded: a hung or lost device blocks the calling thread
/// instead of being detected. Known robustness gap.
pub const FENCE_TIMEOUT_NS: u64 = u64::MAX;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &Arc<ash::Device>) -> Result<DeviceHandle<vk::Semaphore>> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = unsafe { device.create_semaphore(&create_info, None) }
        .map_err(|e| GpuError::resource("semaphore", e))?;
    Ok(unsafe { device_handle(device, semaphore) })
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(
    device: &Arc<ash::Device>,
    signaled: bool,
) -> Result<DeviceHandle<vk::Fence>> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = unsafe { device.create_fence(&create_info, None) }
        .map_err(|e| GpuError::resource("fence", e))?;
    Ok(unsafe { device_handle(device, fence) })
}

/// Wait for a fence to be signaled.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn wait_for_fence(
    device: &ash::Device,
    fence: vk::Fence,
    timeout_ns: u64,
) -> Result<()> {
    unsafe { device.wait_for_fences(&[fence], true, timeout_ns)? };
    Ok(())
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    unsafe { device.reset_fences(&[fence])? };
    Ok(())
}
