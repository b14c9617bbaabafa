//! Surface management for windowed rendering.
//!
//! Provides abstractions for Vulkan surface creation and management,
//! hiding the raw-window-handle complexity from application code.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::handle::OwnedHandle;
use crate::swapchain::{calculate_extent, select_present_mode, select_surface_format, Swapchain};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;

/// Surface context for windowed rendering.
///
/// Owns the Vulkan surface and the swapchain loader for a window. Must be
/// dropped before the [`GpuContext`] it was created from.
pub struct SurfaceContext {
    surface: OwnedHandle<vk::SurfaceKHR, ash::khr::surface::Instance>,
    swapchain_loader: Arc<ash::khr::swapchain::Device>,
}

impl SurfaceContext {
    /// Create a new surface context from a window.
    ///
    /// # Safety
    /// The GPU context must have been built with the window's display handle,
    /// and the window must outlive the returned surface.
    pub unsafe fn from_window<W>(gpu: &GpuContext, window: &W) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

        let surface = unsafe {
            ash_window::create_surface(
                gpu.entry(),
                gpu.instance(),
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

        let surface_loader = ash::khr::surface::Instance::new(gpu.entry(), gpu.instance());
        let surface = unsafe { OwnedHandle::new(surface, surface_loader) };
        let swapchain_loader = Arc::new(ash::khr::swapchain::Device::new(
            gpu.instance(),
            gpu.device(),
        ));

        Ok(Self {
            surface,
            swapchain_loader,
        })
    }

    /// Raw surface handle.
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface.raw()
    }

    fn surface_loader(&self) -> &ash::khr::surface::Instance {
        self.surface.destroyer()
    }

    /// Whether the graphics queue family can present to this surface.
    pub fn supports_present(&self, gpu: &GpuContext) -> Result<bool> {
        let supported = unsafe {
            self.surface_loader().get_physical_device_surface_support(
                gpu.physical_device(),
                gpu.graphics_queue_family(),
                self.surface(),
            )?
        };
        Ok(supported)
    }

    /// Query surface capabilities.
    pub fn capabilities(&self, gpu: &GpuContext) -> Result<SurfaceCapabilities> {
        let loader = self.surface_loader();
        unsafe {
            let caps = loader
                .get_physical_device_surface_capabilities(gpu.physical_device(), self.surface())?;

            let formats =
                loader.get_physical_device_surface_formats(gpu.physical_device(), self.surface())?;

            let present_modes = loader
                .get_physical_device_surface_present_modes(gpu.physical_device(), self.surface())?;

            Ok(SurfaceCapabilities {
                capabilities: caps,
                formats,
                present_modes,
            })
        }
    }

    /// Create a swapchain for this surface, retiring `old` if given.
    ///
    /// # Safety
    /// `old` must have been created from this surface.
    pub unsafe fn create_swapchain(
        &self,
        gpu: &GpuContext,
        width: u32,
        height: u32,
        vsync: bool,
        old: Option<&Swapchain>,
    ) -> Result<Swapchain> {
        let caps = self.capabilities(gpu)?;

        let surface_format = caps
            .recommended_format()
            .ok_or_else(|| GpuError::SwapchainCreation("Surface reports no formats".to_string()))?;
        let present_mode = caps.recommended_present_mode(vsync);
        let extent = calculate_extent(&caps.capabilities, width, height);

        unsafe {
            Swapchain::new(
                gpu.device_arc(),
                &self.swapchain_loader,
                self.surface(),
                &caps.capabilities,
                surface_format,
                present_mode,
                extent,
                old.map_or(vk::SwapchainKHR::null(), Swapchain::handle),
            )
        }
    }

    /// Replace `swapchain` with one sized for the current window.
    ///
    /// # Safety
    /// The GPU must be done with the old swapchain's images.
    pub unsafe fn recreate_swapchain(
        &self,
        gpu: &GpuContext,
        swapchain: &mut Swapchain,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<()> {
        let replacement =
            unsafe { self.create_swapchain(gpu, width, height, vsync, Some(swapchain))? };
        // The retired swapchain is destroyed here.
        *swapchain = replacement;
        Ok(())
    }
}

/// Surface capabilities query result.
pub struct SurfaceCapabilities {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceCapabilities {
    /// Get the recommended surface format.
    pub fn recommended_format(&self) -> Option<vk::SurfaceFormatKHR> {
        select_surface_format(&self.formats)
    }

    /// Get the recommended present mode.
    pub fn recommended_present_mode(&self, vsync: bool) -> vk::PresentModeKHR {
        select_present_mode(&self.present_modes, vsync)
    }
}
