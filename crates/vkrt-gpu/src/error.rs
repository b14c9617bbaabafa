//! GPU error types.

use ash::vk;
use std::fmt::Display;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// A buffer, image, structure, fence, semaphore or command pool could not be created.
    #[error("Failed to create {resource}: {reason}")]
    ResourceCreation {
        resource: &'static str,
        reason: String,
    },

    /// A required extension entry point could not be resolved.
    #[error("Driver function unavailable: {0}")]
    DriverFunctionUnavailable(String),

    /// Acquire or present returned a non-success status.
    #[error("Presentation failed: {0}")]
    Presentation(vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader module creation failed.
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl GpuError {
    /// Shorthand for [`GpuError::ResourceCreation`].
    pub fn resource(resource: &'static str, reason: impl Display) -> Self {
        Self::ResourceCreation {
            resource,
            reason: reason.to_string(),
        }
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_message_names_the_object() {
        let err = GpuError::resource("fence", "out of host memory");
        assert_eq!(err.to_string(), "Failed to create fence: out of host memory");
    }
}
