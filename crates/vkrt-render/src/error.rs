//! Renderer errors.

use thiserror::Error;
use vkrt_accel::AccelError;
use vkrt_gpu::GpuError;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Gpu(#[from] GpuError),

    #[error(transparent)]
    Accel(#[from] AccelError),

    #[error(transparent)]
    Scene(#[from] vkrt_core::Error),
}

impl RenderError {
    /// True for a failed acquire or present.
    pub fn is_presentation(&self) -> bool {
        matches!(
            self,
            Self::Gpu(GpuError::Presentation(_)) | Self::Accel(AccelError::Gpu(GpuError::Presentation(_)))
        )
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn presentation_errors_are_marked() {
        let err = RenderError::from(GpuError::Presentation(vk::Result::ERROR_SURFACE_LOST_KHR));
        assert!(err.is_presentation());

        let err = RenderError::from(GpuError::resource("fence", "out of memory"));
        assert!(!err.is_presentation());
    }
}
