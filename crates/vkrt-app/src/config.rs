//! Application configuration.

use std::path::PathBuf;
use vkrt_core::constants::{BLAS_BATCH_BUDGET_BYTES, DEFAULT_MODEL_SCALE};

/// Application configuration.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// glTF file to load.
    pub scene_path: PathBuf,
    /// Bottom-level structure bytes allowed per build batch.
    pub batch_budget: u64,
    /// Uniform scale applied to the whole scene.
    pub model_scale: f32,
    /// Camera speed in scaled units per second.
    pub camera_speed: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "vkrt".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            validation: cfg!(debug_assertions),
            scene_path: PathBuf::new(),
            batch_budget: BLAS_BATCH_BUDGET_BYTES,
            model_scale: DEFAULT_MODEL_SCALE,
            camera_speed: 2.0,
        }
    }
}

impl AppConfig {
    /// Create a config that loads `scene_path`.
    pub fn new(scene_path: impl Into<PathBuf>) -> Self {
        Self {
            scene_path: scene_path.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_batch_budget(mut self, bytes: u64) -> Self {
        self.batch_budget = bytes;
        self
    }

    pub fn with_model_scale(mut self, scale: f32) -> Self {
        self.model_scale = scale;
        self
    }

    pub fn with_camera_speed(mut self, speed: f32) -> Self {
        self.camera_speed = speed;
        self
    }

    /// Check values the GPU setup cannot recover from.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.scene_path.as_os_str().is_empty(),
            "no scene file given"
        );
        anyhow::ensure!(self.width > 0 && self.height > 0, "window size must be non-zero");
        anyhow::ensure!(self.batch_budget > 0, "batch budget must be positive");
        anyhow::ensure!(
            self.model_scale.is_finite() && self.model_scale > 0.0,
            "model scale must be a positive number"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_engine_constants() {
        let config = AppConfig::new("scene.gltf");
        assert_eq!(config.batch_budget, 256_000_000);
        assert_eq!(config.model_scale, 0.001);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_overrides_fields() {
        let config = AppConfig::new("a.glb")
            .with_title("test")
            .with_size(640, 480)
            .with_vsync(false)
            .with_batch_budget(1024)
            .with_model_scale(1.0)
            .with_camera_speed(10.0);

        assert_eq!(config.title, "test");
        assert_eq!((config.width, config.height), (640, 480));
        assert!(!config.vsync);
        assert_eq!(config.batch_budget, 1024);
        assert_eq!(config.model_scale, 1.0);
        assert_eq!(config.camera_speed, 10.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(AppConfig::default().validate().is_err());
        assert!(AppConfig::new("a.gltf").with_batch_budget(0).validate().is_err());
        assert!(AppConfig::new("a.gltf").with_model_scale(-1.0).validate().is_err());
        assert!(AppConfig::new("a.gltf").with_size(0, 10).validate().is_err());
    }
}
