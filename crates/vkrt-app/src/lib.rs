//! Application layer for the vkrt scene loader.
//!
//! This crate provides:
//! - Window creation and the winit event loop
//! - GPU, surface and swapchain setup for a loaded scene
//! - Swapchain recreation on resize or an out-of-date surface
//! - Camera controls
//!
//! # Example
//!
//! ```no_run
//! use vkrt_app::{run, AppConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     run(AppConfig::new("scene.gltf").with_size(1280, 720))
//! }
//! ```

mod config;
mod context;
mod input;
mod runner;

pub use config::AppConfig;
pub use context::AppContext;
pub use input::InputState;
pub use runner::{init_logging, run};

pub use vkrt_render::Camera;
