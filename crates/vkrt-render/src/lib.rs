//! Forward rasterizer and frame pacing for the vkrt scene loader.
//!
//! This crate provides:
//! - Uploaded scene meshes and per-instance draws
//! - A depth-tested mesh pipeline and its render targets
//! - Double-buffered frame slots and the scheduler that cycles them
//! - First-person camera and uniform layouts

pub mod camera;
pub mod context;
pub mod error;
pub mod frame;
pub mod mesh;
pub mod rasterizer;
pub mod renderer;
pub mod scene;
pub mod scheduler;
pub mod uniforms;

pub use camera::Camera;
pub use context::RenderContext;
pub use error::{RenderError, Result};
pub use frame::{FrameSlot, FrameSlots};
pub use mesh::GpuMesh;
pub use rasterizer::Rasterizer;
pub use renderer::Renderer;
pub use scene::GpuScene;
pub use scheduler::{FrameBackend, FrameOutcome, FrameScheduler};
pub use uniforms::{FrameUniforms, InstancePushConstants};
