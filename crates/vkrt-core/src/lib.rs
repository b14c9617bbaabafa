//! Core types and math for the vkrt scene loader.
//!
//! This crate provides the foundational types shared by every other crate:
//! - The CPU-side scene model (meshes, vertices, instances)
//! - Transform layout conversions for acceleration-structure instances
//! - Engine-wide error type and constants

pub mod error;
pub mod math;
pub mod scene;

pub use error::{Error, Result};
pub use math::Aabb;
pub use scene::{MeshData, SceneDescription, SceneInstance, Vertex};

/// Engine-wide constants
pub mod constants {
    /// Number of frame slots the renderer cycles through.
    pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
    /// Accumulated bottom-level structure bytes allowed in one build batch.
    pub const BLAS_BATCH_BUDGET_BYTES: u64 = 256_000_000;
    /// Uniform scale applied to the whole scene when rendering.
    pub const DEFAULT_MODEL_SCALE: f32 = 0.001;
    /// Visibility mask written into every top-level instance record.
    pub const INSTANCE_VISIBILITY_MASK: u8 = 0xFF;
}
