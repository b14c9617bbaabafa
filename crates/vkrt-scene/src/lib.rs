//! Scene loading.
//!
//! Reads a glTF 2.0 asset (`.gltf` or `.glb`) into a [`SceneDescription`]:
//! one [`MeshData`](vkrt_core::MeshData) per triangle primitive and one
//! [`SceneInstance`](vkrt_core::SceneInstance) per node that draws it.

pub mod error;
pub mod gltf_loader;

pub use error::{Result, SceneError};
pub use gltf_loader::{load_gltf, load_gltf_slice};

pub use vkrt_core::SceneDescription;
