//! Error types for the engine.

use thiserror::Error;

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid data error
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The scene asset could not be read or is malformed.
    #[error("Scene load failed: {0}")]
    SceneLoad(String),

    /// An instance names a mesh that does not exist.
    #[error("Instance {instance} references mesh {mesh_index}, but the scene has {mesh_count} meshes")]
    InvalidMeshReference {
        instance: usize,
        mesh_index: usize,
        mesh_count: usize,
    },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
