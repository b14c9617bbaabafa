//! Scene loading errors.

use thiserror::Error;

/// Reasons a glTF asset could not be turned into a scene.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    #[error("Mesh {mesh} primitive {primitive} has no POSITION attribute")]
    MissingPositions { mesh: usize, primitive: usize },

    #[error("Mesh {mesh} primitive {primitive} has {count} vertices, more than 32-bit indices can address")]
    TooManyVertices {
        mesh: usize,
        primitive: usize,
        count: usize,
    },

    #[error("Scene has no drawable instances")]
    NoInstances,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, SceneError>;

impl From<SceneError> for vkrt_core::Error {
    fn from(err: SceneError) -> Self {
        Self::SceneLoad(err.to_string())
    }
}
