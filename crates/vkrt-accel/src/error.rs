//! Acceleration structure errors.

use crate::builder::BuildPhase;
use thiserror::Error;
use vkrt_gpu::GpuError;

/// Errors raised while building or tearing down acceleration structures.
#[derive(Error, Debug)]
pub enum AccelError {
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// An instance names a mesh with no bottom-level structure.
    #[error("Instance {instance} references mesh {mesh_index}, but only {mesh_count} bottom-level structures exist")]
    InvalidMeshReference {
        instance: usize,
        mesh_index: usize,
        mesh_count: usize,
    },

    /// A builder step was called out of order.
    #[error("Builder is in phase {actual:?}, expected {expected:?}")]
    InvalidPhase {
        expected: BuildPhase,
        actual: BuildPhase,
    },

    /// A bottom-level structure was released while a top-level structure still uses it.
    #[error("Bottom-level structure for mesh {mesh_index} is still referenced {references} time(s)")]
    StructureInUse { mesh_index: usize, references: usize },

    /// The mesh index does not fit the 24-bit instance custom index.
    #[error("Mesh index {0} does not fit in a 24-bit instance custom index")]
    CustomIndexOverflow(usize),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, AccelError>;
