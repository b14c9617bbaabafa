//! Acceleration structure builder.
//!
//! Bottom-level structures are built per mesh, in batches whose accumulated
//! structure size stays under a byte budget. One top-level structure is then
//! built over every scene instance.
//!
//! ```text
//! NotBuilt -> SizesQueried -> BottomLevelReady -> Ready
//! ```

pub mod batch;
pub mod blas;
pub mod builder;
pub mod error;
pub mod geometry;
pub mod loader;
pub mod structure;
pub mod tlas;

pub use batch::plan_batches;
pub use blas::{release_bottom_level, BottomLevelStructure};
pub use builder::{build_scene, AccelerationStructureBuilder, BuildPhase, BuildRequest};
pub use error::{AccelError, Result};
pub use geometry::GeometryBuildInput;
pub use loader::{load_acceleration_structure_device, REQUIRED_FUNCTIONS};
pub use structure::AccelerationStructure;
pub use tlas::{
    instance_records, referenced_structures, SceneAccelerationStructure, TopLevelStructure,
    MAX_CUSTOM_INDEX,
};
