//! Bottom-level structures.
//!
//! Each one is shared behind an [`Arc`]. A top-level structure keeps a clone
//! for every mesh it references, so a bottom-level structure cannot be freed
//! while its device address is baked into a top-level build.

use crate::error::{AccelError, Result};
use crate::geometry::GeometryBuildInput;
use crate::structure::AccelerationStructure;
use ash::vk;
use std::sync::Arc;

/// Build flags shared by size queries and builds.
pub(crate) const BOTTOM_LEVEL_FLAGS: vk::BuildAccelerationStructureFlagsKHR =
    vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE;

/// Per-mesh bottom-level acceleration structure.
pub struct BottomLevelStructure {
    structure: AccelerationStructure,
    mesh_index: usize,
}

impl BottomLevelStructure {
    pub(crate) fn new(structure: AccelerationStructure, mesh_index: usize) -> Self {
        Self {
            structure,
            mesh_index,
        }
    }

    /// Mesh this structure was built from.
    pub fn mesh_index(&self) -> usize {
        self.mesh_index
    }

    /// Device address referenced by top-level instance records.
    pub fn device_address(&self) -> vk::DeviceAddress {
        self.structure.device_address()
    }

    /// Raw structure handle.
    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.structure.handle()
    }

    /// Size of the backing storage in bytes.
    pub fn size(&self) -> u64 {
        self.structure.size()
    }

    /// Record the build of this structure from `input`.
    ///
    /// # Safety
    /// `cmd` must be recording, `input` must describe live buffers and
    /// `scratch_address` must point at enough aligned scratch memory.
    pub(crate) unsafe fn record_build(
        &self,
        cmd: vk::CommandBuffer,
        input: &GeometryBuildInput,
        scratch_address: vk::DeviceAddress,
    ) {
        let geometry = input.geometry();
        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
            .flags(BOTTOM_LEVEL_FLAGS)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .dst_acceleration_structure(self.handle())
            .geometries(std::slice::from_ref(&geometry))
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: scratch_address,
            });

        let build_range = input.build_range();

        unsafe {
            self.structure.loader().cmd_build_acceleration_structures(
                cmd,
                &[build_info],
                &[std::slice::from_ref(&build_range)],
            );
        }
    }
}

/// Take sole ownership of a shared bottom-level structure so it can be freed.
///
/// Fails with [`AccelError::StructureInUse`] while any top-level structure
/// still holds a reference; the caller's handle is released but the
/// structure stays alive for its remaining holders.
pub fn release_bottom_level(
    structure: Arc<BottomLevelStructure>,
) -> Result<BottomLevelStructure> {
    let mesh_index = structure.mesh_index;
    try_release(structure, mesh_index)
}

pub(crate) fn try_release<T>(shared: Arc<T>, mesh_index: usize) -> Result<T> {
    Arc::try_unwrap(shared).map_err(|still_shared| AccelError::StructureInUse {
        mesh_index,
        references: Arc::strong_count(&still_shared) - 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sole_owner_can_release() {
        let shared = Arc::new(7_u32);
        assert_eq!(try_release(shared, 0).ok(), Some(7));
    }

    #[test]
    fn release_while_referenced_is_flagged() {
        let shared = Arc::new(7_u32);
        let held_by_top_level = vec![Arc::clone(&shared), Arc::clone(&shared)];

        match try_release(shared, 3) {
            Err(AccelError::StructureInUse {
                mesh_index,
                references,
            }) => {
                assert_eq!(mesh_index, 3);
                assert_eq!(references, 2);
            }
            other => panic!("expected StructureInUse, got {:?}", other.map(|_| ())),
        }

        // The remaining holders keep the value alive.
        assert_eq!(*held_by_top_level[0], 7);
        assert_eq!(Arc::strong_count(&held_by_top_level[0]), 2);
    }

    #[test]
    fn release_succeeds_once_top_level_is_gone() {
        let shared = Arc::new(7_u32);
        let top_level_refs = vec![Arc::clone(&shared)];
        drop(top_level_refs);
        assert!(try_release(shared, 0).is_ok());
    }
}
