//! Top-level structure over scene instances.

use crate::blas::BottomLevelStructure;
use crate::error::{AccelError, Result};
use crate::structure::{build_barrier, create_scratch_buffer, query_build_sizes, AccelerationStructure};
use ash::vk;
use std::sync::Arc;
use vkrt_core::constants::INSTANCE_VISIBILITY_MASK;
use vkrt_core::math::to_instance_layout;
use vkrt_core::SceneInstance;
use vkrt_gpu::{write_acceleration_structure, GpuBuffer, GpuError, TransferContext};

/// Largest value the 24-bit instance custom index can hold.
pub const MAX_CUSTOM_INDEX: usize = (1 << 24) - 1;

/// Build one instance record per scene instance.
///
/// The custom index is the mesh index; `blas_addresses[mesh_index]` is the
/// referenced bottom-level structure. Faces are not culled.
pub fn instance_records(
    instances: &[SceneInstance],
    blas_addresses: &[vk::DeviceAddress],
) -> Result<Vec<vk::AccelerationStructureInstanceKHR>> {
    instances
        .iter()
        .enumerate()
        .map(|(i, instance)| {
            let address = *blas_addresses.get(instance.mesh_index).ok_or(
                AccelError::InvalidMeshReference {
                    instance: i,
                    mesh_index: instance.mesh_index,
                    mesh_count: blas_addresses.len(),
                },
            )?;

            if instance.mesh_index > MAX_CUSTOM_INDEX {
                return Err(AccelError::CustomIndexOverflow(instance.mesh_index));
            }

            Ok(vk::AccelerationStructureInstanceKHR {
                transform: vk::TransformMatrixKHR {
                    matrix: to_instance_layout(&instance.transform),
                },
                instance_custom_index_and_mask: vk::Packed24_8::new(
                    instance.mesh_index as u32,
                    INSTANCE_VISIBILITY_MASK,
                ),
                instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(
                    0,
                    vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw() as u8,
                ),
                acceleration_structure_reference: vk::AccelerationStructureReferenceKHR {
                    device_handle: address,
                },
            })
        })
        .collect()
}

/// One clone of every structure an instance points at, in first-use order.
///
/// Structures no instance references are not held. Out-of-range mesh indices
/// are rejected earlier by [`instance_records`] and skipped here.
pub fn referenced_structures<T>(instances: &[SceneInstance], structures: &[Arc<T>]) -> Vec<Arc<T>> {
    let mut referenced: Vec<Arc<T>> = Vec::new();
    for instance in instances {
        let Some(structure) = structures.get(instance.mesh_index) else {
            continue;
        };
        if !referenced.iter().any(|r| Arc::ptr_eq(r, structure)) {
            referenced.push(Arc::clone(structure));
        }
    }
    referenced
}

/// Raw bytes of the instance array, as the driver reads it.
fn instance_bytes(records: &[vk::AccelerationStructureInstanceKHR]) -> &[u8] {
    // SAFETY: the record is a 64-byte repr(C) struct of plain integers and
    // floats with no padding; the byte view lives as long as `records`.
    unsafe {
        std::slice::from_raw_parts(
            records.as_ptr().cast::<u8>(),
            std::mem::size_of_val(records),
        )
    }
}

/// Top-level acceleration structure.
///
/// Holds a reference to every bottom-level structure its instances point at.
pub struct TopLevelStructure {
    structure: AccelerationStructure,
    _instance_buffer: GpuBuffer,
    instance_count: u32,
    bottom_level: Vec<Arc<BottomLevelStructure>>,
}

impl TopLevelStructure {
    /// Upload instance records and build the structure, blocking until done.
    pub fn build(
        transfer: &TransferContext,
        loader: &Arc<crate::loader::AccelerationStructureDevice>,
        scratch_alignment: u64,
        instances: &[SceneInstance],
        bottom_level: &[Arc<BottomLevelStructure>],
    ) -> Result<Self> {
        if instances.is_empty() {
            return Err(GpuError::InvalidState("Scene has no instances".to_string()).into());
        }

        let addresses: Vec<vk::DeviceAddress> =
            bottom_level.iter().map(|b| b.device_address()).collect();
        let records = instance_records(instances, &addresses)?;
        let instance_count = u32::try_from(records.len())
            .map_err(|_| GpuError::InvalidState("Too many instances".to_string()))?;

        let instance_buffer = transfer.upload_bytes(
            instance_bytes(&records),
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            "tlas_instances",
        )?;

        let geometry = vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::INSTANCES)
            .flags(vk::GeometryFlagsKHR::OPAQUE)
            .geometry(vk::AccelerationStructureGeometryDataKHR {
                instances: vk::AccelerationStructureGeometryInstancesDataKHR::default()
                    .array_of_pointers(false)
                    .data(vk::DeviceOrHostAddressConstKHR {
                        device_address: instance_buffer.device_address(),
                    }),
            });

        let size_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(vk::AccelerationStructureTypeKHR::TOP_LEVEL)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(std::slice::from_ref(&geometry));
        let sizes = unsafe { query_build_sizes(loader, &size_info, instance_count) };

        let structure = unsafe {
            AccelerationStructure::new(
                loader,
                transfer.allocator(),
                vk::AccelerationStructureTypeKHR::TOP_LEVEL,
                sizes.acceleration_structure_size,
                "tlas",
            )?
        };
        let scratch = create_scratch_buffer(
            transfer.allocator(),
            sizes.build_scratch_size,
            scratch_alignment,
            "tlas_scratch",
        )?;

        let build_info = size_info
            .dst_acceleration_structure(structure.handle())
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: scratch.device_address(),
            });
        let build_range =
            vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(instance_count);

        transfer.submit_and_wait(|device, cmd| unsafe {
            // Instance upload and bottom-level writes must land before the build reads them.
            build_barrier(device, cmd);
            loader.cmd_build_acceleration_structures(
                cmd,
                &[build_info],
                &[std::slice::from_ref(&build_range)],
            );
        })?;
        drop(scratch);

        let referenced = referenced_structures(instances, bottom_level);

        tracing::info!(
            instances = instance_count,
            size = structure.size(),
            "Built top-level acceleration structure"
        );

        Ok(Self {
            structure,
            _instance_buffer: instance_buffer,
            instance_count,
            bottom_level: referenced,
        })
    }

    /// Raw structure handle.
    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.structure.handle()
    }

    /// Device address of the structure.
    pub fn device_address(&self) -> vk::DeviceAddress {
        self.structure.device_address()
    }

    /// Size of the backing storage in bytes.
    pub fn size(&self) -> u64 {
        self.structure.size()
    }

    /// Number of instance records.
    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Bottom-level structures this structure keeps alive.
    pub fn referenced(&self) -> &[Arc<BottomLevelStructure>] {
        &self.bottom_level
    }
}

/// Opaque handle to the built scene: one top-level structure plus every
/// bottom-level structure, ready to bind for ray queries.
pub struct SceneAccelerationStructure {
    top_level: TopLevelStructure,
    bottom_level: Vec<Arc<BottomLevelStructure>>,
}

impl SceneAccelerationStructure {
    pub(crate) fn new(
        top_level: TopLevelStructure,
        bottom_level: Vec<Arc<BottomLevelStructure>>,
    ) -> Self {
        Self {
            top_level,
            bottom_level,
        }
    }

    /// The top-level structure to bind.
    pub fn top_level(&self) -> &TopLevelStructure {
        &self.top_level
    }

    /// Bottom-level structures, indexed by mesh.
    pub fn bottom_level(&self) -> &[Arc<BottomLevelStructure>] {
        &self.bottom_level
    }

    /// Total bytes of structure storage (bottom-level plus top-level).
    pub fn total_size(&self) -> u64 {
        self.top_level.size() + self.bottom_level.iter().map(|b| b.size()).sum::<u64>()
    }

    /// Point `binding` of `set` at the top-level structure.
    ///
    /// # Safety
    /// The set must have an acceleration structure descriptor at `binding`
    /// and must not be in use by the GPU.
    pub unsafe fn write_descriptor(
        &self,
        device: &ash::Device,
        set: vk::DescriptorSet,
        binding: u32,
    ) {
        unsafe { write_acceleration_structure(device, set, binding, self.top_level.handle()) };
    }

    /// Split into parts, e.g. to drop the top level before releasing meshes.
    pub fn into_parts(self) -> (TopLevelStructure, Vec<Arc<BottomLevelStructure>>) {
        (self.top_level, self.bottom_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blas::try_release;
    use approx::assert_relative_eq;
    use glam::{Mat4, Quat, Vec3};
    use vkrt_core::math::from_instance_layout;

    fn instance(mesh_index: usize, transform: Mat4) -> SceneInstance {
        SceneInstance::new(mesh_index, transform)
    }

    #[test]
    fn record_layout_is_64_bytes() {
        assert_eq!(std::mem::size_of::<vk::AccelerationStructureInstanceKHR>(), 64);
        let records = instance_records(&[instance(0, Mat4::IDENTITY)], &[0x100]).unwrap();
        assert_eq!(instance_bytes(&records).len(), 64);
    }

    #[test]
    fn records_carry_mesh_index_mask_and_address() {
        let addresses = [0x1000, 0x2000, 0x3000];
        let instances = [
            instance(2, Mat4::IDENTITY),
            instance(0, Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0))),
            instance(2, Mat4::IDENTITY),
        ];

        let records = instance_records(&instances, &addresses).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].instance_custom_index_and_mask.low_24(), 2);
        assert_eq!(records[0].instance_custom_index_and_mask.high_8(), 0xFF);
        assert_eq!(
            unsafe { records[0].acceleration_structure_reference.device_handle },
            0x3000
        );
        assert_eq!(
            unsafe { records[1].acceleration_structure_reference.device_handle },
            0x1000
        );
        assert_eq!(
            u32::from(records[1].instance_shader_binding_table_record_offset_and_flags.high_8()),
            vk::GeometryInstanceFlagsKHR::TRIANGLE_FACING_CULL_DISABLE.as_raw()
        );
    }

    #[test]
    fn transform_is_row_major_and_round_trips() {
        let transform = Mat4::from_scale_rotation_translation(
            Vec3::new(2.0, 0.5, 1.5),
            Quat::from_rotation_y(0.7),
            Vec3::new(10.0, -4.0, 3.0),
        );
        let records = instance_records(&[instance(0, transform)], &[0x10]).unwrap();
        let matrix = records[0].transform.matrix;

        // Translation sits in the last column of each row.
        assert_relative_eq!(matrix[3], 10.0);
        assert_relative_eq!(matrix[7], -4.0);
        assert_relative_eq!(matrix[11], 3.0);

        let back = from_instance_layout(&matrix);
        for (a, b) in back.to_cols_array().iter().zip(transform.to_cols_array().iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-5);
        }
    }

    #[test]
    fn out_of_range_mesh_is_an_invalid_reference() {
        let instances = [instance(0, Mat4::IDENTITY), instance(5, Mat4::IDENTITY)];
        match instance_records(&instances, &[0x1000, 0x2000]) {
            Err(AccelError::InvalidMeshReference {
                instance,
                mesh_index,
                mesh_count,
            }) => {
                assert_eq!((instance, mesh_index, mesh_count), (1, 5, 2));
            }
            other => panic!("expected InvalidMeshReference, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn shared_meshes_are_held_once() {
        let meshes: Vec<Arc<u32>> = (0..3).map(Arc::new).collect();
        let instances = [
            instance(2, Mat4::IDENTITY),
            instance(0, Mat4::IDENTITY),
            instance(2, Mat4::from_translation(Vec3::X)),
            instance(0, Mat4::IDENTITY),
        ];

        let referenced = referenced_structures(&instances, &meshes);
        assert_eq!(referenced.len(), 2);
        assert!(Arc::ptr_eq(&referenced[0], &meshes[2]));
        assert!(Arc::ptr_eq(&referenced[1], &meshes[0]));
        assert_eq!(Arc::strong_count(&meshes[0]), 2);
        assert_eq!(Arc::strong_count(&meshes[2]), 2);
    }

    #[test]
    fn unreferenced_meshes_are_not_held() {
        let meshes: Vec<Arc<u32>> = (0..3).map(Arc::new).collect();
        let referenced = referenced_structures(&[instance(1, Mat4::IDENTITY)], &meshes);

        assert_eq!(referenced.len(), 1);
        assert_eq!(Arc::strong_count(&meshes[0]), 1);
        assert_eq!(Arc::strong_count(&meshes[1]), 2);
        assert_eq!(Arc::strong_count(&meshes[2]), 1);
    }

    #[test]
    fn referenced_mesh_cannot_be_released() {
        let mut meshes: Vec<Arc<u32>> = (0..2).map(Arc::new).collect();
        let held = referenced_structures(&[instance(0, Mat4::IDENTITY)], &meshes);

        let unreferenced = meshes.pop().unwrap();
        assert_eq!(try_release(unreferenced, 1).ok(), Some(1));

        let referenced = meshes.pop().unwrap();
        assert!(matches!(
            try_release(referenced, 0),
            Err(AccelError::StructureInUse {
                mesh_index: 0,
                references: 1,
            })
        ));

        // Dropping the top level's clones frees the mesh for release.
        assert_eq!(Arc::strong_count(&held[0]), 1);
        let last = held.into_iter().next().unwrap();
        assert_eq!(try_release(last, 0).ok(), Some(0));
    }

    #[test]
    fn empty_instance_list_has_no_records() {
        assert!(instance_records(&[], &[0x1000]).unwrap().is_empty());
    }
}
