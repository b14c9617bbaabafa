//! Triangle geometry descriptions for bottom-level builds.

use ash::vk;
use vkrt_core::{MeshData, Result, Vertex};

/// Device addresses and counts describing one mesh to the driver.
///
/// Derived from an uploaded mesh just before its size query and build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryBuildInput {
    pub vertex_address: vk::DeviceAddress,
    pub index_address: vk::DeviceAddress,
    pub vertex_stride: u64,
    pub max_vertex: u32,
    pub primitive_count: u32,
}

impl GeometryBuildInput {
    /// Describe `mesh` whose vertex and index arrays live at the given addresses.
    ///
    /// Fails when the mesh's counts do not fit the driver's 32-bit fields.
    pub fn for_mesh(
        mesh: &MeshData,
        vertex_address: vk::DeviceAddress,
        index_address: vk::DeviceAddress,
    ) -> Result<Self> {
        Ok(Self {
            vertex_address,
            index_address,
            vertex_stride: Vertex::STRIDE,
            max_vertex: mesh.max_vertex()?,
            primitive_count: mesh.triangle_count()?,
        })
    }

    /// Opaque triangle geometry: `R32G32B32_SFLOAT` positions, `u32` indices.
    pub fn geometry(&self) -> vk::AccelerationStructureGeometryKHR<'static> {
        let triangles = vk::AccelerationStructureGeometryTrianglesDataKHR::default()
            .vertex_format(vk::Format::R32G32B32_SFLOAT)
            .vertex_data(vk::DeviceOrHostAddressConstKHR {
                device_address: self.vertex_address,
            })
            .vertex_stride(self.vertex_stride)
            .max_vertex(self.max_vertex)
            .index_type(vk::IndexType::UINT32)
            .index_data(vk::DeviceOrHostAddressConstKHR {
                device_address: self.index_address,
            });

        vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
            .flags(vk::GeometryFlagsKHR::OPAQUE)
            .geometry(vk::AccelerationStructureGeometryDataKHR { triangles })
    }

    /// Range covering every triangle of the mesh.
    pub fn build_range(&self) -> vk::AccelerationStructureBuildRangeInfoKHR {
        vk::AccelerationStructureBuildRangeInfoKHR::default()
            .primitive_count(self.primitive_count)
            .primitive_offset(0)
            .first_vertex(0)
            .transform_offset(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_mesh_counts() {
        let mesh = MeshData::new(
            None,
            vec![Vertex::default(); 4],
            vec![0, 1, 2, 2, 3, 0],
        );
        let input = GeometryBuildInput::for_mesh(&mesh, 0x1000, 0x2000).unwrap();

        assert_eq!(input.vertex_stride, 32);
        assert_eq!(input.max_vertex, 3);
        assert_eq!(input.primitive_count, 2);
        assert_eq!(input.build_range().primitive_count, 2);
    }

    #[test]
    fn geometry_is_opaque_triangles() {
        let mesh = MeshData::new(None, vec![Vertex::default(); 3], vec![0, 1, 2]);
        let geometry = GeometryBuildInput::for_mesh(&mesh, 0x1000, 0x2000)
            .unwrap()
            .geometry();

        assert_eq!(geometry.geometry_type, vk::GeometryTypeKHR::TRIANGLES);
        assert_eq!(geometry.flags, vk::GeometryFlagsKHR::OPAQUE);

        let triangles = unsafe { geometry.geometry.triangles };
        assert_eq!(triangles.vertex_format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(triangles.index_type, vk::IndexType::UINT32);
        assert_eq!(triangles.max_vertex, 2);
        assert_eq!(unsafe { triangles.vertex_data.device_address }, 0x1000);
        assert_eq!(unsafe { triangles.index_data.device_address }, 0x2000);
    }
}
