//! Device-resident meshes.

use crate::error::Result;
use ash::vk;
use vkrt_accel::GeometryBuildInput;
use vkrt_core::{MeshData, Vertex};
use vkrt_gpu::{GpuBuffer, TransferContext};

/// Vertex and index buffers of one mesh, uploaded once and never modified.
pub struct GpuMesh {
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    index_count: u32,
    build_input: GeometryBuildInput,
}

impl GpuMesh {
    /// Upload `mesh` through staging buffers, blocking until both copies finish.
    ///
    /// The buffers double as acceleration structure build inputs. Counts that
    /// do not fit in 32 bits are rejected before anything is uploaded.
    pub fn upload(transfer: &TransferContext, mesh: &MeshData, mesh_index: usize) -> Result<Self> {
        let index_count = mesh.index_count()?;
        mesh.max_vertex()?;
        let input_usage = vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
            | vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR;

        let vertex_buffer = transfer.upload_slice(
            &mesh.vertices,
            vk::BufferUsageFlags::VERTEX_BUFFER | input_usage,
            &format!("mesh_{mesh_index}_vertices"),
        )?;
        let index_buffer = transfer.upload_slice(
            &mesh.indices,
            vk::BufferUsageFlags::INDEX_BUFFER | input_usage,
            &format!("mesh_{mesh_index}_indices"),
        )?;

        let build_input = GeometryBuildInput::for_mesh(
            mesh,
            vertex_buffer.device_address(),
            index_buffer.device_address(),
        )?;

        tracing::debug!(
            mesh = mesh_index,
            name = mesh.name.as_deref().unwrap_or(""),
            vertices = mesh.vertices.len(),
            indices = mesh.indices.len(),
            "Uploaded mesh"
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count,
            build_input,
        })
    }

    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.buffer()
    }

    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.buffer()
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Geometry description for the bottom-level build of this mesh.
    pub fn build_input(&self) -> GeometryBuildInput {
        self.build_input
    }

    /// Bind both buffers and draw every index.
    ///
    /// # Safety
    /// `cmd` must be recording inside a render pass with a pipeline bound
    /// whose vertex layout matches [`Vertex`].
    pub unsafe fn record_draw(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        unsafe {
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer()], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer(), 0, vk::IndexType::UINT32);
            device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
        }
    }
}

/// Vertex input description matching [`Vertex`].
pub fn vertex_input_layout() -> (
    Vec<vk::VertexInputBindingDescription>,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let bindings = vec![vk::VertexInputBindingDescription {
        binding: 0,
        stride: Vertex::STRIDE as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }];

    let attributes = vec![
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, position) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, normal) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, uv) as u32,
        },
    ];

    (bindings, attributes)
}
