//! CPU-side scene model.
//!
//! A [`SceneDescription`] is what the scene loader hands to the GPU side: a
//! list of meshes (vertex and index arrays) plus a list of instances, each
//! naming one mesh and carrying a model transform. Many instances may share
//! a mesh. Nothing here is mutated after load.

use crate::error::{Error, Result};
use crate::math::Aabb;
use glam::{Mat4, Vec3};

/// Interleaved vertex as consumed by both the rasterizer and the
/// acceleration-structure build (position at offset 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    /// Byte stride between consecutive vertices.
    pub const STRIDE: u64 = std::mem::size_of::<Self>() as u64;

    pub const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// Triangle mesh on the host, before upload.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub name: Option<String>,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(name: Option<String>, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            name,
            vertices,
            indices,
        }
    }

    /// Number of indices, as the draw call takes it.
    pub fn index_count(&self) -> Result<u32> {
        gpu_count(self.indices.len(), "index")
    }

    /// Number of triangles (index count / 3).
    pub fn triangle_count(&self) -> Result<u32> {
        gpu_count(self.indices.len() / 3, "triangle")
    }

    /// Highest addressable vertex index.
    pub fn max_vertex(&self) -> Result<u32> {
        gpu_count(self.vertices.len().saturating_sub(1), "vertex")
    }

    /// Local-space bounds of the vertex positions.
    pub fn bounds(&self) -> Aabb {
        let mut aabb = Aabb::EMPTY;
        for v in &self.vertices {
            aabb.expand_to_include(Vec3::from_array(v.position));
        }
        aabb
    }

    /// Check the mesh is a non-empty indexed triangle list with in-range indices.
    pub fn validate(&self, mesh_index: usize) -> Result<()> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(Error::InvalidData(format!("mesh {mesh_index} has no geometry")));
        }
        if self.indices.len() % 3 != 0 {
            return Err(Error::InvalidData(format!(
                "mesh {mesh_index} index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        gpu_count(self.vertices.len(), "vertex")?;
        self.index_count()?;
        let vertex_count = self.vertices.len();
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(Error::InvalidData(format!(
                "mesh {mesh_index} index {bad} out of range for {vertex_count} vertices"
            )));
        }
        Ok(())
    }
}

/// Convert an element count to the `u32` that draw and build commands take.
pub fn gpu_count(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| Error::InvalidData(format!("{what} count {len} does not fit in 32 bits")))
}

/// One placement of a mesh in the world.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneInstance {
    pub mesh_index: usize,
    pub transform: Mat4,
}

impl SceneInstance {
    pub const fn new(mesh_index: usize, transform: Mat4) -> Self {
        Self {
            mesh_index,
            transform,
        }
    }
}

/// Everything the GPU side needs from a loaded scene.
#[derive(Clone, Debug, Default)]
pub struct SceneDescription {
    pub meshes: Vec<MeshData>,
    pub instances: Vec<SceneInstance>,
}

impl SceneDescription {
    pub fn new(meshes: Vec<MeshData>, instances: Vec<SceneInstance>) -> Self {
        Self { meshes, instances }
    }

    /// Check every mesh and every instance reference before any GPU work.
    pub fn validate(&self) -> Result<()> {
        for (i, mesh) in self.meshes.iter().enumerate() {
            mesh.validate(i)?;
        }
        self.check_references()
    }

    /// Reject instances whose mesh index is out of range.
    pub fn check_references(&self) -> Result<()> {
        let mesh_count = self.meshes.len();
        for (instance, inst) in self.instances.iter().enumerate() {
            if inst.mesh_index >= mesh_count {
                return Err(Error::InvalidMeshReference {
                    instance,
                    mesh_index: inst.mesh_index,
                    mesh_count,
                });
            }
        }
        Ok(())
    }

    /// World-space bounds of all instances.
    pub fn bounds(&self) -> Aabb {
        self.instances
            .iter()
            .filter_map(|inst| {
                self.meshes
                    .get(inst.mesh_index)
                    .map(|mesh| mesh.bounds().transformed(&inst.transform))
            })
            .fold(Aabb::EMPTY, |acc, b| acc.merge(&b))
    }

    pub fn total_triangles(&self) -> u64 {
        self.meshes.iter().map(|m| (m.indices.len() / 3) as u64).sum()
    }
}
