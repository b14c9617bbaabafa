//! Uploaded scene: GPU meshes plus the instance list that draws them.

use crate::error::Result;
use crate::mesh::GpuMesh;
use crate::uniforms::InstancePushConstants;
use ash::vk;
use vkrt_accel::GeometryBuildInput;
use vkrt_core::{SceneDescription, SceneInstance};
use vkrt_gpu::{GpuError, TransferContext};

/// Device-resident scene, built once at load and dropped after the device is drained.
pub struct GpuScene {
    meshes: Vec<GpuMesh>,
    instances: Vec<SceneInstance>,
}

impl GpuScene {
    /// Upload every mesh of a validated scene.
    ///
    /// Instances naming a missing mesh are rejected before any upload.
    /// Meshes are uploaded before the value exists; a failure drops the ones
    /// already uploaded.
    pub fn upload(transfer: &TransferContext, scene: &SceneDescription) -> Result<Self> {
        scene.check_references()?;
        let meshes = scene
            .meshes
            .iter()
            .enumerate()
            .map(|(i, mesh)| GpuMesh::upload(transfer, mesh, i))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            meshes = meshes.len(),
            instances = scene.instances.len(),
            "Scene uploaded"
        );

        Ok(Self {
            meshes,
            instances: scene.instances.clone(),
        })
    }

    pub fn meshes(&self) -> &[GpuMesh] {
        &self.meshes
    }

    pub fn instances(&self) -> &[SceneInstance] {
        &self.instances
    }

    /// Build inputs for every mesh, in mesh order.
    pub fn build_inputs(&self) -> Vec<GeometryBuildInput> {
        self.meshes.iter().map(GpuMesh::build_input).collect()
    }

    /// Draw every instance with its world matrix as a push constant.
    ///
    /// # Safety
    /// `cmd` must be recording inside a render pass with a pipeline bound
    /// whose layout is `layout`.
    pub unsafe fn record_draws(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
    ) -> vkrt_gpu::Result<()> {
        for (i, instance) in self.instances.iter().enumerate() {
            let mesh = instance_mesh(&self.meshes, i, instance)?;
            let push = InstancePushConstants::new(&instance.transform);
            unsafe {
                device.cmd_push_constants(
                    cmd,
                    layout,
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    bytemuck::bytes_of(&push),
                );
                mesh.record_draw(device, cmd);
            }
        }
        Ok(())
    }
}

/// The mesh `instance` draws. References are checked at upload, so a miss
/// here is a broken invariant rather than bad input.
fn instance_mesh<'a, M>(
    meshes: &'a [M],
    index: usize,
    instance: &SceneInstance,
) -> vkrt_gpu::Result<&'a M> {
    meshes.get(instance.mesh_index).ok_or_else(|| {
        GpuError::InvalidState(format!(
            "Instance {index} references mesh {} of {}",
            instance.mesh_index,
            meshes.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    #[test]
    fn instance_resolves_its_mesh() {
        let meshes = ["a", "b"];
        let instance = SceneInstance::new(1, Mat4::IDENTITY);
        assert_eq!(instance_mesh(&meshes, 0, &instance).ok(), Some(&"b"));
    }

    #[test]
    fn dangling_instance_is_an_error_not_a_skipped_draw() {
        let meshes = ["a"];
        let instance = SceneInstance::new(4, Mat4::IDENTITY);
        match instance_mesh(&meshes, 2, &instance) {
            Err(GpuError::InvalidState(message)) => {
                assert_eq!(message, "Instance 2 references mesh 4 of 1");
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }
}
