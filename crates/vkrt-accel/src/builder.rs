//! Builder state machine driving size queries, batched bottom-level builds
//! and the single top-level build.

use crate::batch::plan_batches;
use crate::blas::{BottomLevelStructure, BOTTOM_LEVEL_FLAGS};
use crate::error::{AccelError, Result};
use crate::geometry::GeometryBuildInput;
use crate::loader::{load_acceleration_structure_device, AccelerationStructureDevice};
use crate::structure::{build_barrier, create_scratch_buffer, query_build_sizes, AccelerationStructure};
use crate::tlas::{SceneAccelerationStructure, TopLevelStructure};
use ash::vk;
use std::sync::Arc;
use vkrt_core::SceneInstance;
use vkrt_gpu::{GpuContext, TransferContext};

/// Progress of one builder. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    NotBuilt,
    SizesQueried,
    BottomLevelReady,
    Ready,
}

impl BuildPhase {
    /// Phase reached after a successful step from `self`.
    pub const fn next(self) -> Self {
        match self {
            Self::NotBuilt => Self::SizesQueried,
            Self::SizesQueried => Self::BottomLevelReady,
            Self::BottomLevelReady | Self::Ready => Self::Ready,
        }
    }

    fn expect(self, expected: Self) -> Result<()> {
        if self == expected {
            Ok(())
        } else {
            Err(AccelError::InvalidPhase {
                expected,
                actual: self,
            })
        }
    }
}

/// Size query result for one mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildRequest {
    pub geometry: GeometryBuildInput,
    pub structure_size: u64,
    pub scratch_size: u64,
}

/// Builds every acceleration structure for one static scene.
///
/// A builder is single-use; a new scene needs a new builder.
pub struct AccelerationStructureBuilder<'a> {
    transfer: &'a TransferContext,
    loader: Arc<AccelerationStructureDevice>,
    scratch_alignment: u64,
    batch_budget: u64,
    phase: BuildPhase,
    requests: Vec<BuildRequest>,
    bottom_level: Vec<Arc<BottomLevelStructure>>,
}

impl<'a> AccelerationStructureBuilder<'a> {
    /// Resolve the extension entry points and prepare an empty builder.
    pub fn new(gpu: &GpuContext, transfer: &'a TransferContext, batch_budget: u64) -> Result<Self> {
        let loader = load_acceleration_structure_device(gpu)?;
        let scratch_alignment = gpu.capabilities().scratch_alignment();

        tracing::debug!(batch_budget, scratch_alignment, "Acceleration structure builder ready");

        Ok(Self {
            transfer,
            loader,
            scratch_alignment,
            batch_budget,
            phase: BuildPhase::NotBuilt,
            requests: Vec::new(),
            bottom_level: Vec::new(),
        })
    }

    /// Current phase.
    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    /// Requests produced by [`Self::query_sizes`].
    pub fn requests(&self) -> &[BuildRequest] {
        &self.requests
    }

    /// Ask the driver how large each mesh's structure and scratch must be.
    /// Nothing is allocated.
    pub fn query_sizes(&mut self, inputs: &[GeometryBuildInput]) -> Result<&[BuildRequest]> {
        self.phase.expect(BuildPhase::NotBuilt)?;

        self.requests = inputs
            .iter()
            .map(|input| {
                let geometry = input.geometry();
                let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
                    .ty(vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL)
                    .flags(BOTTOM_LEVEL_FLAGS)
                    .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
                    .geometries(std::slice::from_ref(&geometry));
                let sizes =
                    unsafe { query_build_sizes(&self.loader, &build_info, input.primitive_count) };

                BuildRequest {
                    geometry: *input,
                    structure_size: sizes.acceleration_structure_size,
                    scratch_size: sizes.build_scratch_size,
                }
            })
            .collect();

        tracing::debug!(
            meshes = self.requests.len(),
            total_bytes = self.requests.iter().map(|r| r.structure_size).sum::<u64>(),
            "Queried bottom-level build sizes"
        );

        self.phase = self.phase.next();
        Ok(&self.requests)
    }

    /// Build every bottom-level structure, one batch per submission.
    pub fn build_bottom_level(&mut self) -> Result<&[Arc<BottomLevelStructure>]> {
        self.phase.expect(BuildPhase::SizesQueried)?;

        let sizes: Vec<u64> = self.requests.iter().map(|r| r.structure_size).collect();
        let max_scratch = self
            .requests
            .iter()
            .map(|r| r.scratch_size)
            .max()
            .unwrap_or(0);
        let batches = plan_batches(&sizes, self.batch_budget);

        let mut built = Vec::with_capacity(self.requests.len());
        for (batch_index, batch) in batches.iter().enumerate() {
            let scratch = create_scratch_buffer(
                self.transfer.allocator(),
                max_scratch,
                self.scratch_alignment,
                "blas_scratch",
            )?;
            let scratch_address = scratch.device_address();

            let mut structures = Vec::with_capacity(batch.len());
            for mesh_index in batch.clone() {
                let structure = unsafe {
                    AccelerationStructure::new(
                        &self.loader,
                        self.transfer.allocator(),
                        vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
                        self.requests[mesh_index].structure_size,
                        &format!("blas_{mesh_index}"),
                    )?
                };
                structures.push(BottomLevelStructure::new(structure, mesh_index));
            }

            let requests = &self.requests[batch.clone()];
            self.transfer.submit_and_wait(|device, cmd| {
                for (blas, request) in structures.iter().zip(requests) {
                    // Every build in the batch reuses one scratch region, so each
                    // must finish before the next starts.
                    unsafe {
                        build_barrier(device, cmd);
                        blas.record_build(cmd, &request.geometry, scratch_address);
                    }
                }
            })?;
            drop(scratch);

            tracing::debug!(
                batch = batch_index,
                meshes = batch.len(),
                bytes = requests.iter().map(|r| r.structure_size).sum::<u64>(),
                "Built bottom-level batch"
            );

            built.extend(structures.into_iter().map(Arc::new));
        }

        tracing::info!(
            meshes = built.len(),
            batches = batches.len(),
            "Built bottom-level acceleration structures"
        );

        self.bottom_level = built;
        self.phase = self.phase.next();
        Ok(&self.bottom_level)
    }

    /// Build the top-level structure over `instances` and hand out the result.
    pub fn build_top_level(&mut self, instances: &[SceneInstance]) -> Result<SceneAccelerationStructure> {
        self.phase.expect(BuildPhase::BottomLevelReady)?;

        let top_level = TopLevelStructure::build(
            self.transfer,
            &self.loader,
            self.scratch_alignment,
            instances,
            &self.bottom_level,
        )?;

        self.phase = self.phase.next();
        Ok(SceneAccelerationStructure::new(
            top_level,
            std::mem::take(&mut self.bottom_level),
        ))
    }
}

/// Run every builder step for one scene.
pub fn build_scene(
    gpu: &GpuContext,
    transfer: &TransferContext,
    batch_budget: u64,
    inputs: &[GeometryBuildInput],
    instances: &[SceneInstance],
) -> Result<SceneAccelerationStructure> {
    let mut builder = AccelerationStructureBuilder::new(gpu, transfer, batch_budget)?;
    builder.query_sizes(inputs)?;
    builder.build_bottom_level()?;
    let scene = builder.build_top_level(instances)?;

    tracing::info!(
        total_bytes = scene.total_size(),
        tlas_address = scene.top_level().device_address(),
        "Scene acceleration structures ready"
    );
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_in_order() {
        let mut phase = BuildPhase::NotBuilt;
        let mut seen = vec![phase];
        for _ in 0..3 {
            phase = phase.next();
            seen.push(phase);
        }
        assert_eq!(
            seen,
            vec![
                BuildPhase::NotBuilt,
                BuildPhase::SizesQueried,
                BuildPhase::BottomLevelReady,
                BuildPhase::Ready,
            ]
        );
    }

    #[test]
    fn ready_is_terminal() {
        assert_eq!(BuildPhase::Ready.next(), BuildPhase::Ready);
    }

    #[test]
    fn out_of_order_step_is_rejected() {
        match BuildPhase::NotBuilt.expect(BuildPhase::BottomLevelReady) {
            Err(AccelError::InvalidPhase { expected, actual }) => {
                assert_eq!(expected, BuildPhase::BottomLevelReady);
                assert_eq!(actual, BuildPhase::NotBuilt);
            }
            other => panic!("expected InvalidPhase, got {other:?}"),
        }
        assert!(BuildPhase::SizesQueried.expect(BuildPhase::SizesQueried).is_ok());
    }

    #[test]
    fn finished_builder_cannot_restart() {
        assert!(BuildPhase::Ready.expect(BuildPhase::NotBuilt).is_err());
    }
}
