//! GPU-visible uniform and push-constant layouts.

use crate::camera::Camera;
use glam::Mat4;

/// Per-frame uniform block at set 0, binding 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl FrameUniforms {
    /// Byte size of the block.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Uniforms for `camera`, with the whole scene scaled by `model_scale`.
    pub fn new(camera: &Camera, model_scale: f32) -> Self {
        Self {
            model: Mat4::from_scale(glam::Vec3::splat(model_scale)).to_cols_array_2d(),
            view: camera.view_matrix().to_cols_array_2d(),
            proj: camera.projection_matrix().to_cols_array_2d(),
        }
    }
}

/// Per-instance world matrix pushed before each draw.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstancePushConstants {
    pub instance_model: [[f32; 4]; 4],
}

impl InstancePushConstants {
    /// Byte size of the range.
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn new(transform: &Mat4) -> Self {
        Self {
            instance_model: transform.to_cols_array_2d(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_match_shader_blocks() {
        assert_eq!(FrameUniforms::SIZE, 192);
        assert_eq!(InstancePushConstants::SIZE, 64);
        assert_eq!(std::mem::offset_of!(FrameUniforms, view), 64);
        assert_eq!(std::mem::offset_of!(FrameUniforms, proj), 128);
    }

    #[test]
    fn model_is_uniform_scale() {
        let uniforms = FrameUniforms::new(&Camera::default(), 0.001);
        assert_eq!(uniforms.model[0][0], 0.001);
        assert_eq!(uniforms.model[1][1], 0.001);
        assert_eq!(uniforms.model[2][2], 0.001);
        assert_eq!(uniforms.model[3][3], 1.0);
    }
}
