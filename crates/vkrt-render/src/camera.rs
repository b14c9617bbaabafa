//! First-person camera.

use glam::{Mat4, Vec3};

/// Highest pitch the camera may look up or down, in degrees.
pub const MAX_PITCH_DEGREES: f32 = 89.0;

/// Yaw/pitch camera with a Vulkan perspective projection.
///
/// Yaw 0 looks down -Z; positive yaw turns left (towards -X).
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    yaw: f32,
    pitch: f32,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            yaw: 0.0,
            pitch: 0.0,
            fov: std::f32::consts::FRAC_PI_4,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 10_000.0,
        }
    }
}

impl Camera {
    /// Create a camera at `position` looking at `target`.
    pub fn looking_at(position: Vec3, target: Vec3, aspect: f32) -> Self {
        let mut camera = Self {
            position,
            aspect,
            ..Self::default()
        };
        camera.look_at(target);
        camera
    }

    /// Yaw in radians, wrapped to `(-PI, PI]`.
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    /// Pitch in radians.
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Turn by the given angles in radians. Pitch is clamped, yaw wraps.
    pub fn rotate(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.yaw = wrap_angle(self.yaw + delta_yaw);
        let limit = MAX_PITCH_DEGREES.to_radians();
        self.pitch = (self.pitch + delta_pitch).clamp(-limit, limit);
    }

    /// Point the camera at `target`.
    pub fn look_at(&mut self, target: Vec3) {
        let dir = (target - self.position).normalize_or_zero();
        if dir == Vec3::ZERO {
            return;
        }
        self.yaw = 0.0;
        self.pitch = 0.0;
        self.rotate((-dir.x).atan2(-dir.z), dir.y.clamp(-1.0, 1.0).asin());
    }

    /// Set the aspect ratio.
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    /// Unit view direction.
    pub fn forward(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(-sin_yaw * cos_pitch, sin_pitch, -cos_yaw * cos_pitch)
    }

    /// Unit vector to the right of the view direction, parallel to the ground.
    pub fn right(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        Vec3::new(cos_yaw, 0.0, -sin_yaw)
    }

    /// Move by `forward` along the view direction, `right` sideways and
    /// `up` along world Y.
    pub fn translate(&mut self, forward: f32, right: f32, up: f32) {
        self.position += self.forward() * forward + self.right() * right + Vec3::Y * up;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }

    /// Right-handed perspective with clip-space Y flipped for Vulkan.
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

fn wrap_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    #[test]
    fn default_looks_down_negative_z() {
        let camera = Camera::default();
        assert_relative_eq!(camera.forward().x, 0.0);
        assert_relative_eq!(camera.forward().y, 0.0);
        assert_relative_eq!(camera.forward().z, -1.0);
        assert_relative_eq!(camera.right().x, 1.0);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = Camera::default();
        camera.rotate(0.0, 10.0);
        assert_relative_eq!(camera.pitch(), MAX_PITCH_DEGREES.to_radians());
        camera.rotate(0.0, -20.0);
        assert_relative_eq!(camera.pitch(), -MAX_PITCH_DEGREES.to_radians());
    }

    #[test]
    fn yaw_wraps() {
        let mut camera = Camera::default();
        camera.rotate(1.5 * PI, 0.0);
        assert_relative_eq!(camera.yaw(), -0.5 * PI, epsilon = 1e-5);
        camera.rotate(-2.0 * PI, 0.0);
        assert_relative_eq!(camera.yaw(), -0.5 * PI, epsilon = 1e-5);
    }

    #[test]
    fn look_at_points_forward_at_target() {
        let camera = Camera::looking_at(Vec3::new(0.0, 0.0, 0.0), Vec3::new(3.0, 4.0, 0.0), 1.0);
        let forward = camera.forward();
        assert_relative_eq!(forward.x, 0.6, epsilon = 1e-5);
        assert_relative_eq!(forward.y, 0.8, epsilon = 1e-5);
        assert_relative_eq!(forward.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn translate_follows_orientation() {
        let mut camera = Camera::default();
        camera.position = Vec3::ZERO;
        camera.translate(2.0, 1.0, 0.5);
        assert_relative_eq!(camera.position.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(camera.position.y, 0.5, epsilon = 1e-6);
        assert_relative_eq!(camera.position.z, -2.0, epsilon = 1e-6);
    }

    #[test]
    fn projection_flips_y() {
        let camera = Camera::default();
        let clip = camera.view_projection_matrix() * glam::Vec4::new(0.0, 1.0, 0.0, 1.0);
        // A point above the camera lands in the upper half, which is -Y in Vulkan.
        assert!(clip.y / clip.w < 0.0);
    }
}
