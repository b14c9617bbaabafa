//! Math utilities and helpers.

use glam::{Mat4, Quat, Vec3};

/// Axis-Aligned Bounding Box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    /// An inverted box that any point expands into a valid one.
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create a new AABB from min and max corners
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Whether no point has been added yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Get the center of the AABB
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the size of the AABB
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Expand the AABB to include a point
    #[inline]
    pub fn expand_to_include(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Merge two AABBs
    #[inline]
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Bounds of this box after an affine transform (all eight corners).
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        let mut out = Self::EMPTY;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.expand_to_include(matrix.transform_point3(corner));
        }
        out
    }
}

/// Local node matrix composed as translation * rotation * scale.
#[inline]
pub fn compose_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Mat4 {
    Mat4::from_scale_rotation_translation(scale, rotation, translation)
}

/// Pack a column-major model matrix into the row-major 3x4 layout used by
/// acceleration-structure instance records.
///
/// The bottom row of `matrix` is dropped, so only affine matrices survive a
/// round trip through [`from_instance_layout`].
#[inline]
pub fn to_instance_layout(matrix: &Mat4) -> [f32; 12] {
    let rows = matrix.transpose().to_cols_array();
    let mut out = [0.0; 12];
    out.copy_from_slice(&rows[..12]);
    out
}

/// Inverse of [`to_instance_layout`], restoring `(0, 0, 0, 1)` as the bottom row.
#[inline]
pub fn from_instance_layout(rows: &[f32; 12]) -> Mat4 {
    let mut cols = [0.0; 16];
    cols[..12].copy_from_slice(rows);
    cols[15] = 1.0;
    Mat4::from_cols_array(&cols).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_transforms() -> Vec<Mat4> {
        vec![
            Mat4::IDENTITY,
            Mat4::from_translation(Vec3::new(1.0, -2.0, 3.5)),
            compose_trs(
                Vec3::new(10.0, 0.25, -4.0),
                Quat::from_euler(glam::EulerRot::YXZ, 0.3, -1.1, 2.0),
                Vec3::new(2.0, 0.5, 3.0),
            ),
            Mat4::from_scale(Vec3::splat(0.001)) * Mat4::from_rotation_z(1.0),
        ]
    }

    #[test]
    fn instance_layout_is_row_major() {
        let m = Mat4::from_translation(Vec3::new(7.0, 8.0, 9.0));
        let rows = to_instance_layout(&m);
        assert_eq!(
            rows,
            [1.0, 0.0, 0.0, 7.0, 0.0, 1.0, 0.0, 8.0, 0.0, 0.0, 1.0, 9.0]
        );
    }

    #[test]
    fn instance_layout_round_trip() {
        for m in sample_transforms() {
            let back = from_instance_layout(&to_instance_layout(&m));
            for (a, b) in m.to_cols_array().iter().zip(back.to_cols_array().iter()) {
                assert_relative_eq!(a, b, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn trs_order_scales_before_translating() {
        let m = compose_trs(Vec3::new(5.0, 0.0, 0.0), Quat::IDENTITY, Vec3::splat(2.0));
        let p = m.transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 7.0);
    }

    #[test]
    fn aabb_transformed_and_merge() {
        let mut aabb = Aabb::EMPTY;
        assert!(aabb.is_empty());
        aabb.expand_to_include(Vec3::ZERO);
        aabb.expand_to_include(Vec3::ONE);
        assert_eq!(aabb.center(), Vec3::splat(0.5));

        let moved = aabb.transformed(&Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(moved.min, Vec3::new(2.0, 0.0, 0.0));

        let merged = aabb.merge(&moved);
        assert_eq!(merged.size(), Vec3::new(3.0, 1.0, 1.0));
    }
}
