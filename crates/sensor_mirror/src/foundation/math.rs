//! Math utilities and types
//!
//! Thin aliases over `nalgebra` plus the position/rotation/scale transform that
//! is pushed to the backend for every visible instance.

pub use nalgebra::{Quaternion, Unit, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
///
/// Scale is kept per axis; the backend has no hierarchy so world transforms
/// are always flattened before they reach it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Builder-style scale override
    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Compose `self` (parent, world space) with `local` (child, parent space)
    ///
    /// Scale composes per axis, which matches a "lossy" world scale: shear
    /// introduced by rotated non-uniform parents is dropped.
    #[must_use]
    pub fn compose(&self, local: &Self) -> Self {
        Self {
            position: self.position + self.rotation * self.scale.component_mul(&local.position),
            rotation: self.rotation * local.rotation,
            scale: self.scale.component_mul(&local.scale),
        }
    }

    /// Apply this transform to a point
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * self.scale.component_mul(&point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_compose_translates_scaled_child() {
        let parent = Transform::from_position(Vec3::new(1.0, 0.0, 0.0))
            .with_scale(Vec3::new(2.0, 2.0, 2.0));
        let child = Transform::from_position(Vec3::new(0.0, 1.0, 0.0));

        let world = parent.compose(&child);

        assert_relative_eq!(world.position, Vec3::new(1.0, 2.0, 0.0));
        assert_relative_eq!(world.scale, Vec3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_compose_applies_parent_rotation() {
        let quarter_turn = Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_2);
        let parent = Transform::from_position_rotation(Vec3::zeros(), quarter_turn);
        let child = Transform::from_position(Vec3::new(1.0, 0.0, 0.0));

        let world = parent.compose(&child);

        assert_relative_eq!(world.position, Vec3::new(0.0, 1.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(world.transform_point(Vec3::new(1.0, 0.0, 0.0)), Vec3::new(0.0, 2.0, 0.0), epsilon = 1e-6);
    }
}
