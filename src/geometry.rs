//! Geometry utilities for orienting and smoothing the driven object.

use bevy::prelude::*;

/// A look-at frame built from a forward direction.
///
/// Follows the Bevy camera convention: the rotation produced by
/// [`LookFrame::to_rotation`] points the local -Z axis along `forward`.
#[derive(Debug, Clone, Copy)]
pub struct LookFrame {
    /// The normalized viewing direction.
    pub forward: Vec3,
    /// The right direction (perpendicular to forward and up).
    pub right: Vec3,
    /// The corrected up direction.
    pub up: Vec3,
}

impl LookFrame {
    /// Build a frame from a forward direction and preferred up.
    ///
    /// Falls back to X as the reference axis when `forward` is parallel
    /// to `preferred_up`.
    pub fn from_forward(forward: Vec3, preferred_up: Vec3) -> Self {
        let forward = forward.normalize_or_zero();
        let back = -forward;

        let right = preferred_up.cross(back).normalize_or_zero();
        let (right, up) = if right.length_squared() < 0.001 {
            let right = Vec3::X.cross(back).normalize_or_zero();
            (right, back.cross(right).normalize_or_zero())
        } else {
            (right, back.cross(right).normalize_or_zero())
        };

        Self { forward, right, up }
    }

    /// Check if this frame is valid (non-degenerate).
    pub fn is_valid(&self) -> bool {
        self.forward.length_squared() > 0.001
            && self.right.length_squared() > 0.001
            && self.up.length_squared() > 0.001
    }

    /// Convert to a rotation quaternion.
    pub fn to_rotation(&self) -> Quat {
        if !self.is_valid() {
            return Quat::IDENTITY;
        }
        Quat::from_mat3(&Mat3::from_cols(self.right, self.up, -self.forward))
    }
}

/// Rotation that looks along `direction` with +Y up.
///
/// Returns `None` for a zero direction.
pub fn look_rotation(direction: Vec3) -> Option<Quat> {
    let frame = LookFrame::from_forward(direction, Vec3::Y);
    frame.is_valid().then(|| frame.to_rotation())
}

/// Yaw of `direction` on the horizontal plane, in degrees within `[0, 360)`.
///
/// Measured from +Z towards +X. A direction with no horizontal component
/// has a yaw of zero.
pub fn planar_yaw_degrees(direction: Vec3) -> f32 {
    if direction.x.abs() < f32::EPSILON && direction.z.abs() < f32::EPSILON {
        return 0.0;
    }
    direction.x.atan2(direction.z).to_degrees().rem_euclid(360.0)
}

/// Horizontal unit direction for a yaw in degrees. Inverse of [`planar_yaw_degrees`].
pub fn planar_direction(yaw_degrees: f32) -> Vec3 {
    let (sin, cos) = yaw_degrees.to_radians().sin_cos();
    Vec3::new(sin, 0.0, cos)
}

/// Blend factor for exponential smoothing over `dt` with time constant `damping`.
///
/// A non-positive damping means no smoothing.
#[inline]
pub fn damp_factor(dt: f32, damping: f32) -> f32 {
    if damping <= 0.0 {
        return 1.0;
    }
    (1.0 - (-dt.max(0.0) / damping).exp()).clamp(0.0, 1.0)
}

/// Move `current` towards `target` with exponential damping.
pub fn damp_position(current: Vec3, target: Vec3, dt: f32, damping: f32) -> Vec3 {
    current.lerp(target, damp_factor(dt, damping))
}

/// Rotate `current` towards `target` with exponential damping.
pub fn damp_rotation(current: Quat, target: Quat, dt: f32, damping: f32) -> Quat {
    current.slerp(target, damp_factor(dt, damping))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_look_rotation_points_negative_z_forward() {
        let direction = Vec3::new(1.0, 0.0, 1.0);
        let rotation = look_rotation(direction).unwrap();
        let forward = rotation * Vec3::NEG_Z;
        assert!((forward - direction.normalize()).length() < 0.001);
        assert!((rotation * Vec3::Y).y > 0.0);
    }

    #[test]
    fn test_look_rotation_degenerate() {
        assert!(look_rotation(Vec3::ZERO).is_none());
        // Straight down still produces a usable rotation
        let rotation = look_rotation(Vec3::NEG_Y).unwrap();
        assert!((rotation * Vec3::NEG_Z - Vec3::NEG_Y).length() < 0.001);
    }

    #[test]
    fn test_planar_yaw_round_trip() {
        for yaw in [0.0, 45.0, 90.0, 180.0, 270.0, 359.0] {
            let direction = planar_direction(yaw) * 3.0 + Vec3::Y * 2.0;
            assert!((planar_yaw_degrees(direction) - yaw).abs() < 0.01);
        }
        assert_eq!(planar_yaw_degrees(Vec3::Y), 0.0);
    }

    #[test]
    fn test_damping_converges() {
        let target = Vec3::new(10.0, 0.0, 0.0);
        let mut current = Vec3::ZERO;
        for _ in 0..600 {
            current = damp_position(current, target, 1.0 / 60.0, 0.3);
        }
        assert!((current - target).length() < 0.001);

        // No damping snaps immediately
        assert_eq!(damp_position(Vec3::ZERO, target, 0.016, 0.0), target);
        assert_eq!(damp_factor(0.0, 0.5), 0.0);
    }

    #[test]
    fn test_rotation_damping_moves_towards_target() {
        let target = Quat::from_rotation_y(1.0);
        let current = damp_rotation(Quat::IDENTITY, target, 0.1, 0.75);
        assert!(current.angle_between(target) < Quat::IDENTITY.angle_between(target));
    }
}
