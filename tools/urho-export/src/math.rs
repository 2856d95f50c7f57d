//! Authoring space to engine space conversion
//!
//! The authoring tool is right-handed with Z up; Urho3D is left-handed with
//! Y up. Conversion is an orientation rotation (which authoring axis faces
//! forward) followed by the fixed Y/Z swap:
//!
//! ```text
//! position   (x, y, z)    -> (x, z, y)
//! quaternion (w, x, y, z) -> (w, -x, -z, -y)
//! ```

use glam::{Mat4, Quat, Vec3};
use serde::Deserialize;
use std::f32::consts::{FRAC_PI_2, PI};

use crate::config::Orientation;

/// Translation, rotation and scale of a node or bone
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "TransformData")]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn from_translation_rotation(translation: Vec3, rotation: Quat) -> Self {
        Self::new(translation, rotation, Vec3::ONE)
    }

    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    pub fn from_mat4(m: &Mat4) -> Self {
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        Self::new(translation, rotation.normalize(), scale)
    }

    /// `self * child`: the child expressed in this transform's parent space
    pub fn mul(&self, child: &Transform) -> Transform {
        Self::from_mat4(&(self.to_mat4() * child.to_mat4()))
    }

    pub fn inverse(&self) -> Transform {
        Self::from_mat4(&self.to_mat4().inverse())
    }

    /// Transform of `self` relative to `parent`
    pub fn relative_to(&self, parent: &Transform) -> Transform {
        Self::from_mat4(&(parent.to_mat4().inverse() * self.to_mat4()))
    }
}

/// Serialized transform, rotation stored w-first
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct TransformData {
    position: [f32; 3],
    rotation: [f32; 4],
    scale: [f32; 3],
}

impl Default for TransformData {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [1.0, 0.0, 0.0, 0.0],
            scale: [1.0; 3],
        }
    }
}

impl From<TransformData> for Transform {
    fn from(data: TransformData) -> Self {
        Transform::new(
            Vec3::from_array(data.position),
            quat_wxyz(data.rotation),
            Vec3::from_array(data.scale),
        )
    }
}

/// Build a normalized quaternion from w-first components
pub fn quat_wxyz(q: [f32; 4]) -> Quat {
    let quat = Quat::from_xyzw(q[1], q[2], q[3], q[0]);
    if quat.length_squared() > 0.0 {
        quat.normalize()
    } else {
        Quat::IDENTITY
    }
}

pub fn remap_vec3(v: Vec3) -> Vec3 {
    Vec3::new(v.x, v.z, v.y)
}

pub fn remap_quat(q: Quat) -> Quat {
    Quat::from_xyzw(-q.x, -q.z, -q.y, q.w)
}

/// Rotation applied before the axis remap for each orientation
pub fn orientation_quat(orientation: Orientation) -> Quat {
    match orientation {
        Orientation::XPlus => Quat::from_rotation_z(FRAC_PI_2),
        Orientation::XMinus => Quat::from_rotation_z(-FRAC_PI_2),
        Orientation::YPlus => Quat::IDENTITY,
        Orientation::YMinus => Quat::from_rotation_z(PI),
        Orientation::ZPlus => Quat::from_rotation_x(-FRAC_PI_2) * Quat::from_rotation_z(PI),
        Orientation::ZMinus => Quat::from_rotation_x(FRAC_PI_2) * Quat::from_rotation_z(PI),
    }
}

/// Orientation, scale and axis remap of one export pass
#[derive(Debug, Clone, Copy)]
pub struct SpaceTransform {
    orientation: Quat,
    scale: f32,
}

impl SpaceTransform {
    pub fn new(orientation: Quat, scale: f32) -> Self {
        Self { orientation, scale }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Vertex position in model space
    pub fn point(&self, p: Vec3) -> Vec3 {
        remap_vec3(self.orientation * (p * self.scale))
    }

    /// Normal or other unit direction in model space
    pub fn direction(&self, n: Vec3) -> Vec3 {
        remap_vec3(self.orientation * n).normalize_or_zero()
    }

    fn remap_scale(s: Vec3) -> Vec3 {
        Vec3::new(s.x, s.z, s.y)
    }

    /// Root bone transform: the model's orientation applies on the left
    pub fn root_transform(&self, t: &Transform) -> Transform {
        Transform::new(
            self.point(t.translation),
            remap_quat(self.orientation * t.rotation),
            Self::remap_scale(t.scale),
        )
    }

    /// Child bone transform, relative to an already converted parent
    pub fn local_transform(&self, t: &Transform) -> Transform {
        Transform::new(
            remap_vec3(t.translation * self.scale),
            remap_quat(t.rotation),
            Self::remap_scale(t.scale),
        )
    }

    /// Scene node transform: the orientation is conjugated so vertex data
    /// rotated by it ends up where the authored object was
    pub fn node_transform(&self, t: &Transform) -> Transform {
        let scale = (self.orientation * t.scale).abs();
        Transform::new(
            self.point(t.translation),
            remap_quat(self.orientation * t.rotation * self.orientation.inverse()),
            Self::remap_scale(scale),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_remap_swaps_y_and_z() {
        assert_eq!(remap_vec3(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(1.0, 3.0, 2.0));
        let q = remap_quat(Quat::from_xyzw(0.1, 0.2, 0.3, 0.9));
        assert_eq!(q, Quat::from_xyzw(-0.1, -0.3, -0.2, 0.9));
    }

    #[test]
    fn test_remapped_rotation_matches_remapped_points() {
        // Rotating then remapping equals remapping then rotating by the remapped quaternion
        let q = Quat::from_axis_angle(Vec3::new(0.3, -0.5, 0.8).normalize(), 1.1);
        let p = Vec3::new(0.4, -1.2, 2.5);
        assert!(close(remap_vec3(q * p), remap_quat(q) * remap_vec3(p)));
    }

    #[test]
    fn test_y_plus_is_plain_remap() {
        let space = SpaceTransform::new(orientation_quat(Orientation::YPlus), 2.0);
        assert!(close(space.point(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(2.0, 6.0, 4.0)));
    }

    #[test]
    fn test_x_plus_rotates_forward_axis() {
        let space = SpaceTransform::new(orientation_quat(Orientation::XPlus), 1.0);
        // Authoring +X ends up on engine +Z (forward)
        assert!(close(space.point(Vec3::X), Vec3::Z));
    }

    #[test]
    fn test_node_transform_keeps_world_placement() {
        let space = SpaceTransform::new(orientation_quat(Orientation::XPlus), 1.0);
        let node = Transform::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_z(0.7),
            Vec3::ONE,
        );
        let local_point = Vec3::new(0.5, 0.0, 1.0);
        let authored_world = node.to_mat4().transform_point3(local_point);

        let converted = space.node_transform(&node);
        let engine_world = converted.to_mat4().transform_point3(space.point(local_point));
        assert!(close(engine_world, space.point(authored_world)));
    }

    #[test]
    fn test_transform_relative_to() {
        let parent = Transform::new(Vec3::new(0.0, 0.0, 2.0), Quat::IDENTITY, Vec3::ONE);
        let child = Transform::new(Vec3::new(1.0, 0.0, 2.0), Quat::IDENTITY, Vec3::ONE);
        let local = child.relative_to(&parent);
        assert!(close(local.translation, Vec3::new(1.0, 0.0, 0.0)));
        assert!(close(parent.mul(&local).translation, child.translation));
    }
}
