// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//! Rigid poses and the arithmetic between them. See [`Pose`]

use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};

/// Position + orientation of a marker or an anchor.
///
/// Poses are values: every operation returns a new pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Orientation, always a unit quaternion
    pub orientation: UnitQuaternion<f32>,
    /// Position, in the same units as the tracker (usually millimeters)
    pub position: Vector3<f32>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    /// Create a pose from its parts
    pub fn new(position: Vector3<f32>, orientation: UnitQuaternion<f32>) -> Self {
        Self {
            orientation,
            position,
        }
    }

    /// Zero position, identity orientation
    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), UnitQuaternion::identity())
    }

    /// A pure translation, e.g. a tag offset
    pub fn from_translation(x: f32, y: f32, z: f32) -> Self {
        Self::new(Vector3::new(x, y, z), UnitQuaternion::identity())
    }

    /// Decode a column-major (OpenGL style) 4x4 transformation, as returned
    /// by the tracker. Any scale in the upper 3x3 is normalized away.
    pub fn from_matrix(m: &[f32; 16]) -> Self {
        let x_axis = Vector3::new(m[0], m[1], m[2]).normalize();
        let y_axis = Vector3::new(m[4], m[5], m[6]).normalize();
        let z_axis = Vector3::new(m[8], m[9], m[10]).normalize();
        let rotation = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[
            x_axis, y_axis, z_axis,
        ]));
        Self::new(
            Vector3::new(m[12], m[13], m[14]),
            UnitQuaternion::from_rotation_matrix(&rotation),
        )
    }

    /// Encode as a column-major 4x4 transformation
    pub fn to_matrix(&self) -> [f32; 16] {
        let mut result = [0.0; 16];
        result.copy_from_slice(self.to_isometry().to_homogeneous().as_slice());
        result
    }

    /// Convert to the isometry type used by the scene graph
    pub fn to_isometry(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.position), self.orientation)
    }

    /// Build from a scene graph isometry
    pub fn from_isometry(isometry: &Isometry3<f32>) -> Self {
        Self::new(isometry.translation.vector, isometry.rotation)
    }

    /// Returns a copy moved by the given amount (in the parent frame)
    pub fn translate(&self, x: f32, y: f32, z: f32) -> Self {
        Self::new(self.position + Vector3::new(x, y, z), self.orientation)
    }

    /// `false` if any component is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|c| c.is_finite())
            && self.orientation.coords.iter().all(|c| c.is_finite())
    }

    /// The pose that transforms `self` into `to`, expressed in `self`'s local frame.
    pub fn difference(&self, to: &Pose) -> Pose {
        let inverse = self.orientation.inverse();
        Pose::new(
            inverse * (to.position - self.position),
            inverse * to.orientation,
        )
    }

    /// `self` offset by `offset`, where `offset` is in `self`'s local frame.
    /// `a.compose(&a.difference(&b))` gives back `b`.
    pub fn compose(&self, offset: &Pose) -> Pose {
        Pose::new(
            self.position + self.orientation * offset.position,
            self.orientation * offset.orientation,
        )
    }

    /// Negated position, inverted orientation.
    ///
    /// Note that this is not the rigid inverse (the position is not rotated),
    /// it inverts both parts independently.
    pub fn invert(&self) -> Pose {
        Pose::new(-self.position, self.orientation.inverse())
    }

    /// Spherical interpolation of the orientation towards `to` by `t` (clamped
    /// to `[0, 1]`). The position is kept from `self`.
    pub fn interpolate(&self, to: &Pose, t: f32) -> Pose {
        let t = t.clamp(0.0, 1.0);
        let mut orientation = self
            .orientation
            .try_slerp(&to.orientation, t, f32::EPSILON)
            .unwrap_or_else(|| self.orientation.nlerp(&to.orientation, t));
        orientation.renormalize();
        Pose::new(self.position, orientation)
    }

    /// Format as an ABB RAPID `robtarget` constant named `p<name>`.
    /// RAPID orientations are `[q1, q2, q3, q4]` with the real part first.
    pub fn to_rapid_robtarget(&self, name: &str) -> String {
        let q = self.orientation.quaternion();
        format!(
            "CONST robtarget p{} := [ [{:.6}, {:.6}, {:.6}], [{:.6}, {:.6}, {:.6}, {:.6}], [1, 1, 0, 0], [ 9E9, 9E9, 9E9, 9E9, 9E9, 9E9] ];",
            name, self.position.x, self.position.y, self.position.z, q.w, q.i, q.j, q.k
        )
    }
}

impl std::fmt::Display for Pose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "V: [{}, {}, {}] | Q: {}",
            self.position.x, self.position.y, self.position.z, self.orientation
        )
    }
}
