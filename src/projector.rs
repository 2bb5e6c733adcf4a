// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//! Camera space to screen space mapping, for placing 2D overlays on markers

use nalgebra::{Matrix4, Point2, Vector3, Vector4};

use crate::{entity::TrackedEntity, Pose};

/// Projects camera space points to pixel coordinates (origin top left,
/// y pointing down). Read only, it never changes any entity.
#[derive(Debug, Clone)]
pub struct ScreenProjector {
    projection: Matrix4<f32>,
    width: u32,
    height: u32,
}

impl ScreenProjector {
    /// Create a projector from the tracker's column-major projection matrix
    /// and the size of the surface in pixels
    pub fn new(projection: &[f32; 16], width: u32, height: u32) -> Self {
        Self {
            projection: Matrix4::from_column_slice(projection),
            width,
            height,
        }
    }

    /// Update the projection, e.g. after the camera was reconfigured
    pub fn set_projection(&mut self, projection: &[f32; 16]) {
        self.projection = Matrix4::from_column_slice(projection);
    }

    /// Update the surface size
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Surface size in pixels
    pub fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Horizontal and vertical field of view in radians
    pub fn fov(&self) -> (f32, f32) {
        (
            2.0 * (1.0 / self.projection[(0, 0)]).atan(),
            2.0 * (1.0 / self.projection[(1, 1)]).atan(),
        )
    }

    /// Project a camera space point. `None` if the point is behind the camera.
    /// Points outside the viewport are still returned.
    pub fn project_point(&self, point: &Vector3<f32>) -> Option<Point2<f32>> {
        let clip = self.projection * Vector4::new(point.x, point.y, point.z, 1.0);
        if clip.w <= f32::EPSILON {
            return None;
        }
        let ndc_x = clip.x / clip.w;
        let ndc_y = clip.y / clip.w;
        if !ndc_x.is_finite() || !ndc_y.is_finite() {
            return None;
        }
        Some(Point2::new(
            (ndc_x + 1.0) * 0.5 * self.width as f32,
            (1.0 - ndc_y) * 0.5 * self.height as f32,
        ))
    }

    /// Project the origin of a pose
    pub fn project_pose(&self, pose: &Pose) -> Option<Point2<f32>> {
        self.project_point(&pose.position)
    }

    /// Screen position of a marker. `None` while the marker is not visible,
    /// a stale position is never returned.
    pub fn project_entity(&self, entity: &TrackedEntity) -> Option<Point2<f32>> {
        if !entity.is_visible() {
            return None;
        }
        self.project_pose(&entity.pose())
    }

    /// Screen position of a tag of a marker. `None` while the marker is not
    /// visible or if it has no such tag.
    pub fn project_tag(&self, entity: &TrackedEntity, tag: &str) -> Option<Point2<f32>> {
        if !entity.is_visible() {
            return None;
        }
        self.project_pose(&entity.tag_pose(tag)?)
    }
}
