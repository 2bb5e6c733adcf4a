// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//! Per-marker state. See [`TrackedEntity`]

use std::collections::HashMap;

use crate::{
    options::MarkerOptions,
    scene_graph::{LightId, NodeId},
    smoother::{PoseSmoother, SmoothingState},
    Pose,
};

/// A marker known to the tracker, together with everything attached to it
#[derive(Debug, Clone)]
pub struct TrackedEntity {
    name: String,
    marker: String,
    handle: i32,
    pose: Pose,
    was_visible: bool,
    smoother: PoseSmoother,
    root: NodeId,
    children: Vec<NodeId>,
    lights: Vec<LightId>,
    tags: HashMap<String, Pose>,
    options: MarkerOptions,
}

/// Result of [`TrackedEntity::update`] for a single frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUpdate {
    /// Visibility after this frame
    pub visible: bool,
    /// Resolved pose after this frame (held from earlier frames when hidden)
    pub pose: Pose,
    /// `true` if `visible` differs from the previous frame
    pub visibility_changed: bool,
}

impl TrackedEntity {
    /// Create an entity for an already registered marker.
    /// `root` is the scene node the resolved pose is written to.
    pub fn new(marker: &str, handle: i32, root: NodeId, lerping: bool) -> Self {
        Self {
            name: marker.to_owned(),
            marker: marker.to_owned(),
            handle,
            pose: Pose::identity(),
            was_visible: false,
            smoother: PoseSmoother::new(lerping),
            root,
            children: Vec::new(),
            lights: Vec::new(),
            tags: HashMap::new(),
            options: MarkerOptions::default(),
        }
    }

    /// Feed the tracker's raw answer for this frame.
    ///
    /// A visible marker without a usable transformation is treated like a
    /// rejected sample: pose and visibility of the previous frame are kept.
    pub fn update(&mut self, raw_visible: bool, raw_transform: Option<&[f32; 16]>) -> FrameUpdate {
        let raw_pose = match (raw_visible, raw_transform) {
            (true, Some(transform)) => Some(Pose::from_matrix(transform)),
            (true, None) => None,
            (false, _) => Some(self.pose),
        };

        let visible = match raw_pose.and_then(|raw| self.smoother.resolve(raw_visible, &raw)) {
            Some(resolved) => {
                self.pose = resolved;
                true
            }
            // Rejected sample, hold the previous frame
            None if raw_visible => self.was_visible,
            None => false,
        };

        let visibility_changed = visible != self.was_visible;
        self.was_visible = visible;
        FrameUpdate {
            visible,
            pose: self.pose,
            visibility_changed,
        }
    }

    /// Display name, defaults to the marker string
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set the display name
    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_owned();
    }

    /// Tracker configuration string of the marker
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Tracker handle of the marker
    pub fn handle(&self) -> i32 {
        self.handle
    }

    /// Current resolved pose (identity before the first sighting)
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Overwrite the resolved pose, e.g. from an extension.
    /// The scene node is updated on the next sync.
    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    /// Whether the marker was visible in the last frame
    pub fn is_visible(&self) -> bool {
        self.was_visible
    }

    /// Smoothing state after the last frame
    pub fn smoothing_state(&self) -> SmoothingState {
        self.smoother.state()
    }

    /// The entity's smoother, for inspection
    pub fn smoother(&self) -> &PoseSmoother {
        &self.smoother
    }

    /// Enable or disable pose smoothing
    pub fn set_lerping(&mut self, lerping: bool) {
        self.smoother.set_lerping(lerping);
    }

    /// Root scene node, carrying the marker transform
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Record a child node. The caller attaches it in the scene graph.
    pub fn add_child(&mut self, node: NodeId) {
        self.children.push(node);
    }

    /// Nodes attached to the marker
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Record a light that follows the marker
    pub fn add_light(&mut self, light: LightId) {
        self.lights.push(light);
    }

    /// Lights following the marker
    pub fn lights(&self) -> &[LightId] {
        &self.lights
    }

    /// Add or replace a named local-space offset (e.g. a stylus tip)
    pub fn set_tag(&mut self, name: &str, offset: Pose) {
        self.tags.insert(name.to_owned(), offset);
    }

    /// Local offset of a tag
    pub fn tag(&self, name: &str) -> Option<&Pose> {
        self.tags.get(name)
    }

    /// All tags
    pub fn tags(&self) -> &HashMap<String, Pose> {
        &self.tags
    }

    /// World pose of a tag, derived from the current resolved pose
    pub fn tag_pose(&self, name: &str) -> Option<Pose> {
        self.tags.get(name).map(|offset| self.pose.compose(offset))
    }

    /// Tracker options of this marker
    pub fn options(&self) -> &MarkerOptions {
        &self.options
    }

    /// Set the tracker options. They are applied by the scene at construction.
    pub fn set_options(&mut self, options: MarkerOptions) {
        self.options = options;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene_graph::SceneGraph;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn entity() -> TrackedEntity {
        let mut graph = SceneGraph::new();
        TrackedEntity::new("single;Data/hiro.patt;80", 0, graph.add_node(), true)
    }

    #[test]
    fn visibility_edges() {
        let mut entity = entity();
        let transform = Pose::from_translation(0.0, 0.0, 100.0).to_matrix();
        assert!(entity.update(true, Some(&transform)).visibility_changed);
        assert!(!entity.update(true, Some(&transform)).visibility_changed);
        let update = entity.update(false, None);
        assert!(update.visibility_changed);
        assert!(!update.visible);
        // Last known pose is held while hidden
        assert_relative_eq!(update.pose.position, Vector3::new(0.0, 0.0, 100.0));
    }

    #[test]
    fn missing_transform_holds_previous_frame() {
        let mut entity = entity();
        let transform = Pose::from_translation(0.0, 5.0, 100.0).to_matrix();
        entity.update(true, Some(&transform));
        let update = entity.update(true, None);
        assert!(update.visible);
        assert!(!update.visibility_changed);
        assert_relative_eq!(update.pose.position, Vector3::new(0.0, 5.0, 100.0));

        let mut broken = transform;
        broken[12] = f32::INFINITY;
        let update = entity.update(true, Some(&broken));
        assert!(update.visible);
        assert_relative_eq!(update.pose.position, Vector3::new(0.0, 5.0, 100.0));
    }

    #[test]
    fn tag_pose_follows_marker() {
        let mut entity = entity();
        entity.set_tag("tip", Pose::from_translation(0.0, 0.0, 120.0));
        let transform = Pose::from_translation(10.0, 0.0, 100.0).to_matrix();
        entity.update(true, Some(&transform));
        let tip = entity.tag_pose("tip").unwrap();
        assert_relative_eq!(tip.position, Vector3::new(10.0, 0.0, 220.0));
        assert!(entity.tag_pose("nope").is_none());
    }
}
