// Copyright (C) 2023, Alex Badics
// This file is part of ar-scene
// Licensed under the MIT license. See LICENSE file in the project root for details.

//! Pushes a resolved entity pose into the scene graph

use tracing::debug;

use crate::{entity::FrameUpdate, entity::TrackedEntity, scene_graph::SceneGraph};

/// Gets told when a marker appears or disappears. Called once per
/// transition, never on frames where visibility stays the same.
pub trait VisibilityObserver: Send {
    /// `entity` is the display name, `visible` the new visibility
    fn visibility_changed(&mut self, entity: &str, visible: bool);
}

impl<F> VisibilityObserver for F
where
    F: FnMut(&str, bool) + Send,
{
    fn visibility_changed(&mut self, entity: &str, visible: bool) {
        self(entity, visible)
    }
}

/// Apply one frame's result to the entity's nodes and lights.
///
/// The root node gets the pose's rotation and translation (its scale is left
/// alone). Visibility goes to the root, every child and every light. Lights
/// only follow the position of the marker, they do not rotate with it.
pub fn apply(
    entity: &TrackedEntity,
    update: &FrameUpdate,
    graph: &mut SceneGraph,
    observer: Option<&mut dyn VisibilityObserver>,
) {
    let root = entity.root();
    graph.set_transform(root, update.pose.to_isometry());
    graph.set_visibility(root, update.visible);
    for &child in entity.children() {
        graph.set_visibility(child, update.visible);
    }
    for &light in entity.lights() {
        graph.set_light_position(light, update.pose.position);
        graph.set_light_visibility(light, update.visible);
    }

    if update.visibility_changed {
        debug!(
            "{} is now {}",
            entity.name(),
            if update.visible { "visible" } else { "hidden" }
        );
        if let Some(observer) = observer {
            observer.visibility_changed(entity.name(), update.visible);
        }
    }
}
